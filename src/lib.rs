//! # LineKV - An In-Memory Key-Value Store over a Line Protocol
//!
//! LineKV keeps string keys and values in memory, with optional per-key
//! expiry, and serves many concurrent clients over a plain-text TCP
//! protocol: one command per line, replies terminated by an `END` line.
//!
//! ## Features
//!
//! - **Line Protocol**: `SET name Ariz` in, `OK` / `END` out; usable from `nc`
//! - **TTL Support**: Keys can expire, lazily on access and by a background sweeper
//! - **Pub/Sub**: Channels with bounded per-client delivery queues
//! - **Snapshots**: Full JSON dump/restore at startup, shutdown and on demand
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               LineKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌───────────────────┐            │
//! │  │   Server    │───>│ Connection  │───>│ CommandDispatcher │            │
//! │  │ (Listener)  │    │  Handler    │    └─────────┬─────────┘            │
//! │  └──────┬──────┘    └──────┬──────┘              │                      │
//! │         │                  │           ┌─────────┼──────────┐           │
//! │         ▼                  ▼           ▼         ▼          ▼           │
//! │  ┌─────────────┐    ┌─────────────┐ ┌───────┐ ┌───────┐ ┌────────┐      │
//! │  │ Connection  │    │ LineParser  │ │ Store │ │PubSub │ │Metrics │      │
//! │  │  Registry   │    └─────────────┘ └───┬───┘ └───────┘ └────────┘      │
//! │  └─────────────┘                        ▲                               │
//! │                          ┌──────────────┴────────────┐                  │
//! │                          │ ExpirySweeper / DELETEEX  │                  │
//! │                          │   (Background Tasks)      │                  │
//! │                          └───────────────────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use linekv::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig {
//!         port: 8080,
//!         ..Default::default()
//!     };
//!     Server::new(config).serve().await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: line framing and reply serialization
//! - [`storage`]: the store, expiry tasks and snapshots
//! - [`commands`]: the command table and dispatcher
//! - [`connection`]: per-client handler and the live connection registry
//! - [`pubsub`]: channel subscriptions and fan-out
//! - [`metrics`]: command and connection counters
//! - [`server`]: accept loop, startup and shutdown
//! - [`client`]: a small client for scripts, tests and interactive use
//!
//! ## Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: A background task periodically sweeps expired keys
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod pubsub;
pub mod server;
pub mod shutdown;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::KvClient;
pub use commands::CommandDispatcher;
pub use config::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use error::CommandError;
pub use protocol::{LineParser, Reply};
pub use server::Server;
pub use shutdown::Shutdown;
pub use storage::{Snapshot, Store};

/// Version of LineKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
