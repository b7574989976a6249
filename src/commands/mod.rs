//! Command Processing Module
//!
//! This module implements the command layer for LineKV. It receives
//! tokenized lines, validates them against the command table, executes
//! them against the store and the other shared services, and returns a
//! [`Reply`](crate::protocol::Reply).
//!
//! ## Architecture
//!
//! ```text
//! Client Line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  LineParser     │  (protocol module)
//! └────────┬────────┘
//!          │ tokens
//!          ▼
//! ┌───────────────────┐
//! │ CommandDispatcher │  (this module)
//! │                   │
//! │  - Lookup         │
//! │  - Arity check    │
//! │  - Execute        │
//! │  - Count          │
//! └────────┬──────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Store / PubSub  │
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Key/Value
//! - `GET`, `MGET`, `SET`, `MSET`, `SETEX`
//! - `DELETE`, `DEL`, `DELETEEX`
//! - `TTL`, `PERSIST`, `RENAME`, `RENAMENX`
//! - `KEYEXISTS`, `TYPE`, `KEYS`, `FLUSH`
//!
//! ### Persistence
//! - `SAVE`, `LOAD`
//!
//! ### Pub/Sub
//! - `SUBSCRIBE`, `UNSUBSCRIBE`, `PUBLISH`
//!
//! ### Server
//! - `PING`, `STATS`, `INFO`, `HELP`, `SHUTDOWN`

pub mod dispatcher;

pub use dispatcher::{lookup, Arity, CommandDispatcher, CommandSpec, COMMANDS};
