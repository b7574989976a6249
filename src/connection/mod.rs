//! Connection Module
//!
//! This module manages individual client connections to LineKV.
//! Each client connection is handled by its own async task; the registry
//! keeps track of them so the server can close them all on shutdown.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐      ┌──────────────────┐
//!           │  ConnectionRegistry    │<────>│  ClientHandle    │
//!           │  register / close_all  │      │  id, addr, queue │
//!           └────────────┬───────────┘      └──────────────────┘
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Parse line  │───>│ Dispatch    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use linekv::connection::handle_connection;
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, dispatcher.clone(), config.clone()));
//! ```

pub mod handler;
pub mod registry;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
pub use registry::{
    ClientHandle, ClientInbox, ConnectionId, ConnectionRegistry, OUTBOUND_QUEUE_CAPACITY,
};
