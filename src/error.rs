//! Command-Level Errors
//!
//! Every variant here becomes an `ERROR: <message>` reply; none of them
//! close the connection. Transport failures live in
//! [`ConnectionError`](crate::connection::ConnectionError).

use crate::storage::SnapshotError;
use thiserror::Error;

/// Errors produced while executing a single command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Empty command")]
    EmptyCommand,

    #[error("Invalid command '{0}'. Type HELP for a list of commands")]
    InvalidCommand(String),

    /// Wrong number of arguments for a known command
    #[error("Invalid {name} command. Format: {usage}")]
    InvalidArity {
        name: &'static str,
        usage: &'static str,
    },

    #[error("TTL must be a positive integer")]
    InvalidTtl,

    #[error("{0}")]
    Io(#[from] SnapshotError),
}

/// Result type for command execution.
pub type CommandResult<T> = Result<T, CommandError>;
