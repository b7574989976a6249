//! Reply Types for the Line Protocol
//!
//! Every reply the server sends is one or more text lines followed by a
//! terminating `END` line. The sentinel lets a client tell multi-line
//! replies (`KEYS`, `STATS`, pub/sub pushes) apart from the next one.
//!
//! ## Wire Format
//!
//! ```text
//! OK\n
//! END\n
//! ```
//!
//! ```text
//! a\n
//! b\n
//! END\n
//! ```
//!
//! Errors are a single line with a distinct prefix:
//!
//! ```text
//! ERROR: Key not found\n
//! END\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Line terminator used on the wire.
pub const NEWLINE: u8 = b'\n';

/// Sentinel line that closes every reply.
pub const END_MARKER: &str = "END";

/// Prefix that marks a reply as an error.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// A reply produced by the dispatcher or pushed by pub/sub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A single line of text (`OK`, `PONG`, a value).
    Line(String),

    /// A signed integer rendered as one line.
    Integer(i64),

    /// Several lines (`KEYS`, `MGET`, `STATS`, `INFO`, `HELP`).
    Lines(Vec<String>),

    /// An error message, rendered with the `ERROR: ` prefix.
    Error(String),

    /// A message delivered to a channel subscriber.
    Message { channel: String, message: String },
}

impl Reply {
    /// Creates a single-line reply.
    pub fn line(s: impl Into<String>) -> Self {
        Reply::Line(s.into())
    }

    /// Creates an integer reply.
    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a multi-line reply.
    pub fn lines(lines: Vec<String>) -> Self {
        Reply::Lines(lines)
    }

    /// Creates an error reply from anything printable.
    pub fn error(err: impl fmt::Display) -> Self {
        Reply::Error(err.to_string())
    }

    /// Creates a pub/sub push.
    pub fn message(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Reply::Message {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Common reply for successful writes.
    pub fn ok() -> Self {
        Reply::Line("OK".to_string())
    }

    /// Reply to `PING`.
    pub fn pong() -> Self {
        Reply::Line("PONG".to_string())
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply into its framed wire form.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Line(s) => put_line(buf, s),
            Reply::Integer(n) => put_line(buf, &n.to_string()),
            Reply::Lines(lines) => {
                for line in lines {
                    put_line(buf, line);
                }
            }
            Reply::Error(msg) => {
                buf.put_slice(ERROR_PREFIX.as_bytes());
                put_line(buf, msg);
            }
            Reply::Message { channel, message } => {
                put_line(buf, &format!("[MESSAGE {}] {}", channel, message));
            }
        }
        put_line(buf, END_MARKER);
    }
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.reserve(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(NEWLINE);
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Line(s) => write!(f, "{}", s),
            Reply::Integer(n) => write!(f, "{}", n),
            Reply::Lines(lines) => write!(f, "{}", lines.join("\n")),
            Reply::Error(msg) => write!(f, "{}{}", ERROR_PREFIX, msg),
            Reply::Message { channel, message } => {
                write!(f, "[MESSAGE {}] {}", channel, message)
            }
        }
    }
}
