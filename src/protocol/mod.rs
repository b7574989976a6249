//! Line Protocol Implementation
//!
//! Clients send one command per `\n`-terminated line, fields separated by
//! whitespace, the first field being the command name. The server answers
//! with zero or more lines followed by an `END` line.
//!
//! ## Modules
//!
//! - `types`: the `Reply` enum and its framed serialization
//! - `parser`: incremental line framing over a `BytesMut` buffer
//!
//! ## Example
//!
//! ```
//! use linekv::protocol::{LineParser, Reply};
//! use bytes::BytesMut;
//!
//! let mut buffer = BytesMut::from(&b"GET name\n"[..]);
//! let tokens = LineParser::new().parse(&mut buffer).unwrap().unwrap();
//! assert_eq!(tokens, vec!["GET", "name"]);
//!
//! let bytes = Reply::line("Ariz").serialize();
//! assert_eq!(&bytes[..], b"Ariz\nEND\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{tokenize, LineParser, ParseError, ParseResult, DEFAULT_MAX_LINE_LENGTH};
pub use types::{Reply, END_MARKER, ERROR_PREFIX};
