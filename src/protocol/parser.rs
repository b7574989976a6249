//! Incremental Line Parser
//!
//! Commands arrive as `\n`-terminated lines of whitespace-separated fields.
//! TCP is a stream, so a read may hold half a line or several lines at
//! once; the parser pulls complete lines off the front of a `BytesMut`
//! and leaves any partial tail in place for the next read.
//!
//! The parser returns either:
//! - `Ok(Some(tokens))` - a complete line was consumed
//! - `Ok(None)` - no complete line yet, read more data
//! - `Err(ParseError)` - the buffered line exceeds the size limit

use crate::protocol::types::NEWLINE;
use bytes::BytesMut;
use thiserror::Error;

/// Default upper bound for a single command line (64 KB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Errors that can occur while framing input lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No newline within the allowed number of bytes
    #[error("line too long: {size} bytes without a newline (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Pulls command lines out of a read buffer.
///
/// # Example
///
/// ```
/// use linekv::protocol::LineParser;
/// use bytes::BytesMut;
///
/// let parser = LineParser::new();
/// let mut buffer = BytesMut::from(&b"SET name Ariz\nGET na"[..]);
///
/// let tokens = parser.parse(&mut buffer).unwrap().unwrap();
/// assert_eq!(tokens, vec!["SET", "name", "Ariz"]);
///
/// // The partial second command stays buffered.
/// assert!(parser.parse(&mut buffer).unwrap().is_none());
/// assert_eq!(&buffer[..], b"GET na");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LineParser {
    max_line_length: usize,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    /// Creates a parser with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Creates a parser with a custom line limit.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    /// Attempts to take one complete line from the front of `buf`.
    ///
    /// Consumed bytes (including the terminator) are removed from the
    /// buffer. A trailing `\r` is stripped so `\r\n` clients work too.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn parse(&self, buf: &mut BytesMut) -> ParseResult<Option<Vec<String>>> {
        let newline = match buf.iter().position(|&b| b == NEWLINE) {
            Some(pos) => pos,
            None => {
                if buf.len() > self.max_line_length {
                    return Err(ParseError::LineTooLong {
                        size: buf.len(),
                        max: self.max_line_length,
                    });
                }
                return Ok(None);
            }
        };

        if newline > self.max_line_length {
            return Err(ParseError::LineTooLong {
                size: newline,
                max: self.max_line_length,
            });
        }

        let line = buf.split_to(newline + 1);
        let mut body = &line[..newline];
        if let Some(stripped) = body.strip_suffix(b"\r") {
            body = stripped;
        }

        Ok(Some(tokenize(&String::from_utf8_lossy(body))))
    }
}

/// Splits a command line into whitespace-separated fields.
///
/// Repeated separators never produce empty fields, so `"SET  a   b"` is
/// three tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let parser = LineParser::new();
        let mut buf = BytesMut::from(&b"GET key\n"[..]);
        let tokens = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(tokens, vec!["GET", "key"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_incomplete() {
        let parser = LineParser::new();
        let mut buf = BytesMut::from(&b"GET ke"[..]);
        assert!(parser.parse(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_parse_pipelined_lines() {
        let parser = LineParser::new();
        let mut buf = BytesMut::from(&b"SET a 1\nSET b 2\nPING\n"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap().unwrap(), vec!["SET", "a", "1"]);
        assert_eq!(parser.parse(&mut buf).unwrap().unwrap(), vec!["SET", "b", "2"]);
        assert_eq!(parser.parse(&mut buf).unwrap().unwrap(), vec!["PING"]);
        assert!(parser.parse(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_parse_crlf() {
        let parser = LineParser::new();
        let mut buf = BytesMut::from(&b"PING\r\n"[..]);
        assert_eq!(parser.parse(&mut buf).unwrap().unwrap(), vec!["PING"]);
    }

    #[test]
    fn test_parse_blank_line_yields_no_tokens() {
        let parser = LineParser::new();
        let mut buf = BytesMut::from(&b"   \n"[..]);
        assert!(parser.parse(&mut buf).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_utf8_is_lossy() {
        let parser = LineParser::new();
        let mut buf = BytesMut::from(&b"SET k \xff\n"[..]);
        let tokens = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2], "\u{fffd}");
    }

    #[test]
    fn test_line_too_long() {
        let parser = LineParser::with_max_line_length(8);
        let mut buf = BytesMut::from(&b"SET key value"[..]);
        assert_eq!(
            parser.parse(&mut buf),
            Err(ParseError::LineTooLong { size: 13, max: 8 })
        );

        let mut buf = BytesMut::from(&b"SET key value\n"[..]);
        assert!(parser.parse(&mut buf).is_err());
    }

    #[test]
    fn test_tokenize_collapses_whitespace() {
        assert_eq!(tokenize("  SET   a\tb  "), vec!["SET", "a", "b"]);
        assert!(tokenize("").is_empty());
    }
}
