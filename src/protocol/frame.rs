//! Wire Frames
//!
//! stashkv speaks RESP framing on the wire. A frame starts with a type byte
//! and ends with CRLF:
//!
//! | Prefix | Frame         | Example                     |
//! |--------|---------------|-----------------------------|
//! | `+`    | Simple string | `+OK\r\n`                   |
//! | `-`    | Error         | `-NOTFOUND no data...\r\n`  |
//! | `:`    | Integer       | `:42\r\n`                   |
//! | `$`    | Bulk string   | `$5\r\nhello\r\n`           |
//! | `$-1`  | Null          | `$-1\r\n`                   |
//! | `*`    | Array         | `*2\r\n$3\r\nGET\r\n$1\r\na\r\n` |
//!
//! Requests are arrays of bulk strings; replies are any frame.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator
pub const CRLF: &[u8] = b"\r\n";

/// Frame type prefixes
pub mod prefix {
    pub const SIMPLE: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One RESP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Short status text without CRLF
    Simple(String),
    /// Error reply: a code word followed by a message
    Error(String),
    Integer(i64),
    /// Binary-safe payload
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    pub fn simple(s: impl Into<String>) -> Self {
        Frame::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    pub fn ok() -> Self {
        Frame::simple("OK")
    }

    pub fn pong() -> Self {
        Frame::simple("PONG")
    }

    /// Builds a request frame: an array of bulk strings.
    pub fn command<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        Frame::Array(parts.into_iter().map(|p| Frame::Bulk(p.into())).collect())
    }

    /// Encodes the frame into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes into an existing buffer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => line(buf, prefix::SIMPLE, s.as_bytes()),
            Frame::Error(s) => line(buf, prefix::ERROR, s.as_bytes()),
            Frame::Integer(n) => line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            Frame::Bulk(data) => {
                line(buf, prefix::BULK, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Frame::Null => line(buf, prefix::BULK, b"-1"),
            Frame::Array(items) => {
                line(buf, prefix::ARRAY, items.len().to_string().as_bytes());
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }

    /// Text of a simple or UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) => Some(s),
            Frame::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }
}

fn line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(n) => write!(f, "(integer) {}", n),
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}
