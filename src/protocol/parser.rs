//! Incremental Frame Parser
//!
//! Parses one frame from the front of a buffer that may hold a partial
//! frame, exactly one frame, or several pipelined frames.
//!
//! `parse_frame` returns:
//! - `Ok(Some((frame, consumed)))` when a whole frame is at the front
//! - `Ok(None)` when more bytes are needed
//! - `Err(FrameError)` when the bytes can never form a valid frame
//!
//! Lines that do not start with a type prefix are read as inline commands
//! (`GET a\r\n`), so the server can be driven from telnet or netcat.

use crate::protocol::frame::{prefix, Frame, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Largest bulk string accepted (60 KiB)
///
/// Kept below the per-connection buffer cap so that a whole command carrying
/// a value of this size still fits in the buffer.
pub const MAX_BULK_SIZE: usize = 60 * 1024;

/// Deepest array nesting accepted
pub const MAX_DEPTH: usize = 8;

/// Errors produced by malformed frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid length or integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("bulk string too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for frame parsing.
pub type FrameResult<T> = Result<T, FrameError>;

/// Parses one frame from the front of `buf`, rejecting bulk strings over
/// [`MAX_BULK_SIZE`].
pub fn parse_frame(buf: &[u8]) -> FrameResult<Option<(Frame, usize)>> {
    parse_frame_with_limit(buf, MAX_BULK_SIZE)
}

/// Parses one frame from the front of `buf`, rejecting bulk strings over
/// `max_bulk` bytes.
pub fn parse_frame_with_limit(
    buf: &[u8],
    max_bulk: usize,
) -> FrameResult<Option<(Frame, usize)>> {
    parse_at(buf, 0, max_bulk)
}

fn parse_at(buf: &[u8], depth: usize, max_bulk: usize) -> FrameResult<Option<(Frame, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    if depth > MAX_DEPTH {
        return Err(FrameError::Protocol(format!(
            "nesting deeper than {}",
            MAX_DEPTH
        )));
    }

    match first {
        prefix::SIMPLE => Ok(read_line(buf)?.map(|(s, n)| (Frame::Simple(s.to_string()), n))),
        prefix::ERROR => Ok(read_line(buf)?.map(|(s, n)| (Frame::Error(s.to_string()), n))),
        prefix::INTEGER => match read_line(buf)? {
            Some((s, n)) => Ok(Some((Frame::Integer(to_int(s)?), n))),
            None => Ok(None),
        },
        prefix::BULK => parse_bulk(buf, max_bulk),
        prefix::ARRAY => parse_array(buf, depth, max_bulk),
        _ => parse_inline(buf),
    }
}

/// Reads the text after the prefix byte up to CRLF.
///
/// Returns the text and the bytes consumed including prefix and CRLF.
fn read_line(buf: &[u8]) -> FrameResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(end) => {
            let text = std::str::from_utf8(&buf[1..1 + end]).map_err(|_| FrameError::InvalidUtf8)?;
            Ok(Some((text, 1 + end + CRLF.len())))
        }
        None => Ok(None),
    }
}

fn to_int(s: &str) -> FrameResult<i64> {
    s.parse()
        .map_err(|_| FrameError::InvalidInteger(s.to_string()))
}

fn parse_bulk(buf: &[u8], max_bulk: usize) -> FrameResult<Option<(Frame, usize)>> {
    let Some((len, header)) = read_line(buf)? else {
        return Ok(None);
    };

    let len = to_int(len)?;
    if len == -1 {
        return Ok(Some((Frame::Null, header)));
    }
    if len < 0 {
        return Err(FrameError::InvalidLength(len));
    }

    let len = len as usize;
    if len > max_bulk {
        return Err(FrameError::TooLarge {
            size: len,
            max: max_bulk,
        });
    }

    let total = header + len + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header + len..total] != CRLF {
        return Err(FrameError::Protocol(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[header..header + len]);
    Ok(Some((Frame::Bulk(data), total)))
}

fn parse_array(buf: &[u8], depth: usize, max_bulk: usize) -> FrameResult<Option<(Frame, usize)>> {
    let Some((count, mut consumed)) = read_line(buf)? else {
        return Ok(None);
    };

    let count = to_int(count)?;
    if count == -1 {
        return Ok(Some((Frame::Null, consumed)));
    }
    if count < 0 {
        return Err(FrameError::InvalidLength(count));
    }

    // cap the preallocation; a hostile count must not reserve memory up front
    let mut items = Vec::with_capacity((count as usize).min(64));
    for _ in 0..count {
        match parse_at(&buf[consumed..], depth + 1, max_bulk)? {
            Some((item, used)) => {
                items.push(item);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((Frame::Array(items), consumed)))
}

fn parse_inline(buf: &[u8]) -> FrameResult<Option<(Frame, usize)>> {
    let Some(end) = find_crlf(buf) else {
        return Ok(None);
    };

    let line = std::str::from_utf8(&buf[..end]).map_err(|_| FrameError::InvalidUtf8)?;
    let parts: Vec<Frame> = line
        .split_whitespace()
        .map(|word| Frame::Bulk(Bytes::copy_from_slice(word.as_bytes())))
        .collect();

    if parts.is_empty() {
        return Err(FrameError::Protocol("empty inline command".to_string()));
    }

    Ok(Some((Frame::Array(parts), end + CRLF.len())))
}

/// Position of the first CRLF in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
