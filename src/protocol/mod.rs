//! Wire Protocol
//!
//! RESP framing for requests and replies.
//!
//! ## Modules
//!
//! - `frame`: the `Frame` enum and its encoding
//! - `parser`: incremental parser for incoming bytes
//!
//! ## Example
//!
//! ```
//! use stashkv::protocol::{parse_frame, Frame};
//!
//! let request = Frame::command(["GET", "session"]);
//! let bytes = request.encode();
//!
//! let (parsed, consumed) = parse_frame(&bytes).unwrap().unwrap();
//! assert_eq!(parsed, request);
//! assert_eq!(consumed, bytes.len());
//! ```

pub mod frame;
pub mod parser;

pub use frame::Frame;
pub use parser::{parse_frame, parse_frame_with_limit, FrameError, FrameResult};
