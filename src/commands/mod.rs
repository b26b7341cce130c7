//! Commands
//!
//! Sits between the wire and the service layer.
//!
//! ```text
//! Frame ──> Command::from_frame ──> CommandHandler::run ──> KvService
//!                                          │
//!                                          ▼
//!                                     reply Frame
//! ```
//!
//! ## Supported Commands
//!
//! - `ADD key value [ttl]`, `SET key value [ttl]`
//! - `GET key`, `DEL key`
//! - `PING [message]`, `DBSIZE`, `SAVE`, `INFO`, `QUIT`

pub mod command;
pub mod handler;

pub use command::{Command, CommandError};
pub use handler::CommandHandler;
