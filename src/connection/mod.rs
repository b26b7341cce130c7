//! Client Connections
//!
//! The accept loop in `main.rs` spawns one task per socket:
//!
//! ```ignore
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(service, Arc::clone(&stats));
//!
//! loop {
//!     let (stream, peer) = listener.accept().await?;
//!     tokio::spawn(handle_connection(stream, peer, handler.clone(), Arc::clone(&stats)));
//! }
//! ```

pub mod handler;

pub use handler::{handle_connection, Connection, ConnectionError, ConnectionStats};
