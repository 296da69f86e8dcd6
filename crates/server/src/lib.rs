//! WebSocket echo server.
//!
//! Accepts TCP connections, runs one independent [`Session`] task per
//! connection, and hands every decoded payload to a [`Handler`] whose
//! reply is sent back as a single text frame.

mod handler;
mod server;
mod session;

pub use handler::{EchoHandler, Handler};
pub use server::{EchoServer, ServerConfig};
pub use session::{CloseReason, Session, SessionLimits};

/// Errors produced by the server outside of any single session.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
