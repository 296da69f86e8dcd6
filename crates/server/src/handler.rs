//! Handler trait for transforming received payloads into replies.

use std::net::SocketAddr;

use wsecho_protocol::constants::ECHO_SUFFIX;

use crate::session::CloseReason;

/// Per-message logic plugged into every session.
///
/// One handler instance is shared by all sessions, so implementations must
/// not rely on per-connection mutable state.
pub trait Handler: Send + Sync + 'static {
    /// Turns one received payload into the payload of the reply frame.
    fn on_message(&self, payload: Vec<u8>) -> Vec<u8>;

    /// Called once when a session reaches `Closed`.
    fn on_session_closed(&self, peer: SocketAddr, reason: &CloseReason) {
        let _ = (peer, reason);
    }
}

/// Appends a fixed suffix to every payload.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    suffix: Vec<u8>,
}

impl EchoHandler {
    pub fn new(suffix: impl Into<Vec<u8>>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new(ECHO_SUFFIX)
    }
}

impl Handler for EchoHandler {
    fn on_message(&self, mut payload: Vec<u8>) -> Vec<u8> {
        payload.extend_from_slice(&self.suffix);
        payload
    }
}
