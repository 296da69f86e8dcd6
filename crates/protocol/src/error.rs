//! Error types for the wire protocol.

/// Errors produced by the handshake and the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// Short read, short write, or any other failure of the underlying stream.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer sent a close frame. Expected, not a fault.
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("not a websocket upgrade request")]
    NotAnUpgradeRequest,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("message too large: {0} bytes (max 65535)")]
    MessageTooLarge(usize),
}

impl WsError {
    /// Returns `true` for the expected end of a session (peer close).
    pub fn is_closed(&self) -> bool {
        matches!(self, WsError::ConnectionClosed)
    }
}
