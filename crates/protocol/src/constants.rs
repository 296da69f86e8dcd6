//! Protocol constants shared by the codec, the handshake and the server.

/// RFC 6455 GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest payload this engine reads or writes (2-byte extended length).
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Largest payload that fits in the 7-bit inline length field.
pub const MAX_INLINE_LEN: usize = 125;

/// Length field value announcing a 2-byte big-endian extended length.
pub const EXTENDED_LEN_16: u8 = 126;

/// Size of the single initial receive that carries the upgrade request.
pub const HANDSHAKE_BUFFER_SIZE: usize = 1024;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Suffix appended to every echoed payload.
pub const ECHO_SUFFIX: &str = " (echo)";
