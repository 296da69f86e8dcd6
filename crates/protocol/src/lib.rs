//! Wire protocol for the wsecho server.
//!
//! Implements the server half of a small RFC 6455 subset:
//! - **Handshake** (`handshake`): parses the upgrade request and derives `Sec-WebSocket-Accept`
//! - **Frame codec** (`frame`): single unfragmented frames up to 65535 payload bytes
//!
//! Neither module touches sockets; both work over byte slices or
//! `tokio::io::{AsyncRead, AsyncWrite}`.

pub mod constants;
pub mod error;
pub mod frame;
pub mod handshake;

pub use error::WsError;
pub use frame::{Opcode, apply_mask, encode_frame, encode_masked_frame, read_frame, write_frame};
pub use handshake::{BAD_REQUEST_RESPONSE, Handshake, compute_accept_key, negotiate};
