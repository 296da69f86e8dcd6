//! HTTP upgrade handshake (RFC 6455 Section 4.2, server side).
//!
//! The request is whatever arrived in the connection's first receive. It is
//! split into CR-LF lines and each line is split on its first `": "`. Lines
//! without that separator, the request line included, are ignored: there
//! is no method check and no path routing. Parsing works on raw bytes, so
//! the key is hashed exactly as the client sent it.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::constants::WS_GUID;
use crate::error::WsError;

/// Response sent when the upgrade request carries no usable key.
pub const BAD_REQUEST_RESPONSE: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

/// Computes the `Sec-WebSocket-Accept` value for `client_key`.
pub fn compute_accept_key(client_key: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_ref());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// A validated upgrade request, ready to be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    accept_key: String,
}

impl Handshake {
    pub fn accept_key(&self) -> &str {
        &self.accept_key
    }

    /// The `101 Switching Protocols` response, byte-exact.
    pub fn response(&self) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            self.accept_key
        )
    }
}

/// Validates the raw request block and derives the accept token.
///
/// `Upgrade` must equal `websocket` exactly, otherwise
/// [`WsError::NotAnUpgradeRequest`]. A missing or empty `Sec-WebSocket-Key`
/// yields [`WsError::MissingKey`]; the caller answers that one with
/// [`BAD_REQUEST_RESPONSE`].
pub fn negotiate(raw: &[u8]) -> Result<Handshake, WsError> {
    let headers = parse_headers(raw);

    if headers.get(&b"Upgrade"[..]).copied() != Some(&b"websocket"[..]) {
        return Err(WsError::NotAnUpgradeRequest);
    }

    let key = match headers.get(&b"Sec-WebSocket-Key"[..]) {
        Some(key) if !key.is_empty() => *key,
        _ => return Err(WsError::MissingKey),
    };

    Ok(Handshake {
        accept_key: compute_accept_key(key),
    })
}

/// Builds the header map. Later duplicates overwrite earlier ones.
fn parse_headers(raw: &[u8]) -> HashMap<&[u8], &[u8]> {
    lines(raw)
        .filter_map(|line| {
            let at = find(line, b": ")?;
            Some((&line[..at], &line[at + 2..]))
        })
        .collect()
}

fn lines(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(raw);
    std::iter::from_fn(move || {
        let current = rest?;
        match find(current, b"\r\n") {
            Some(at) => {
                rest = Some(&current[at + 2..]);
                Some(&current[..at])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
