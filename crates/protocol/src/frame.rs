//! WebSocket frame codec (RFC 6455 Section 5.2, single-frame subset).
//!
//! # Wire format
//!
//! ```text
//! byte 0:   FIN(1) RSV(3) OPCODE(4)
//! byte 1:   MASK(1) LEN(7)
//! [2 bytes BE: extended length]   if LEN == 126
//! [4 bytes: masking key]          if MASK == 1
//! [LEN bytes: payload]
//! ```
//!
//! Only the 7-bit and 16-bit length forms exist here. A LEN of 127 is read
//! as a literal length of 127, never as the 64-bit form.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{EXTENDED_LEN_16, MAX_INLINE_LEN, MAX_PAYLOAD_LEN};
use crate::error::WsError;

const FIN_BIT: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN_BITS: u8 = 0x7F;

/// Frame opcode (low nibble of the first header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// 0x3-0x7 and 0xB-0xF.
    Reserved(u8),
}

impl Opcode {
    /// Parses the low 4 bits of `byte`; the high bits are ignored.
    pub fn from_nibble(byte: u8) -> Self {
        match byte & OPCODE_BITS {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(n) => n & OPCODE_BITS,
        }
    }
}

/// Applies or removes the 4-byte XOR mask in place.
///
/// The operation is its own inverse.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Reads one frame and returns its unmasked payload.
///
/// A close frame yields [`WsError::ConnectionClosed`] and never a payload.
/// Every short read surfaces as [`WsError::Transport`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, WsError> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    let opcode = Opcode::from_nibble(header[0]);
    let masked = header[1] & MASK_BIT != 0;

    let payload_len = match header[1] & LEN_BITS {
        EXTENDED_LEN_16 => reader.read_u16().await? as usize,
        // 127 falls through here as a literal length.
        len => len as usize,
    };

    let mask_key = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    match opcode {
        Opcode::Close => Err(WsError::ConnectionClosed),
        Opcode::Text | Opcode::Binary => Ok(payload),
        // No fragmentation, ping/pong or extension support yet: these are
        // handed to the caller as plain data.
        Opcode::Continuation | Opcode::Ping | Opcode::Pong | Opcode::Reserved(_) => Ok(payload),
    }
}

/// Builds an unmasked, final text frame (server to client).
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, WsError> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(FIN_BIT | Opcode::Text.as_u8());
    push_length(&mut frame, payload.len(), 0)?;
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Builds a masked, final frame as a client would send it.
pub fn encode_masked_frame(
    opcode: Opcode,
    payload: &[u8],
    key: [u8; 4],
) -> Result<Vec<u8>, WsError> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.push(FIN_BIT | opcode.as_u8());
    push_length(&mut frame, payload.len(), MASK_BIT)?;
    frame.extend_from_slice(&key);

    let start = frame.len();
    frame.extend_from_slice(payload);
    apply_mask(&mut frame[start..], key);
    Ok(frame)
}

/// Encodes `payload` as a text frame and writes it in one `write_all`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), WsError> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn push_length(frame: &mut Vec<u8>, len: usize, mask_bit: u8) -> Result<(), WsError> {
    if len <= MAX_INLINE_LEN {
        frame.push(mask_bit | len as u8);
    } else if len <= MAX_PAYLOAD_LEN {
        frame.push(mask_bit | EXTENDED_LEN_16);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        return Err(WsError::MessageTooLarge(len));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    async fn decode(bytes: &[u8]) -> Result<Vec<u8>, WsError> {
        let mut cursor = bytes;
        read_frame(&mut cursor).await
    }

    #[test]
    fn mask_twice_restores_original() {
        let original = b"Hello, frame".to_vec();
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = original.clone();

        apply_mask(&mut data, key);
        assert_ne!(data, original);
        apply_mask(&mut data, key);
        assert_eq!(data, original);
    }

    #[test]
    fn opcode_ignores_fin_and_rsv_bits() {
        assert_eq!(Opcode::from_nibble(0x81), Opcode::Text);
        assert_eq!(Opcode::from_nibble(0xF2), Opcode::Binary);
        assert_eq!(Opcode::from_nibble(0x88), Opcode::Close);
        assert_eq!(Opcode::from_nibble(0x03), Opcode::Reserved(0x3));
        assert_eq!(Opcode::Reserved(0x3).as_u8(), 0x3);
    }

    #[tokio::test]
    async fn decode_masked_text_with_zero_key() {
        let bytes = [0x81, 0x82, 0, 0, 0, 0, b'h', b'i'];
        assert_eq!(decode(&bytes).await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn decode_unmasks_payload() {
        let key = [0x01, 0x02, 0x03, 0x04];
        let frame = encode_masked_frame(Opcode::Text, b"Hello", key).unwrap();
        assert_ne!(&frame[6..], b"Hello");
        assert_eq!(decode(&frame).await.unwrap(), b"Hello");
    }

    #[tokio::test]
    async fn decode_unmasked_frame() {
        let bytes = [0x82, 0x03, 1, 2, 3];
        assert_eq!(decode(&bytes).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn decode_16bit_length() {
        let payload = vec![0xABu8; 300];
        let mut bytes = vec![0x82, 0xFE];
        bytes.extend_from_slice(&300u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&payload);

        assert_eq!(decode(&bytes).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn length_127_is_literal() {
        // 127 is not the 64-bit marker here: exactly 127 payload bytes follow.
        let payload = vec![0x5Au8; 127];
        let mut bytes = vec![0x81, 0x7F];
        bytes.extend_from_slice(&payload);

        assert_eq!(decode(&bytes).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn close_frame_yields_connection_closed() {
        let frame = encode_masked_frame(Opcode::Close, &[0x03, 0xE8], [9, 8, 7, 6]).unwrap();
        let err = decode(&frame).await.unwrap_err();
        assert!(matches!(err, WsError::ConnectionClosed));
        assert!(err.is_closed());

        let empty_close = [0x88, 0x00];
        assert!(matches!(
            decode(&empty_close).await,
            Err(WsError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn control_and_reserved_opcodes_pass_through_as_data() {
        for opcode in [Opcode::Ping, Opcode::Pong, Opcode::Continuation, Opcode::Reserved(0x3)] {
            let frame = encode_masked_frame(opcode, b"x", [1, 1, 1, 1]).unwrap();
            assert_eq!(decode(&frame).await.unwrap(), b"x", "opcode {opcode:?}");
        }
    }

    #[tokio::test]
    async fn short_reads_are_transport_errors() {
        let cases: [&[u8]; 5] = [
            &[],                          // no header
            &[0x81],                      // half a header
            &[0x81, 0xFE, 0x01],          // truncated extended length
            &[0x81, 0x85, 1, 2],          // truncated mask key
            &[0x81, 0x05, b'a', b'b'],    // truncated payload
        ];
        for bytes in cases {
            match decode(bytes).await {
                Err(WsError::Transport(e)) => {
                    assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
                }
                other => panic!("expected transport error for {bytes:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn encode_echo_reply_bytes() {
        let frame = encode_frame(b"hi (echo)").unwrap();
        let mut expected = vec![0x81, 0x09];
        expected.extend_from_slice(b"hi (echo)");
        assert_eq!(frame, expected);
    }

    #[test]
    fn encode_header_forms_at_boundaries() {
        for len in [0usize, 1, 125] {
            let frame = encode_frame(&vec![b'a'; len]).unwrap();
            assert_eq!(frame[0], 0x81);
            assert_eq!(frame[1] as usize, len);
            assert_eq!(frame.len(), 2 + len);
        }
        for len in [126usize, 127, 65535] {
            let frame = encode_frame(&vec![b'a'; len]).unwrap();
            assert_eq!(frame[0], 0x81);
            assert_eq!(frame[1], 126);
            assert_eq!(u16::from_be_bytes([frame[2], frame[3]]) as usize, len);
            assert_eq!(frame.len(), 4 + len);
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; 65536];
        assert!(matches!(
            encode_frame(&payload),
            Err(WsError::MessageTooLarge(65536))
        ));
        assert!(matches!(
            encode_masked_frame(Opcode::Text, &payload, [0; 4]),
            Err(WsError::MessageTooLarge(65536))
        ));
    }

    #[test]
    fn server_frames_are_never_masked() {
        let frame = encode_frame(&[0u8; 200]).unwrap();
        assert_eq!(frame[1] & MASK_BIT, 0);
    }

    #[tokio::test]
    async fn masked_roundtrip_at_boundaries() {
        let mut rng = rand::thread_rng();
        for len in [0usize, 1, 125, 126, 127, 4096, 65535] {
            let payload: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            let key: [u8; 4] = rng.r#gen();

            let frame = encode_masked_frame(Opcode::Binary, &payload, key).unwrap();
            let decoded = decode(&frame).await.unwrap();
            assert_eq!(decoded.len(), len);
            assert_eq!(decoded, payload);
        }
    }

    #[tokio::test]
    async fn write_frame_emits_full_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"Hello").await.unwrap();
        assert_eq!(buf, vec![0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[tokio::test]
    async fn write_frame_surfaces_too_large_without_writing() {
        let mut buf = Vec::new();
        let result = write_frame(&mut buf, &vec![0u8; 70_000]).await;
        assert!(matches!(result, Err(WsError::MessageTooLarge(70_000))));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn consecutive_frames_decode_in_order() {
        let mut bytes = encode_masked_frame(Opcode::Text, b"one", [1, 2, 3, 4]).unwrap();
        bytes.extend(encode_masked_frame(Opcode::Text, b"two", [5, 6, 7, 8]).unwrap());

        let mut cursor = &bytes[..];
        assert_eq!(read_frame(&mut cursor).await.unwrap(), b"one");
        assert_eq!(read_frame(&mut cursor).await.unwrap(), b"two");
        assert!(cursor.is_empty());
    }
}
