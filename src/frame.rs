//! # Frame
//!
//! WebSocket frames as defined in
//! [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! :                     Payload Data continued ...                :
//! +---------------------------------------------------------------+
//! ```
//!
//! [`Frame`] is a plain value type with structural equality. It keeps the length
//! the header *declares* ([`Frame::declared_len`]) separate from the payload it
//! actually holds, which is what lets the permissive codec path
//! ([`Frame::to_bytes`] / [`Frame::from_bytes`]) round-trip structurally
//! inconsistent frames byte-exactly while [`Frame::safe_to_bytes`] refuses to put
//! them on a real connection.

use bytes::{Bytes, BytesMut};

use crate::{length, mask, Result, WebSocketError};

/// WebSocket operation code, defining the semantic meaning of a frame.
///
/// Data frames (`Continuation`, `Text`, `Binary`) carry application payload;
/// control frames (`Close`, `Ping`, `Pong`) manage the connection. The numeric
/// values are fixed by
/// [RFC 6455 Section 11.8](https://datatracker.ietf.org/doc/html/rfc6455#section-11.8);
/// the gaps (0x3-0x7, 0xB-0xF) are reserved and rejected on parse.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Returns `true` for `Close`, `Ping`, and `Pong`.
    ///
    /// Control frames cannot be fragmented and carry at most 125 payload bytes.
    pub fn is_control(&self) -> bool {
        matches!(*self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WebSocketError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(WebSocketError::InvalidOpCode(value)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// Largest possible frame header: 2 fixed bytes, 8 bytes of extended length,
/// 4 bytes of masking key.
pub const MAX_HEAD_SIZE: usize = 14;

/// A single WebSocket frame.
///
/// The payload is stored in its unmasked, logical form; masking is applied to a
/// copy at the serialization boundary and removed during parsing. `declared_len`
/// is the value the wire header carries, which for a well-formed frame equals
/// `payload.len()` — but the two are allowed to diverge so that malformed inputs
/// can be parsed, inspected, and re-serialized byte-exactly. [`Frame::is_valid`]
/// reports the divergence; nothing else does.
///
/// All fields take part in equality, so `from_bytes(f.to_bytes()) == f` for any
/// frame the default builder produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Indicates if this is the final frame in a message.
    pub fin: bool,
    /// The opcode of the frame, defining its type.
    pub opcode: OpCode,
    /// The masking key, present iff the frame is masked. Client-originated
    /// frames are masked, server-originated frames are not.
    pub mask: Option<[u8; 4]>,
    /// The payload length encoded in the wire header.
    pub declared_len: u64,
    /// The payload, always held unmasked.
    pub payload: BytesMut,
}

impl Frame {
    /// Default builder: a final binary data frame carrying `payload`.
    ///
    /// Client-originated frames get a fresh random masking key; server frames
    /// are unmasked. The declared length is computed from the payload, so every
    /// frame this returns satisfies [`Frame::is_valid`].
    pub fn outgoing(payload: impl Into<BytesMut>, from_client: bool) -> Self {
        let payload = payload.into();
        Self {
            fin: true,
            opcode: OpCode::Binary,
            mask: from_client.then(mask::generate),
            declared_len: payload.len() as u64,
            payload,
        }
    }

    /// Builds a close frame for the given role. No status code payload; the
    /// bare close frame is enough to signal teardown.
    pub fn close(from_client: bool) -> Self {
        Self {
            fin: true,
            opcode: OpCode::Close,
            mask: from_client.then(mask::generate),
            declared_len: 0,
            payload: BytesMut::new(),
        }
    }

    /// Builds a pong frame answering `ping_payload`.
    pub fn pong(ping_payload: impl Into<BytesMut>, from_client: bool) -> Self {
        let payload = ping_payload.into();
        Self {
            fin: true,
            opcode: OpCode::Pong,
            mask: from_client.then(mask::generate),
            declared_len: payload.len() as u64,
            payload,
        }
    }

    /// Byte length of the payload actually held in memory.
    #[inline]
    pub fn actual_len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Returns whether the frame carries a masking key.
    #[inline]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Structural validity check.
    ///
    /// A frame is valid iff the length its header declares matches the payload
    /// it holds, and control frames are unfragmented. Checked on demand only;
    /// a frame can sit in an invalid state until [`Frame::safe_to_bytes`] is
    /// asked to put it on the wire.
    pub fn is_valid(&self) -> bool {
        self.declared_len == self.actual_len() && (self.fin || !self.opcode.is_control())
    }

    /// Formats the frame header into `head`, returning the header size.
    ///
    /// The length field encodes [`Frame::declared_len`], not the actual payload
    /// size, so inconsistent frames re-serialize exactly as parsed.
    ///
    /// # Panics
    /// Panics if `head` is shorter than [`MAX_HEAD_SIZE`].
    pub(crate) fn fmt_head(&self, head: &mut [u8]) -> usize {
        head[0] = (self.fin as u8) << 7 | u8::from(self.opcode);

        let mut size = 1 + length::encode(self.declared_len, &mut head[1..]);
        if let Some(key) = self.mask {
            head[1] |= 0x80;
            head[size..size + 4].copy_from_slice(&key);
            size += 4;
        }
        size
    }

    /// Serializes the frame unconditionally.
    ///
    /// Pure function of frame state: header, masking key if present, then the
    /// payload (masked through a copy when a key is present). Calling it twice
    /// on an unmodified frame yields identical bytes. Invalid frames serialize
    /// too; senders that want the invariant enforced use
    /// [`Frame::safe_to_bytes`].
    pub fn to_bytes(&self) -> Bytes {
        let mut head = [0u8; MAX_HEAD_SIZE];
        let head_size = self.fmt_head(&mut head);

        let mut buf = BytesMut::with_capacity(head_size + self.payload.len());
        buf.extend_from_slice(&head[..head_size]);
        match self.mask {
            Some(key) => {
                let mut masked = self.payload.clone();
                mask::apply_mask(&mut masked, key);
                buf.extend_from_slice(&masked);
            }
            None => buf.extend_from_slice(&self.payload),
        }
        buf.freeze()
    }

    /// Validated serialization: the production-safe entry point.
    ///
    /// Fails with [`WebSocketError::FrameValidation`] (or
    /// [`WebSocketError::ControlFrameFragmented`]) instead of producing bytes
    /// for a structurally invalid frame.
    pub fn safe_to_bytes(&self) -> Result<Bytes> {
        if self.declared_len != self.actual_len() {
            return Err(WebSocketError::FrameValidation {
                declared: self.declared_len,
                actual: self.actual_len(),
            });
        }
        if self.opcode.is_control() && !self.fin {
            return Err(WebSocketError::ControlFrameFragmented);
        }
        Ok(self.to_bytes())
    }

    /// Parses a frame from `src`, best-effort.
    ///
    /// Fails only when the header itself is undecodable: too few bytes for the
    /// fixed header, a truncated length extension or masking key, reserved bits
    /// set, or an unknown opcode. A declared length that disagrees with the
    /// bytes physically present is *not* an error: parsing consumes
    /// `min(declared_len, available)` payload bytes, unmasks them, and leaves
    /// the mismatch for [`Frame::is_valid`] to report.
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        let (&b0, rest) = src.split_first().ok_or(WebSocketError::TruncatedFrameHeader)?;

        let fin = b0 & 0x80 != 0;
        if b0 & 0x70 != 0 {
            return Err(WebSocketError::ReservedBitsNotZero);
        }
        let opcode = OpCode::try_from(b0 & 0x0F)?;

        let masked = rest.first().ok_or(WebSocketError::TruncatedFrameHeader)? & 0x80 != 0;
        let (declared_len, len_size) =
            length::decode(rest).ok_or(WebSocketError::TruncatedFrameHeader)?;
        let mut rest = &rest[len_size..];

        let mask = if masked {
            let key: [u8; 4] = rest
                .get(..4)
                .and_then(|k| k.try_into().ok())
                .ok_or(WebSocketError::TruncatedFrameHeader)?;
            rest = &rest[4..];
            Some(key)
        } else {
            None
        };

        let take = usize::try_from(declared_len)
            .map(|n| n.min(rest.len()))
            .unwrap_or(rest.len());
        let mut payload = BytesMut::from(&rest[..take]);
        if let Some(key) = mask {
            mask::apply_mask(&mut payload, key);
        }

        Ok(Self {
            fin,
            opcode,
            mask,
            declared_len,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_payload(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 31 % 251) as u8).collect()
    }

    mod opcode_tests {
        use super::*;

        #[test]
        fn test_is_control() {
            assert!(OpCode::Close.is_control());
            assert!(OpCode::Ping.is_control());
            assert!(OpCode::Pong.is_control());

            assert!(!OpCode::Continuation.is_control());
            assert!(!OpCode::Text.is_control());
            assert!(!OpCode::Binary.is_control());
        }

        #[test]
        fn test_byte_conversion_round_trip() {
            for opcode in [
                OpCode::Continuation,
                OpCode::Text,
                OpCode::Binary,
                OpCode::Close,
                OpCode::Ping,
                OpCode::Pong,
            ] {
                assert_eq!(OpCode::try_from(u8::from(opcode)).unwrap(), opcode);
            }
        }

        #[test]
        fn test_reserved_opcodes_rejected() {
            for code in [0x3, 0x4, 0x5, 0x6, 0x7, 0xB, 0xC, 0xD, 0xE, 0xF] {
                assert!(matches!(
                    OpCode::try_from(code),
                    Err(WebSocketError::InvalidOpCode(b)) if b == code
                ));
            }
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_default_builder_is_always_valid() {
            for from_client in [true, false] {
                for len in [0, 8, 100, 125, 126, 50_000, 65_536, 150_000] {
                    let frame = Frame::outgoing(test_payload(len).as_slice(), from_client);
                    assert!(frame.is_valid(), "len {len}, from_client {from_client}");
                    assert!(frame.fin);
                    assert_eq!(frame.is_masked(), from_client);
                    assert_eq!(frame.declared_len, len as u64);
                }
            }
        }

        #[test]
        fn test_client_frames_get_fresh_keys() {
            let a = Frame::outgoing(b"x".as_ref(), true);
            let b = Frame::outgoing(b"x".as_ref(), true);
            // 1 in 2^32 odds of a spurious failure.
            assert_ne!(a.mask, b.mask);
        }

        #[test]
        fn test_close_and_pong_builders() {
            let close = Frame::close(true);
            assert_eq!(close.opcode, OpCode::Close);
            assert!(close.is_valid() && close.is_masked());

            let pong = Frame::pong(b"ping data".as_ref(), false);
            assert_eq!(pong.opcode, OpCode::Pong);
            assert!(pong.is_valid() && !pong.is_masked());
            assert_eq!(&pong.payload[..], b"ping data");
        }
    }

    mod serialization_tests {
        use super::*;

        #[test]
        fn test_round_trip_all_length_regimes_both_roles() {
            // 100 fits inline, 50000 needs the 16-bit extension, 150000 the
            // 64-bit one.
            for from_client in [true, false] {
                for len in [100, 50_000, 150_000] {
                    let frame = Frame::outgoing(test_payload(len).as_slice(), from_client);
                    let parsed = Frame::from_bytes(&frame.to_bytes()).unwrap();
                    assert_eq!(parsed, frame, "len {len}, from_client {from_client}");
                }
            }
        }

        #[test]
        fn test_fixture_round_trips_byte_exactly() {
            // Declares 17 payload bytes but carries only 3. Parsing must not
            // fail, and re-serialization must reproduce the input exactly.
            let wire = b"\x81\x11cba";
            let frame = Frame::from_bytes(wire).unwrap();

            assert_eq!(frame.opcode, OpCode::Text);
            assert_eq!(frame.declared_len, 17);
            assert_eq!(&frame.payload[..], b"cba");
            assert!(!frame.is_valid());

            assert_eq!(&frame.to_bytes()[..], wire);
        }

        #[test]
        fn test_to_bytes_is_deterministic() {
            let frame = Frame::outgoing(test_payload(300).as_slice(), true);
            assert_eq!(frame.to_bytes(), frame.to_bytes());
        }

        #[test]
        fn test_wire_layout_small_masked() {
            let mut frame = Frame::outgoing(b"Header test".as_ref(), true);
            frame.opcode = OpCode::Text;
            frame.mask = Some([0xAA, 0xBB, 0xCC, 0xDD]);

            let wire = frame.to_bytes();
            assert_eq!(wire[0], 0x81); // FIN=1, RSV=0, opcode=Text
            assert_eq!(wire[1], 0x80 | 11); // MASK=1, len=11
            assert_eq!(&wire[2..6], &[0xAA, 0xBB, 0xCC, 0xDD]);
            assert_eq!(wire[6], b'H' ^ 0xAA);
        }

        #[test]
        fn test_parse_unmasks_payload() {
            let frame = Frame::outgoing(b"masked payload".as_ref(), true);
            let parsed = Frame::from_bytes(&frame.to_bytes()).unwrap();
            assert_eq!(&parsed.payload[..], b"masked payload");
            assert_eq!(parsed.mask, frame.mask);
        }

        #[test]
        fn test_safe_to_bytes_rejects_corrupted_frame() {
            let mut frame = Frame::outgoing(test_payload(8).as_slice(), false);
            frame.declared_len = 1; // corrupt the frame

            assert!(matches!(
                frame.safe_to_bytes(),
                Err(WebSocketError::FrameValidation {
                    declared: 1,
                    actual: 8
                })
            ));
            // The permissive serializer must still work on the same frame.
            let wire = frame.to_bytes();
            assert_eq!(wire[1], 1);
            assert_eq!(wire.len(), 2 + 8);
        }

        #[test]
        fn test_safe_to_bytes_accepts_valid_frame() {
            let frame = Frame::outgoing(test_payload(200).as_slice(), true);
            assert_eq!(frame.safe_to_bytes().unwrap(), frame.to_bytes());
        }

        #[test]
        fn test_safe_to_bytes_rejects_fragmented_control() {
            let mut frame = Frame::close(false);
            frame.fin = false;
            assert!(!frame.is_valid());
            assert!(matches!(
                frame.safe_to_bytes(),
                Err(WebSocketError::ControlFrameFragmented)
            ));
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_truncated_headers() {
            assert!(matches!(
                Frame::from_bytes(&[]),
                Err(WebSocketError::TruncatedFrameHeader)
            ));
            assert!(matches!(
                Frame::from_bytes(&[0x81]),
                Err(WebSocketError::TruncatedFrameHeader)
            ));
            // 16-bit extension announced but absent.
            assert!(matches!(
                Frame::from_bytes(&[0x81, 126, 0x01]),
                Err(WebSocketError::TruncatedFrameHeader)
            ));
            // Mask bit set but no key bytes.
            assert!(matches!(
                Frame::from_bytes(&[0x81, 0x80 | 3, 0x01, 0x02]),
                Err(WebSocketError::TruncatedFrameHeader)
            ));
        }

        #[test]
        fn test_reserved_bits_rejected() {
            assert!(matches!(
                Frame::from_bytes(&[0x81 | 0x40, 0x00]),
                Err(WebSocketError::ReservedBitsNotZero)
            ));
        }

        #[test]
        fn test_unknown_opcode_rejected() {
            assert!(matches!(
                Frame::from_bytes(&[0x83, 0x00]),
                Err(WebSocketError::InvalidOpCode(0x3))
            ));
        }

        #[test]
        fn test_short_payload_parses_as_invalid_frame() {
            let frame = Frame::from_bytes(&[0x82, 5, b'a', b'b']).unwrap();
            assert_eq!(frame.declared_len, 5);
            assert_eq!(frame.actual_len(), 2);
            assert!(!frame.is_valid());
        }

        #[test]
        fn test_trailing_bytes_ignored() {
            // Exactly declared_len bytes are consumed; the rest is not ours.
            let frame = Frame::from_bytes(&[0x82, 2, b'a', b'b', b'c', b'd']).unwrap();
            assert_eq!(&frame.payload[..], b"ab");
            assert!(frame.is_valid());
        }
    }
}
