//! Stream codec for WebSocket frames.
//!
//! [`FrameCodec`] adapts the frame codec to `tokio_util`'s [`codec::Decoder`] and
//! [`codec::Encoder`] traits so a transport can be wrapped in
//! `Framed<S, FrameCodec>`. Decoding is incremental: nothing is consumed until a
//! complete header and the full declared payload have arrived, so partial reads
//! simply yield `Ok(None)`. Encoding enforces the same invariants as
//! [`Frame::safe_to_bytes`], which makes the framed sink the validated path — an
//! invalid frame never reaches the wire through a connection.

use bytes::{Buf, BytesMut};
use tokio_util::codec;

use crate::{
    frame::{Frame, MAX_HEAD_SIZE, OpCode},
    length, mask, WebSocketError,
};

/// Default cap on incoming payload size (2 MiB), guarding against memory
/// exhaustion from a hostile length header.
pub const MAX_PAYLOAD_SIZE: usize = 2 * 1024 * 1024;

/// Frame decoder/encoder for use with `tokio_util::codec::Framed`.
#[derive(Debug)]
pub struct FrameCodec {
    /// Maximum allowed size for an incoming frame payload.
    max_payload_size: usize,
}

impl FrameCodec {
    /// Creates a codec with a custom incoming payload cap.
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl codec::Decoder for FrameCodec {
    type Item = Frame;
    type Error = WebSocketError;

    /// Decodes one frame from `src`, unmasking the payload.
    ///
    /// Returns `Ok(None)` until the complete frame is buffered. Frames that
    /// violate header structure (reserved bits, unknown opcodes, fragmented
    /// control frames) or exceed the payload cap are protocol errors; a framed
    /// stream surfaces them and the connection layer tears down.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        let b0 = src[0];
        let masked = src[1] & 0x80 != 0;
        let extra = match src[1] & 0x7F {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let header_size = 2 + extra + masked as usize * 4;
        if src.len() < header_size {
            src.reserve(header_size - src.len());
            return Ok(None);
        }

        if b0 & 0x70 != 0 {
            return Err(WebSocketError::ReservedBitsNotZero);
        }
        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::try_from(b0 & 0x0F)?;

        let (declared_len, len_size) =
            length::decode(&src[1..]).ok_or(WebSocketError::TruncatedFrameHeader)?;
        let payload_len =
            usize::try_from(declared_len).map_err(|_| WebSocketError::FrameTooLarge)?;
        if payload_len > self.max_payload_size {
            return Err(WebSocketError::FrameTooLarge);
        }
        if opcode.is_control() && !fin {
            return Err(WebSocketError::ControlFrameFragmented);
        }
        if opcode.is_control() && payload_len > length::MAX_INLINE as usize {
            return Err(WebSocketError::FrameTooLarge);
        }

        if src.len() < header_size + payload_len {
            src.reserve(header_size + payload_len - src.len());
            return Ok(None);
        }

        src.advance(1 + len_size);
        let mask = if masked {
            let mut key = [0u8; 4];
            key.copy_from_slice(&src[..4]);
            src.advance(4);
            Some(key)
        } else {
            None
        };

        let mut payload = src.split_to(payload_len);
        if let Some(key) = mask {
            mask::apply_mask(&mut payload, key);
        }

        Ok(Some(Frame {
            fin,
            opcode,
            mask,
            declared_len,
            payload,
        }))
    }
}

impl codec::Encoder<Frame> for FrameCodec {
    type Error = WebSocketError;

    /// Encodes a frame through the validated serialization path.
    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut head = [0u8; MAX_HEAD_SIZE];
        if frame.declared_len != frame.actual_len() {
            return Err(WebSocketError::FrameValidation {
                declared: frame.declared_len,
                actual: frame.actual_len(),
            });
        }
        if frame.opcode.is_control() && !frame.fin {
            return Err(WebSocketError::ControlFrameFragmented);
        }

        let head_size = frame.fmt_head(&mut head);
        dst.reserve(head_size + frame.payload.len());
        dst.extend_from_slice(&head[..head_size]);
        match frame.mask {
            Some(key) => {
                let mut masked = frame.payload;
                mask::apply_mask(&mut masked, key);
                dst.extend_from_slice(&masked);
            }
            None => dst.extend_from_slice(&frame.payload),
        }
        Ok(())
    }
}
