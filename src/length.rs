//! Payload length codec.
//!
//! RFC 6455 encodes a frame's payload length into the low 7 bits of the second
//! header byte, escaping to a 16-bit or 64-bit big-endian extension through the
//! sentinel values 126 and 127:
//!
//! - lengths <= 125 are stored inline,
//! - lengths in (125, 65535] are stored as `126` followed by a `u16`,
//! - larger lengths are stored as `127` followed by a `u64`.
//!
//! The codec works on the length field alone. It never sees the payload, so
//! decoding a header whose declared length disagrees with the bytes actually on
//! the wire succeeds here by construction; that mismatch is a frame-level
//! validity concern, reported by [`crate::frame::Frame::is_valid`].

/// Largest length that fits inline in the 7-bit field.
pub const MAX_INLINE: u64 = 125;

/// Sentinel selecting the 16-bit extension.
const EXT16: u8 = 126;

/// Sentinel selecting the 64-bit extension.
const EXT64: u8 = 127;

/// Encodes `len` into its minimal wire representation.
///
/// Writes the 7-bit length field into `dst[0]` (with the mask bit left clear)
/// and any extension into the following bytes, returning the number of bytes
/// written (1, 3, or 9).
///
/// # Panics
/// Panics if `dst` is too small for the chosen representation; callers size
/// their header buffers with [`crate::frame::MAX_HEAD_SIZE`].
pub fn encode(len: u64, dst: &mut [u8]) -> usize {
    if len <= MAX_INLINE {
        dst[0] = len as u8;
        1
    } else if len <= u64::from(u16::MAX) {
        dst[0] = EXT16;
        dst[1..3].copy_from_slice(&(len as u16).to_be_bytes());
        3
    } else {
        dst[0] = EXT64;
        dst[1..9].copy_from_slice(&len.to_be_bytes());
        9
    }
}

/// Decodes a length field starting at `src[0]`.
///
/// The mask bit in `src[0]` is ignored, so the slice may point directly at the
/// second byte of a frame header. Returns the declared length and the number of
/// bytes consumed, or `None` when the slice ends before the extension does.
pub fn decode(src: &[u8]) -> Option<(u64, usize)> {
    let code = *src.first()? & 0x7F;
    match code {
        EXT16 => {
            let ext: [u8; 2] = src.get(1..3)?.try_into().ok()?;
            Some((u64::from(u16::from_be_bytes(ext)), 3))
        }
        EXT64 => {
            let ext: [u8; 8] = src.get(1..9)?.try_into().ok()?;
            Some((u64::from_be_bytes(ext), 9))
        }
        inline => Some((u64::from(inline), 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_inline() {
        let mut dst = [0u8; 9];
        for len in [0u64, 1, 125] {
            assert_eq!(encode(len, &mut dst), 1);
            assert_eq!(dst[0], len as u8);
        }
    }

    #[test]
    fn test_encode_extended16() {
        let mut dst = [0u8; 9];
        assert_eq!(encode(126, &mut dst), 3);
        assert_eq!(&dst[..3], &[126, 0x00, 0x7E]);

        assert_eq!(encode(65535, &mut dst), 3);
        assert_eq!(&dst[..3], &[126, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_extended64() {
        let mut dst = [0u8; 9];
        assert_eq!(encode(65536, &mut dst), 9);
        assert_eq!(dst[0], 127);
        assert_eq!(&dst[1..9], &65536u64.to_be_bytes());
    }

    #[test]
    fn test_decode_is_inverse_of_encode() {
        let mut dst = [0u8; 9];
        for len in [0u64, 1, 100, 125, 126, 5000, 50000, 65535, 65536, 150000] {
            let written = encode(len, &mut dst);
            assert_eq!(decode(&dst), Some((len, written)), "length {len}");
        }
    }

    #[test]
    fn test_decode_ignores_mask_bit() {
        assert_eq!(decode(&[0x80 | 11]), Some((11, 1)));
        assert_eq!(decode(&[0x80 | 126, 0xC3, 0x50]), Some((50000, 3)));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[126]), None);
        assert_eq!(decode(&[126, 0x01]), None);
        assert_eq!(decode(&[127, 0, 0, 0, 0, 0, 0, 1]), None);
    }

    #[test]
    fn test_decode_tolerates_non_minimal_header() {
        // A peer may (illegally) use the wide form for a small length; the
        // codec reports what the header declares.
        let mut dst = [0u8; 9];
        dst[0] = 127;
        dst[1..9].copy_from_slice(&3u64.to_be_bytes());
        assert_eq!(decode(&dst), Some((3, 9)));
    }
}
