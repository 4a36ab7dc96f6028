//! Masking engine.
//!
//! Client-to-server frames are XOR-masked with a 4-byte key
//! ([RFC 6455 Section 5.3](https://datatracker.ietf.org/doc/html/rfc6455#section-5.3)).
//! The operation is its own inverse, so [`apply_mask`] both masks and unmasks.
//! Masking happens only at the serialization boundary; in-memory payloads are
//! always the unmasked, logical form.

/// Mask or unmask `buf` in place with `key[i % 4]`.
///
/// Works four bytes at a time with a byte-wise tail, which the optimizer turns
/// into wide XORs without any alignment gymnastics.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        for (byte, k) in chunk.iter_mut().zip(key) {
            *byte ^= k;
        }
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(key) {
        *byte ^= k;
    }
}

/// Samples a fresh masking key.
///
/// Called once per outgoing client frame; keys are never reused across frames.
#[inline]
pub fn generate() -> [u8; 4] {
    rand::random()
}
