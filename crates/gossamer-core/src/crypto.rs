//! BLAKE3 hashing for artifact checksums.
//!
//! Checksums are computed over the uncompressed payload, so a receiver can
//! verify an artifact after decompression regardless of how it travelled.

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// First eight bytes of an identifier, hex-encoded. For log fields.
pub fn short_hex(id: &[u8; 32]) -> String {
    hex::encode(&id[..8])
}
