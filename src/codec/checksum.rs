//! Keyed hashes and the custom login checksum.
//!
//! Both are pure functions. The custom checksum reproduces the reference
//! client bit for bit, including two quirks the servers depend on:
//!
//! - a `0x0a` byte inside the current 4-byte window restarts grouping one
//!   byte past it, so the bytes before it in that window are skipped;
//! - grouping runs only while more than 4 bytes remain from the window
//!   start. Without a realignment the trailing 1-4 bytes are skipped; after
//!   one, the last group may run past the end and is zero-extended.

use md5::{Digest, Md5};

/// Accumulator seed.
const CHECKSUM_SEED: u32 = 1234;

/// Final multiplier.
const CHECKSUM_FACTOR: u32 = 1968;

/// MD5 over the concatenation of `parts`.
pub fn md5(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// First 8 bytes of the MD5 over `parts` ("hash A").
pub fn hash_a(parts: &[&[u8]]) -> [u8; 8] {
    let digest = md5(parts);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Custom checksum embedded at offset 314 of the login record.
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let mut acc = CHECKSUM_SEED;
    let mut i = 0;

    while i + 4 < data.len() {
        if let Some(pos) = data[i..i + 4].iter().position(|&b| b == 0x0a) {
            i += pos + 1;
        }

        // Reversed group read big-endian == group read little-endian
        let end = (i + 4).min(data.len());
        let mut word = [0u8; 4];
        word[..end - i].copy_from_slice(&data[i..end]);
        acc ^= u32::from_le_bytes(word);

        i += 4;
    }

    acc.wrapping_mul(CHECKSUM_FACTOR).to_le_bytes()
}
