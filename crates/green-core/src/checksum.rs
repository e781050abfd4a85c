//! CRC32 checksum for firmware images and payloads.
//!
//! The variant is CRC-32/MPEG-2: polynomial `0x04C11DB7`, initial register
//! `0xFFFFFFFF`, bits processed MSB first, no reflection and no final XOR.
//! Deployed nodes store and compare checksums computed this way, so this must
//! not be swapped for the more common reflected CRC-32.

use crc::{Crc, Digest, CRC_32_MPEG_2};
use thiserror::Error;

static MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Value returned for an empty buffer (the untouched initial register).
pub const CRC32_INIT: u32 = 0xFFFF_FFFF;

/// Compute the CRC32 of `data`.
///
/// Pure and reentrant. A zero-length buffer yields [`CRC32_INIT`].
pub fn calculate_crc32(data: &[u8]) -> u32 {
    MPEG2.checksum(data)
}

/// Returned by [`verify_crc32`] when a buffer does not match its checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("CRC32 mismatch: expected 0x{expected:08X}, computed 0x{actual:08X}")]
pub struct ChecksumMismatch {
    pub expected: u32,
    pub actual: u32,
}

/// Check `data` against a previously stored checksum.
pub fn verify_crc32(data: &[u8], expected: u32) -> Result<(), ChecksumMismatch> {
    let actual = calculate_crc32(data);
    if actual == expected {
        Ok(())
    } else {
        Err(ChecksumMismatch { expected, actual })
    }
}

/// Parse a checksum written as hex, with or without a `0x` prefix.
///
/// Only hex digits are accepted after the prefix, so signs and inner
/// whitespace are rejected. Surrounding whitespace is ignored.
pub fn parse_crc32_hex(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Incremental CRC32 for data that arrives in chunks (e.g. an OTA download).
///
/// Feeding the chunks of a buffer in order gives the same result as
/// [`calculate_crc32`] over the whole buffer.
pub struct Crc32 {
    digest: Digest<'static, u32>,
    len: usize,
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            digest: MPEG2.digest(),
            len: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.digest.update(chunk);
        self.len += chunk.len();
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }

    /// Finish and compare against `expected`, returning the computed value.
    pub fn verify(self, expected: u32) -> Result<u32, ChecksumMismatch> {
        let actual = self.finalize();
        if actual == expected {
            Ok(actual)
        } else {
            Err(ChecksumMismatch { expected, actual })
        }
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Bit-at-a-time reference: for every input bit, MSB first, XOR it with
    /// the register's top bit, shift left, and apply the polynomial when set.
    fn reference_crc32(data: &[u8]) -> u32 {
        let mut crc: u32 = 0xFFFF_FFFF;
        for &byte in data {
            for i in (0..8).rev() {
                let bit = ((crc >> 31) & 1) ^ ((byte as u32 >> i) & 1);
                crc <<= 1;
                if bit != 0 {
                    crc ^= 0x04C1_1DB7;
                }
            }
        }
        crc
    }

    /// Small xorshift generator so the sample inputs are reproducible.
    fn sample_bytes(seed: u64, len: usize) -> Vec<u8> {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }

    #[test]
    fn test_empty_input_is_initial_register() {
        assert_eq!(calculate_crc32(&[]), 0xFFFF_FFFF);
        assert_eq!(calculate_crc32(&[]), CRC32_INIT);
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(calculate_crc32(&[0x00]), 0x4E08_BFB4);
        assert_eq!(calculate_crc32(&[0xFF]), 0xFFFF_FF00);
        assert_eq!(calculate_crc32(b"123456789"), 0x0376_E6E7);
        assert_eq!(calculate_crc32(&[0x00, 0x00, 0x00, 0x00]), 0xC704_DD7B);
    }

    #[test]
    fn test_matches_bitwise_reference() {
        for (seed, len) in [(1u64, 1usize), (7, 3), (42, 64), (1234, 257), (99, 4096)] {
            let data = sample_bytes(seed, len);
            assert_eq!(calculate_crc32(&data), reference_crc32(&data), "len {}", len);
        }
    }

    #[test]
    fn test_deterministic() {
        let data = sample_bytes(5, 512);
        assert_eq!(calculate_crc32(&data), calculate_crc32(&data));
    }

    #[test]
    fn test_input_not_mutated() {
        let data = sample_bytes(11, 32);
        let copy = data.clone();
        let _ = calculate_crc32(&data);
        assert_eq!(data, copy);
    }

    #[test]
    fn test_differing_inputs_differ() {
        let mut seen = std::collections::HashSet::new();
        for seed in 1..200u64 {
            let data = sample_bytes(seed, 16);
            seen.insert((data.clone(), calculate_crc32(&data)));
        }
        let inputs: std::collections::HashSet<_> = seen.iter().map(|(d, _)| d.clone()).collect();
        let sums: std::collections::HashSet<_> = seen.iter().map(|(_, c)| *c).collect();
        assert_eq!(inputs.len(), sums.len());
    }

    #[test]
    fn test_single_bit_flip_changes_checksum() {
        let data = sample_bytes(77, 128);
        let original = calculate_crc32(&data);
        for bit in [0usize, 1, 7, 8, 500, 1023] {
            let mut flipped = data.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(calculate_crc32(&flipped), original, "bit {}", bit);
        }
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = sample_bytes(3, 1000);
        let mut digest = Crc32::new();
        for chunk in data.chunks(97) {
            digest.update(chunk);
        }
        assert_eq!(digest.len(), 1000);
        assert_eq!(digest.finalize(), calculate_crc32(&data));
    }

    #[test]
    fn test_empty_digest() {
        let digest = Crc32::default();
        assert!(digest.is_empty());
        assert_eq!(digest.finalize(), CRC32_INIT);
    }

    #[test]
    fn test_verify() {
        assert!(verify_crc32(b"123456789", 0x0376_E6E7).is_ok());

        let err = verify_crc32(b"123456789", 0xDEAD_BEEF).unwrap_err();
        assert_eq!(err.expected, 0xDEAD_BEEF);
        assert_eq!(err.actual, 0x0376_E6E7);
        assert_eq!(
            err.to_string(),
            "CRC32 mismatch: expected 0xDEADBEEF, computed 0x0376E6E7"
        );
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_crc32_hex("0x0376E6E7"), Some(0x0376_E6E7));
        assert_eq!(parse_crc32_hex("0X0376e6e7"), Some(0x0376_E6E7));
        assert_eq!(parse_crc32_hex(" ffffffff\r\n"), Some(u32::MAX));
        assert_eq!(parse_crc32_hex("3"), Some(3));

        assert_eq!(parse_crc32_hex("+3"), None);
        assert_eq!(parse_crc32_hex("0x+3"), None);
        assert_eq!(parse_crc32_hex("-1"), None);
        assert_eq!(parse_crc32_hex("0x"), None);
        assert_eq!(parse_crc32_hex(""), None);
        assert_eq!(parse_crc32_hex("dead beef"), None);
        assert_eq!(parse_crc32_hex("1_0000_0000"), None);
        assert_eq!(parse_crc32_hex("100000000"), None);
    }

    #[test]
    fn test_incremental_verify() {
        let mut digest = Crc32::new();
        digest.update(b"1234");
        digest.update(b"56789");
        assert_eq!(digest.verify(0x0376_E6E7), Ok(0x0376_E6E7));

        let mut digest = Crc32::new();
        digest.update(b"123456789");
        assert_eq!(
            digest.verify(0xDEAD_BEEF),
            Err(ChecksumMismatch {
                expected: 0xDEAD_BEEF,
                actual: 0x0376_E6E7,
            })
        );
    }
}
