//! CRC32 codec.
//!
//! A single pure function over byte slices: the standard reflected
//! polynomial 0xEDB88320 with seed 0xFFFFFFFF and final XOR 0xFFFFFFFF,
//! i.e. the CRC-32 every zip/ethernet tool computes. Sector headers are
//! checksummed over their first 8 encoded bytes, record payloads over
//! their full length. Deterministic; not a security primitive.

/// CRC32 of `data`.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Bit-at-a-time reference implementation of the same CRC.
    fn crc32_bitwise(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        !crc
    }

    #[test]
    fn test_crc32_check_value() {
        // The standard check value for this CRC variant.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_crc32_matches_bitwise_reference() {
        let mut rng = rand::thread_rng();
        for len in [0usize, 1, 7, 64, 1000] {
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            assert_eq!(crc32(&data), crc32_bitwise(&data));
        }
    }

    #[test]
    fn test_crc32_sensitive_to_single_bit() {
        let mut data = vec![0x55u8; 32];
        let before = crc32(&data);
        data[16] ^= 0x01;
        assert_ne!(crc32(&data), before);
    }
}
