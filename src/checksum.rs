//! 무결성 코드
//!
//! - CRC-32 (IEEE, zlib 호환): 데이터 프레임 트레일러
//! - CRC-16-CCITT: 보조 유틸리티

/// CRC-16-CCITT 다항식
const CCITT_POLY: u16 = 0x1021;

/// CRC-16-CCITT 초기값
const CCITT_INIT: u16 = 0xFFFF;

/// 바이트열의 CRC-32 계산
///
/// 빈 입력도 허용하며 항상 같은 값을 반환한다.
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// 바이트열의 CRC-16-CCITT 계산 (poly 0x1021, init 0xFFFF)
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(CCITT_INIT, |mut crc, &byte| {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CCITT_POLY
            } else {
                crc << 1
            };
        }
        crc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
        assert_eq!(crc16_ccitt(b""), 0xFFFF);
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(checksum(&data), checksum(&data));
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let data = b"The quick brown fox jumps over the lazy dog".to_vec();
        let original = checksum(&data);

        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(checksum(&flipped), original, "byte {byte} bit {bit}");
            }
        }
    }
}
