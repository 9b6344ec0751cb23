//! 프로토콜 설정

use std::time::Duration;

use crate::{Error, Result, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_CHUNK_SIZE, MAX_RETRIES};

/// SWARQ 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트)
    pub chunk_size: usize,

    /// ACK/NACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 청크당 최대 전송 시도 횟수
    /// 초과 시 ABORT 전송
    pub max_retries: u32,

    /// 전송 시도마다 비트 하나를 뒤집을 확률 (0.0 ~ 1.0)
    /// 시뮬레이션용, 0이면 손상 없음
    pub corruption_probability: f64,

    /// 손상 시뮬레이션 난수 시드 (None이면 엔트로피 사용)
    pub rng_seed: Option<u64>,

    /// 알려진 파일 형식이면 8바이트 확장자 태그를 먼저 전송
    pub send_extension_tag: bool,

    /// ACK/NACK 응답 수신 버퍼 크기
    pub response_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS, // 3초
            max_retries: MAX_RETRIES,
            corruption_probability: 0.0,
            rng_seed: None,
            send_extension_tag: true,
            response_buffer_size: 1024,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 비트 에러 시뮬레이션 설정
    pub fn simulation(corruption_probability: f64) -> Self {
        Self {
            corruption_probability,
            ..Self::default()
        }
    }

    /// 저지연 링크용 설정
    pub fn low_latency() -> Self {
        Self {
            chunk_size: 512,
            ack_timeout_ms: 500,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            chunk_size: 512,         // 작은 청크
            ack_timeout_ms: 10_000,
            max_retries: 10,
            ..Self::default()
        }
    }

    /// ACK 대기 타임아웃
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 데이터 프레임 최대 크기 (청크 + CRC 트레일러)
    pub fn max_frame_len(&self) -> usize {
        self.chunk_size + crate::CHECKSUM_LEN
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries는 0보다 커야 함".into()));
        }
        if self.ack_timeout_ms == 0 {
            return Err(Error::InvalidConfig("ack_timeout_ms는 0보다 커야 함".into()));
        }
        if !(0.0..=1.0).contains(&self.corruption_probability) {
            return Err(Error::InvalidConfig(format!(
                "corruption_probability 범위 초과: {}",
                self.corruption_probability
            )));
        }
        if self.response_buffer_size < 4 {
            return Err(Error::InvalidConfig("response_buffer_size가 너무 작음".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.ack_timeout(), Duration::from_secs(3));
        assert_eq!(config.max_frame_len(), 1028);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(Config::simulation(0.3).validate().is_ok());
        assert!(Config::low_latency().validate().is_ok());
        assert!(Config::unstable_network().validate().is_ok());
    }

    #[test]
    fn test_rejects_invalid() {
        let zero_chunk = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(zero_chunk.validate(), Err(Error::InvalidConfig(_))));

        assert!(Config::simulation(1.5).validate().is_err());
        assert!(Config::simulation(-0.1).validate().is_err());

        let no_retries = Config {
            max_retries: 0,
            ..Config::default()
        };
        assert!(no_retries.validate().is_err());
    }
}
