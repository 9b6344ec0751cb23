//! 에러 타입 정의

use std::io;

use thiserror::Error;

/// SWARQ 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] io::Error),

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("ACK 대기 타임아웃: chunk={chunk}, timeout={timeout_ms}ms")]
    FrameTimeout { chunk: u64, timeout_ms: u64 },

    #[error("잘못된 프레임: {len} bytes (최소 5 bytes 필요)")]
    MalformedFrame { len: usize },

    #[error("재시도 한도 초과: chunk={chunk}, attempts={attempts}")]
    RetryBudgetExhausted { chunk: u64, attempts: u32 },

    #[error("상대방이 전송을 중단함")]
    PeerAborted,

    #[error("빈 전송: 받은 청크 없음")]
    EmptyTransmission,

    #[error("연결 종료")]
    TransportClosed,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("유효하지 않은 확장자 태그: {0}")]
    InvalidExtensionTag(String),
}

impl Error {
    /// 재시도 루프 안에서 복구 가능한 청크 단위 에러인지
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ChecksumMismatch { .. } | Error::FrameTimeout { .. })
    }

    /// 연결 자체가 끊긴 경우
    pub fn is_transport_closed(&self) -> bool {
        matches!(self, Error::TransportClosed)
    }

    /// 소켓 I/O 에러 중 연결 종료에 해당하는 것은 `TransportClosed`로 변환
    pub(crate) fn from_transport(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::TransportClosed,
            _ => Error::Io(err),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::ChecksumMismatch { expected: 1, got: 2 }.is_recoverable());
        assert!(Error::FrameTimeout { chunk: 0, timeout_ms: 3000 }.is_recoverable());
        assert!(!Error::MalformedFrame { len: 3 }.is_recoverable());
        assert!(!Error::RetryBudgetExhausted { chunk: 0, attempts: 5 }.is_recoverable());
        assert!(!Error::TransportClosed.is_recoverable());
    }

    #[test]
    fn test_io_kind_mapping() {
        let closed = Error::from_transport(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(closed.is_transport_closed());

        let other = Error::from_transport(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(other, Error::Io(_)));
    }
}
