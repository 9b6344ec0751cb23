//! # SWARQ (Stop-and-Wait ARQ)
//!
//! 바이트 스트림 위에서 CRC32로 검증하는 청크 단위 신뢰 전송
//!
//! ## 핵심 특징
//! - **Stop-and-Wait**: 청크 하나 보내고 ACK/NACK를 받은 뒤 다음 청크
//! - **CRC32 트레일러**: 모든 데이터 프레임 끝에 4바이트 체크섬
//! - **유한 재시도**: NACK/타임아웃 시 재전송, 한도 초과 시 ABORT
//! - **형식 판별**: 첫 청크로 텍스트/바이너리 구분, 매직 바이트로 확장자 추정
//! - **비트 에러 시뮬레이션**: 전송 바이트에 확률적으로 비트 반전
//! - **세션 통계**: 처리율, 무결성 비율, RTT, SNR

pub mod checksum;
pub mod chunk;
pub mod config;
pub mod content;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod sender;
pub mod sink;
pub mod stats;
pub mod transport;

pub use chunk::{Chunk, ChunkIndex, Chunker, Payload};
pub use config::Config;
pub use content::Classification;
pub use error::{Error, Result};
pub use frame::{Control, ExtensionTag, Frame, NackReason, Response};
pub use receiver::{ConnectionEnd, ConnectionSummary, Receiver, ReceiverState, Step};
pub use sender::{Delivery, Sender, SenderState, SessionOutcome, SessionReport};
pub use sink::{
    NullSink, ReceivedPayload, RecordingSink, Role, SessionId, SessionSink, TracingSink,
};
pub use stats::{MetricsSnapshot, SessionStats, Snr};
pub use transport::{MemoryTransport, TcpTransport, Transport};

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// 기본 TCP 포트
pub const DEFAULT_PORT: u16 = 65432;

/// 청크당 최대 전송 시도 횟수
pub const MAX_RETRIES: u32 = 5;

/// 기본 ACK 대기 타임아웃 (밀리초)
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 3000;

/// CRC32 트레일러 길이
pub const CHECKSUM_LEN: usize = 4;

/// 데이터 프레임 최소 길이 (1바이트 청크 + CRC)
pub const MIN_DATA_FRAME_LEN: usize = 1 + CHECKSUM_LEN;

/// 확장자 태그 길이
pub const EXTENSION_TAG_LEN: usize = 8;
