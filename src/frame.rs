//! 와이어 프레임 정의
//!
//! 데이터 프레임: `chunk || crc32 (4 bytes, big-endian)`
//! 컨트롤 프레임: 예약된 고정 바이트열 (`__END__`, `__EOT__`, `__ABORT__`)
//! 응답: `ACK...` 또는 `NACK...` (앞부분만 의미 있음)

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::checksum;
use crate::{Error, Result, CHECKSUM_LEN, EXTENSION_TAG_LEN, MIN_DATA_FRAME_LEN};

/// 세션 종료 (연결 단위)
pub const END_SESSION: &[u8] = b"__END__";

/// 전송 종료 (페이로드 단위)
pub const END_TRANSMISSION: &[u8] = b"__EOT__";

/// 전송 중단
pub const ABORT: &[u8] = b"__ABORT__";

/// 컨트롤 프레임 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// 연결 종료
    EndSession,

    /// 페이로드 전송 완료
    EndTransmission,

    /// 재시도 한도 초과로 전송 중단
    Abort,
}

impl Control {
    pub const ALL: [Control; 3] = [Control::EndSession, Control::EndTransmission, Control::Abort];

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Control::EndSession => END_SESSION,
            Control::EndTransmission => END_TRANSMISSION,
            Control::Abort => ABORT,
        }
    }

    /// 정확히 일치할 때만 컨트롤 프레임으로 인식
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        Control::ALL
            .into_iter()
            .find(|control| control.as_bytes() == bytes)
    }

    /// 센티넬로 시작하면 해당 컨트롤 (스트림에서 뒤 유닛과 붙어 온 경우)
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        Control::ALL
            .into_iter()
            .find(|control| bytes.starts_with(control.as_bytes()))
    }
}

/// 디코딩된 데이터 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// 청크 데이터
    pub payload: Bytes,

    /// 수신된 CRC32
    pub checksum: u32,
}

impl DataFrame {
    /// 청크 데이터로 다시 계산한 CRC32
    pub fn computed_checksum(&self) -> u32 {
        checksum(&self.payload)
    }

    /// CRC 검증
    pub fn verify(&self) -> Result<()> {
        let got = self.computed_checksum();
        if got == self.checksum {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: self.checksum,
                got,
            })
        }
    }
}

/// 인바운드 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Control(Control),
}

impl Frame {
    /// 컨트롤 센티넬을 먼저 확인한 뒤 데이터 프레임으로 디코딩
    pub fn classify(bytes: &[u8]) -> Result<Self> {
        match Control::from_wire(bytes) {
            Some(control) => Ok(Frame::Control(control)),
            None => decode_data(bytes).map(Frame::Data),
        }
    }
}

/// 청크 뒤에 CRC32 트레일러를 붙여 직렬화
pub fn encode_data(chunk: &[u8]) -> Bytes {
    encode_with_checksum(chunk, checksum(chunk))
}

/// 주어진 CRC로 직렬화
///
/// 손상 시뮬레이션은 원본 데이터의 CRC를 유지한 채 데이터만 바꾼다.
pub fn encode_with_checksum(chunk: &[u8], crc: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(chunk.len() + CHECKSUM_LEN);
    buf.put_slice(chunk);
    buf.put_u32(crc);
    buf.freeze()
}

/// 데이터 프레임 역직렬화
pub fn decode_data(bytes: &[u8]) -> Result<DataFrame> {
    if bytes.len() < MIN_DATA_FRAME_LEN {
        return Err(Error::MalformedFrame { len: bytes.len() });
    }

    let (payload, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let checksum = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

    Ok(DataFrame {
        payload: Bytes::copy_from_slice(payload),
        checksum,
    })
}

/// 유닛 전체가 CRC 검증을 통과하는 데이터 프레임인지
pub fn is_intact_frame(bytes: &[u8]) -> bool {
    decode_data(bytes).map_or(false, |frame| frame.verify().is_ok())
}

/// NACK 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackReason {
    /// CRC 불일치
    ChecksumError,

    /// 프레임이 너무 짧음
    IncompleteData,

    /// 알 수 없는 응답
    Unrecognized,
}

/// 수신자 → 송신자 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack,
    Nack(NackReason),
}

impl Response {
    pub fn to_bytes(&self) -> &'static [u8] {
        match self {
            Response::Ack => b"ACK: CRC32 valid",
            Response::Nack(NackReason::ChecksumError) => b"NACK: CRC32 error",
            Response::Nack(NackReason::IncompleteData) => b"NACK: Incomplete data",
            Response::Nack(NackReason::Unrecognized) => b"NACK",
        }
    }

    /// 응답 해석
    ///
    /// `ACK` 접두사만 ACK로 본다. 나머지는 모두 재전송 대상이다.
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"ACK") {
            Response::Ack
        } else if bytes.starts_with(b"NACK: Incomplete") {
            Response::Nack(NackReason::IncompleteData)
        } else if bytes.starts_with(b"NACK: CRC") {
            Response::Nack(NackReason::ChecksumError)
        } else {
            Response::Nack(NackReason::Unrecognized)
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Response::Ack)
    }
}

/// 8바이트 확장자 태그 (`.mp3    `)
///
/// 전송 시작 전에 보내서 수신자가 매직 바이트 대신 이 값으로 형식을 정하게 한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionTag([u8; EXTENSION_TAG_LEN]);

impl ExtensionTag {
    /// `.`으로 시작하고 영숫자 1~7자인 확장자만 허용
    pub fn new(extension: &str) -> Result<Self> {
        let raw = extension.as_bytes();
        let valid = raw.len() >= 2
            && raw.len() <= EXTENSION_TAG_LEN
            && raw[0] == b'.'
            && raw[1..].iter().all(|b| b.is_ascii_alphanumeric());
        if !valid {
            return Err(Error::InvalidExtensionTag(extension.to_string()));
        }

        let mut tag = [b' '; EXTENSION_TAG_LEN];
        tag[..raw.len()].copy_from_slice(&raw.to_ascii_lowercase());
        Ok(Self(tag))
    }

    /// 앞 8바이트가 태그 형식이면 파싱
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..EXTENSION_TAG_LEN)?;
        if raw[0] != b'.' {
            return None;
        }

        let name_len = raw[1..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        if name_len == 0 || raw[1 + name_len..].iter().any(|&b| b != b' ') {
            return None;
        }

        let mut tag = [0u8; EXTENSION_TAG_LEN];
        tag.copy_from_slice(raw);
        Some(Self(tag))
    }

    /// 공백을 제거한 확장자 (`.mp3`)
    pub fn extension(&self) -> &str {
        let end = self
            .0
            .iter()
            .position(|&b| b == b' ')
            .unwrap_or(EXTENSION_TAG_LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or_default()
    }

    pub fn to_wire(&self) -> [u8; EXTENSION_TAG_LEN] {
        self.0
    }
}
