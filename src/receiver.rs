//! 수신자
//!
//! - 프레임 분류 (컨트롤 센티넬 우선) 및 CRC 검증
//! - ACK/NACK 응답, 청크 조립
//! - 첫 청크로 페이로드 형식 판별
//! - 연결 하나에서 여러 전송 세션을 순서대로 처리

use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use crate::chunk::ChunkIndex;
use crate::content::{classify_first_chunk, is_known_extension, sniff_extension, Classification};
use crate::frame::{
    is_intact_frame, Control, DataFrame, ExtensionTag, Frame, NackReason, Response, ABORT,
};
use crate::sink::{ReceivedPayload, Role, SessionId, SessionSink};
use crate::stats::SessionStats;
use crate::transport::Transport;
use crate::{Config, Error, Result, EXTENSION_TAG_LEN};

/// 수신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// 청크 n 대기
    AwaitingChunk { next: ChunkIndex },

    /// EOT 수신 후 페이로드 확정 중
    Reassembling,

    /// 연결 종료 (`__END__` 수신)
    Done,
}

/// 유닛 하나를 처리한 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// 송신자에게 응답
    Reply(Response),

    /// 응답 없음
    Silent,

    /// 연결 루프 종료
    Finished,
}

/// 연결 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// `__END__` 수신
    EndSignal,

    /// 상대가 연결을 닫음
    TransportClosed,
}

/// 연결 요약
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub end: ConnectionEnd,
}

/// 수신자
pub struct Receiver<T> {
    transport: T,
    config: Config,
    state: ReceiverState,

    /// 조립 버퍼 (현재 세션)
    buffer: BytesMut,
    classification: Option<Classification>,
    tag: Option<ExtensionTag>,
    stats: SessionStats,

    session: SessionId,
    session_open: bool,

    /// 스트림에서 붙어 온 다음 유닛
    pending: Option<Bytes>,

    completed: u64,
    failed: u64,
}

impl<T> Receiver<T> {
    /// 새 수신자 생성
    pub fn new(transport: T, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            state: ReceiverState::AwaitingChunk { next: 0 },
            buffer: BytesMut::new(),
            classification: None,
            tag: None,
            stats: SessionStats::new(),
            session: 0,
            session_open: false,
            pending: None,
            completed: 0,
            failed: 0,
        })
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// 현재 (또는 다음) 세션 ID
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// 유닛 하나 처리 (I/O 없음)
    pub fn on_unit<S: SessionSink>(&mut self, unit: Bytes, sink: &mut S) -> Step {
        if self.state == ReceiverState::Done {
            return Step::Finished;
        }

        if let Some(tag) = self.preamble(&unit) {
            self.open_session(sink);
            debug!("세션 {}: 확장자 태그 수신 ({})", self.session, tag.extension());
            self.tag = Some(tag);
            return Step::Silent;
        }

        match Frame::classify(&unit) {
            Ok(Frame::Control(Control::EndSession)) => {
                if self.session_open {
                    warn!("세션 {} 진행 중 종료 신호 수신, 버퍼 폐기", self.session);
                    self.fail_session(Error::PeerAborted, sink);
                }
                info!("종료 신호 수신");
                self.state = ReceiverState::Done;
                Step::Finished
            }
            Ok(Frame::Control(Control::EndTransmission)) => {
                self.finish_session(sink);
                Step::Silent
            }
            Ok(Frame::Control(Control::Abort)) => {
                self.open_session(sink);
                warn!(
                    "세션 {}: 송신자 전송 중단, {} bytes 폐기",
                    self.session,
                    self.buffer.len()
                );
                self.fail_session(Error::PeerAborted, sink);
                Step::Silent
            }
            Ok(Frame::Data(frame)) => self.on_data(frame, sink),
            Err(e) => {
                self.open_session(sink);
                warn!("세션 {}: {}", self.session, e);
                self.fail_session(e, sink);
                Step::Reply(Response::Nack(NackReason::IncompleteData))
            }
        }
    }

    fn on_data<S: SessionSink>(&mut self, frame: DataFrame, sink: &mut S) -> Step {
        let next = match self.state {
            ReceiverState::AwaitingChunk { next } => next,
            ReceiverState::Reassembling | ReceiverState::Done => return Step::Silent,
        };
        self.open_session(sink);

        let len = frame.payload.len();
        let computed = frame.computed_checksum();
        trace!(
            "청크 {}: CRC received: {:08X} | calculated: {:08X} | match: {}",
            next,
            frame.checksum,
            computed,
            computed == frame.checksum
        );
        self.stats.record_attempt(len, false);

        if let Err(e) = frame.verify() {
            debug!("청크 {}: {}, NACK", next, e);
            self.stats.record_corrupted_frame(len);
            return Step::Reply(Response::Nack(NackReason::ChecksumError));
        }

        if next == 0 {
            self.stats.start(Instant::now());
            let classification = match &self.tag {
                Some(tag) => Classification::binary(tag.extension()),
                None => classify_first_chunk(&frame.payload),
            };
            debug!("세션 {}: 형식 {:?}", self.session, classification);
            self.classification = Some(classification);
        }

        self.buffer.extend_from_slice(&frame.payload);
        self.stats.record_ack(len, None);
        self.state = ReceiverState::AwaitingChunk { next: next + 1 };
        debug!("청크 {} 수락 ({} bytes)", next, len);

        Step::Reply(Response::Ack)
    }

    /// 세션 첫 유닛이 확장자 태그인지
    fn preamble(&self, unit: &[u8]) -> Option<ExtensionTag> {
        if !self.expects_preamble() || unit.len() != EXTENSION_TAG_LEN || is_intact_frame(unit) {
            return None;
        }
        known_tag(unit)
    }

    fn expects_preamble(&self) -> bool {
        self.tag.is_none() && self.state == ReceiverState::AwaitingChunk { next: 0 }
    }

    /// 스트림에서 붙어 온 유닛 분리
    ///
    /// 유닛 전체가 유효한 데이터 프레임이면 그대로 둔다. 앞쪽 컨트롤 센티넬이나
    /// 확장자 태그는 나머지가 그 자체로 온전한 유닛일 때만 떼어 낸다. 그 밖의 유닛은
    /// 통째로 데이터 프레임으로 처리되어 CRC NACK를 받는다.
    pub fn split_unit(&self, mut unit: Bytes) -> (Bytes, Option<Bytes>) {
        if Control::from_wire(&unit).is_some() || is_intact_frame(&unit) {
            return (unit, None);
        }

        let head_len = Control::from_prefix(&unit)
            .map(|control| control.as_bytes().len())
            .filter(|&n| is_unit_sequence(&unit[n..], true))
            .or_else(|| {
                let tagged = unit.len() > EXTENSION_TAG_LEN
                    && self.preamble(&unit[..EXTENSION_TAG_LEN]).is_some()
                    && is_unit_sequence(&unit[EXTENSION_TAG_LEN..], false);
                tagged.then_some(EXTENSION_TAG_LEN)
            });

        match head_len {
            Some(n) => {
                let rest = unit.split_off(n);
                (unit, Some(rest))
            }
            None => (unit, None),
        }
    }

    fn open_session<S: SessionSink>(&mut self, sink: &mut S) {
        if !self.session_open {
            self.session_open = true;
            sink.session_started(Role::Receiver, self.session);
        }
    }

    /// EOT: 페이로드 확정
    fn finish_session<S: SessionSink>(&mut self, sink: &mut S) {
        self.open_session(sink);

        let next = match self.state {
            ReceiverState::AwaitingChunk { next } => next,
            _ => 0,
        };
        if next == 0 {
            warn!("세션 {}: 받은 청크 없이 전송 종료", self.session);
            self.fail_session(Error::EmptyTransmission, sink);
            return;
        }

        self.state = ReceiverState::Reassembling;
        self.stats.finish(Instant::now());

        let data = self.buffer.split().freeze();
        let classification = match self.classification.take() {
            Some(Classification::Text) if std::str::from_utf8(&data).is_err() => {
                // 중간에 잘못된 UTF-8이 있으면 바이너리로 저장
                Classification::binary(sniff_extension(&data))
            }
            Some(classification) => classification,
            None => Classification::binary(sniff_extension(&data)),
        };

        let metrics = self.stats.snapshot();
        info!(
            "세션 {} 수신 완료: {} 청크, {} bytes",
            self.session,
            next,
            data.len()
        );

        sink.metrics(Role::Receiver, self.session, &metrics);
        sink.payload_received(
            self.session,
            ReceivedPayload {
                data,
                classification,
            },
        );
        sink.session_completed(Role::Receiver, self.session);
        self.completed += 1;
        self.reset();
    }

    fn fail_session<S: SessionSink>(&mut self, reason: Error, sink: &mut S) {
        sink.session_failed(Role::Receiver, self.session, &reason);
        self.failed += 1;
        self.reset();
    }

    /// 다음 세션 준비
    fn reset(&mut self) {
        self.buffer.clear();
        self.classification = None;
        self.tag = None;
        self.stats = SessionStats::new();
        self.state = ReceiverState::AwaitingChunk { next: 0 };
        if self.session_open {
            self.session_open = false;
            self.session += 1;
        }
    }

    /// 한 번에 읽을 크기 (프레임 + 붙어 올 수 있는 센티넬/태그)
    fn read_len(&self) -> usize {
        self.config.max_frame_len() + ABORT.len() + EXTENSION_TAG_LEN
    }

    fn summary(&self, end: ConnectionEnd) -> ConnectionSummary {
        ConnectionSummary {
            sessions_completed: self.completed,
            sessions_failed: self.failed,
            end,
        }
    }
}

impl<T: Transport> Receiver<T> {
    /// 연결 루프
    ///
    /// `__END__` 또는 상대의 연결 종료까지 세션을 계속 처리한다.
    pub async fn run<S: SessionSink>(&mut self, sink: &mut S) -> Result<ConnectionSummary> {
        let read_len = self.read_len();

        let end = loop {
            if self.state == ReceiverState::Done {
                break ConnectionEnd::EndSignal;
            }

            let unit = match self.pending.take() {
                Some(unit) => unit,
                None => match self.transport.recv(read_len).await {
                    Ok(unit) => unit,
                    Err(Error::TransportClosed) => break ConnectionEnd::TransportClosed,
                    Err(e) => return Err(e),
                },
            };

            let (unit, rest) = self.split_unit(unit);
            self.pending = rest;

            match self.on_unit(unit, sink) {
                Step::Reply(response) => match self.transport.send(response.to_bytes()).await {
                    Ok(()) => {}
                    Err(Error::TransportClosed) => break ConnectionEnd::TransportClosed,
                    Err(e) => return Err(e),
                },
                Step::Silent => {}
                Step::Finished => break ConnectionEnd::EndSignal,
            }
        };

        if end == ConnectionEnd::TransportClosed && self.session_open {
            warn!("세션 {}: 연결 끊김", self.session);
            self.fail_session(Error::TransportClosed, sink);
        }

        info!(
            "연결 종료 ({:?}): 완료 {} / 실패 {}",
            end, self.completed, self.failed
        );
        Ok(self.summary(end))
    }
}

/// 알려진 확장자의 8바이트 태그
fn known_tag(bytes: &[u8]) -> Option<ExtensionTag> {
    ExtensionTag::parse(bytes).filter(|tag| is_known_extension(tag.extension()))
}

/// 바이트열이 온전한 유닛들로만 이어져 있는지
///
/// 센티넬, 유효한 데이터 프레임, 그리고 `tag_allowed`이면 알려진 태그 (뒤에 유효한
/// 프레임이 붙어도 됨). 센티넬 뒤는 새 세션이라 다시 태그를 허용한다.
fn is_unit_sequence(bytes: &[u8], tag_allowed: bool) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if Control::from_wire(bytes).is_some() || is_intact_frame(bytes) {
        return true;
    }
    if let Some(control) = Control::from_prefix(bytes) {
        if is_unit_sequence(&bytes[control.as_bytes().len()..], true) {
            return true;
        }
    }
    if !tag_allowed || bytes.len() < EXTENSION_TAG_LEN {
        return false;
    }
    let (head, rest) = bytes.split_at(EXTENSION_TAG_LEN);
    known_tag(head).is_some() && (rest.is_empty() || is_intact_frame(rest))
}
