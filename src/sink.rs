//! 세션 이벤트 출력
//!
//! 엔진은 결과를 어떻게 표시/저장할지 모른다. 바깥 쪽이 `SessionSink`를 구현해서 받는다.

use bytes::Bytes;
use tracing::{info, warn};

use crate::content::Classification;
use crate::stats::MetricsSnapshot;
use crate::Error;

/// 세션 ID (연결 안에서 0부터 증가)
pub type SessionId = u64;

/// 세션 주체
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// 조립 완료된 페이로드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPayload {
    pub data: Bytes,
    pub classification: Classification,
}

impl ReceivedPayload {
    /// 텍스트 페이로드면 문자열
    pub fn as_text(&self) -> Option<&str> {
        if self.classification.is_text() {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }
}

/// 세션 이벤트 수신자
///
/// 모든 메서드는 연결을 소유한 태스크에서만 호출된다.
pub trait SessionSink {
    fn session_started(&mut self, _role: Role, _session: SessionId) {}

    fn payload_received(&mut self, _session: SessionId, _payload: ReceivedPayload) {}

    fn metrics(&mut self, _role: Role, _session: SessionId, _metrics: &MetricsSnapshot) {}

    fn session_completed(&mut self, _role: Role, _session: SessionId) {}

    fn session_failed(&mut self, _role: Role, _session: SessionId, _reason: &Error) {}
}

impl<S: SessionSink + ?Sized> SessionSink for &mut S {
    fn session_started(&mut self, role: Role, session: SessionId) {
        (**self).session_started(role, session)
    }

    fn payload_received(&mut self, session: SessionId, payload: ReceivedPayload) {
        (**self).payload_received(session, payload)
    }

    fn metrics(&mut self, role: Role, session: SessionId, metrics: &MetricsSnapshot) {
        (**self).metrics(role, session, metrics)
    }

    fn session_completed(&mut self, role: Role, session: SessionId) {
        (**self).session_completed(role, session)
    }

    fn session_failed(&mut self, role: Role, session: SessionId, reason: &Error) {
        (**self).session_failed(role, session, reason)
    }
}

/// 아무것도 하지 않는 출력
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SessionSink for NullSink {}

/// tracing 로그로 출력
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SessionSink for TracingSink {
    fn session_started(&mut self, role: Role, session: SessionId) {
        info!("[{:?}] 세션 {} 시작", role, session);
    }

    fn payload_received(&mut self, session: SessionId, payload: ReceivedPayload) {
        match payload.as_text() {
            Some(text) => info!("세션 {} 메시지 수신: {}", session, text),
            None => info!(
                "세션 {} 바이너리 수신: {} bytes ({})",
                session,
                payload.data.len(),
                payload.classification.extension().unwrap_or("-")
            ),
        }
    }

    fn metrics(&mut self, role: Role, session: SessionId, metrics: &MetricsSnapshot) {
        info!("[{:?}] 세션 {} 통계: {}", role, session, metrics.summary());
    }

    fn session_completed(&mut self, role: Role, session: SessionId) {
        info!("[{:?}] 세션 {} 완료", role, session);
    }

    fn session_failed(&mut self, role: Role, session: SessionId, reason: &Error) {
        warn!("[{:?}] 세션 {} 실패: {}", role, session, reason);
    }
}

/// 기록된 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started(Role, SessionId),
    Payload(SessionId, ReceivedPayload),
    Metrics(Role, SessionId, MetricsSnapshot),
    Completed(Role, SessionId),
    /// 실패 사유는 표시 문자열로 보관
    Failed(Role, SessionId, String),
}

/// 이벤트를 메모리에 쌓는 출력
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<SessionEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 받은 페이로드들
    pub fn payloads(&self) -> Vec<&ReceivedPayload> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Payload(_, payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// 기록된 스냅샷들
    pub fn metrics(&self) -> Vec<&MetricsSnapshot> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Metrics(_, _, metrics) => Some(metrics),
                _ => None,
            })
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Completed(..)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Failed(..)))
            .count()
    }
}

impl SessionSink for RecordingSink {
    fn session_started(&mut self, role: Role, session: SessionId) {
        self.events.push(SessionEvent::Started(role, session));
    }

    fn payload_received(&mut self, session: SessionId, payload: ReceivedPayload) {
        self.events.push(SessionEvent::Payload(session, payload));
    }

    fn metrics(&mut self, role: Role, session: SessionId, metrics: &MetricsSnapshot) {
        self.events
            .push(SessionEvent::Metrics(role, session, metrics.clone()));
    }

    fn session_completed(&mut self, role: Role, session: SessionId) {
        self.events.push(SessionEvent::Completed(role, session));
    }

    fn session_failed(&mut self, role: Role, session: SessionId, reason: &Error) {
        self.events
            .push(SessionEvent::Failed(role, session, reason.to_string()));
    }
}
