//! 송신자
//!
//! - 청크 하나씩 전송하고 ACK를 기다림 (stop-and-wait)
//! - NACK/타임아웃 시 같은 청크 재전송, 한도 초과 시 ABORT
//! - 비트 손상 시뮬레이션 (전송 바이트만 손상, CRC는 원본 기준)

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::checksum::checksum;
use crate::chunk::{Chunk, ChunkIndex, Payload};
use crate::content::is_known_extension;
use crate::frame::{encode_with_checksum, Control, ExtensionTag, Response};
use crate::sink::{Role, SessionId, SessionSink};
use crate::stats::{MetricsSnapshot, SessionStats};
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 송신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// 청크 n 전송 대기 (attempts = 지금까지 전송 횟수)
    SendingChunk { index: ChunkIndex, attempts: u32 },

    /// 청크 n의 응답 대기
    AwaitingAck {
        index: ChunkIndex,
        attempts: u32,
        sent_at: Instant,
    },

    /// 모든 청크 확인됨
    Completed,

    /// 재시도 한도 초과
    Aborted { index: ChunkIndex, attempts: u32 },
}

/// 상태 전이 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderEvent {
    /// 프레임을 보냄
    Sent { at: Instant },

    /// ACK 수신 (`has_next`: 다음 청크 존재 여부)
    Ack { has_next: bool },

    /// NACK 수신
    Nack,

    /// 응답 대기 시간 초과
    Timeout,
}

impl SenderState {
    /// 초기 상태 (청크가 없으면 바로 완료)
    pub fn start(has_chunks: bool) -> Self {
        if has_chunks {
            SenderState::SendingChunk {
                index: 0,
                attempts: 0,
            }
        } else {
            SenderState::Completed
        }
    }

    /// 상태 전이
    ///
    /// 현재 상태에서 의미 없는 이벤트는 상태를 바꾸지 않는다.
    pub fn transition(self, event: SenderEvent, max_retries: u32) -> Self {
        use SenderEvent::*;
        use SenderState::*;

        match (self, event) {
            (SendingChunk { index, attempts }, Sent { at }) => AwaitingAck {
                index,
                attempts: attempts + 1,
                sent_at: at,
            },
            (AwaitingAck { index, .. }, Ack { has_next: true }) => SendingChunk {
                index: index + 1,
                attempts: 0,
            },
            (AwaitingAck { .. }, Ack { has_next: false }) => Completed,
            (AwaitingAck { index, attempts, .. }, Nack | Timeout) => {
                if attempts < max_retries {
                    SendingChunk { index, attempts }
                } else {
                    Aborted { index, attempts }
                }
            }
            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SenderState::Completed | SenderState::Aborted { .. })
    }
}

/// 청크 하나의 전달 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// ACK 받음
    Acked { attempts: u32, rtt: Duration },

    /// 한도까지 시도했지만 실패
    RetriesExhausted { attempts: u32 },
}

/// 세션 결과
#[derive(Debug)]
pub enum SessionOutcome {
    Completed,
    Failed(Error),
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed)
    }
}

/// 세션 보고서
#[derive(Debug)]
pub struct SessionReport {
    pub session: SessionId,
    pub outcome: SessionOutcome,

    /// ACK 받은 청크 수
    pub chunks_acked: u64,

    /// 소스에서 읽은 바이트 수
    pub bytes_read: u64,

    pub metrics: MetricsSnapshot,
}

/// 송신자
pub struct Sender<T> {
    transport: T,
    config: Config,
    rng: StdRng,
    next_session: SessionId,
}

impl<T: Transport> Sender<T> {
    /// 새 송신자 생성
    pub fn new(transport: T, config: Config) -> Result<Self> {
        config.validate()?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            transport,
            config,
            rng,
            next_session: 0,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 다음 전송의 손상 확률 변경
    pub fn set_corruption_probability(&mut self, probability: f64) -> Result<()> {
        let previous = self.config.corruption_probability;
        self.config.corruption_probability = probability;
        if let Err(e) = self.config.validate() {
            self.config.corruption_probability = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// 텍스트 전송
    pub async fn send_text<S: SessionSink>(
        &mut self,
        text: &str,
        sink: &mut S,
    ) -> Result<SessionReport> {
        self.send_payload(&Payload::text(text), sink).await
    }

    /// 바이트 전송
    pub async fn send_bytes<S: SessionSink>(
        &mut self,
        data: impl Into<Bytes>,
        sink: &mut S,
    ) -> Result<SessionReport> {
        self.send_payload(&Payload::bytes(data), sink).await
    }

    /// 파일 전송
    pub async fn send_file<S: SessionSink>(
        &mut self,
        path: impl Into<std::path::PathBuf>,
        sink: &mut S,
    ) -> Result<SessionReport> {
        self.send_payload(&Payload::file(path), sink).await
    }

    /// 페이로드 하나 전송 (전송 세션 하나)
    ///
    /// 재시도 한도 초과는 `Ok` + `SessionOutcome::Failed`로, 연결 문제는 `Err`로 돌려준다.
    pub async fn send_payload<S: SessionSink>(
        &mut self,
        payload: &Payload,
        sink: &mut S,
    ) -> Result<SessionReport> {
        let session = self.next_session;
        self.next_session += 1;

        sink.session_started(Role::Sender, session);
        info!(
            "전송 시작: {} | 청크 크기: {} | 손상 확률: {}",
            payload.describe(),
            self.config.chunk_size,
            self.config.corruption_probability
        );

        match self.drive(session, payload).await {
            Ok(report) => {
                sink.metrics(Role::Sender, session, &report.metrics);
                match &report.outcome {
                    SessionOutcome::Completed => sink.session_completed(Role::Sender, session),
                    SessionOutcome::Failed(reason) => {
                        sink.session_failed(Role::Sender, session, reason)
                    }
                }
                Ok(report)
            }
            Err(e) => {
                warn!("세션 {} 전송 에러: {}", session, e);
                sink.session_failed(Role::Sender, session, &e);
                Err(e)
            }
        }
    }

    /// 연결 종료 신호 전송
    pub async fn end_session(&mut self) -> Result<()> {
        info!("세션 종료 신호 전송");
        self.transport.send(Control::EndSession.as_bytes()).await
    }

    async fn drive(&mut self, session: SessionId, payload: &Payload) -> Result<SessionReport> {
        let mut chunker = payload.open(self.config.chunk_size).await?;
        let mut stats = SessionStats::new();
        stats.start(Instant::now());

        let mut current = chunker.next_chunk().await?;
        if current.is_some() {
            self.send_preamble(payload).await?;
        }

        let mut state = SenderState::start(current.is_some());
        while let SenderState::SendingChunk { .. } = state {
            let Some(chunk) = current.take() else {
                break;
            };
            let upcoming = chunker.next_chunk().await?;

            match self
                .deliver_chunk(&mut state, &chunk, upcoming.is_some(), &mut stats)
                .await?
            {
                Delivery::Acked { attempts, rtt } => {
                    debug!(
                        "청크 {} ACK ({}회 시도, RTT {:.2}ms)",
                        chunk.index,
                        attempts,
                        rtt.as_secs_f64() * 1000.0
                    );
                    current = upcoming;
                }
                Delivery::RetriesExhausted { attempts } => {
                    warn!("청크 {}: {}회 시도 후 실패, 전송 중단", chunk.index, attempts);
                }
            }
        }

        stats.finish(Instant::now());

        let outcome = match state {
            SenderState::Completed => {
                self.transport
                    .send(Control::EndTransmission.as_bytes())
                    .await?;
                info!("전송 완료: {} 청크", stats.unique_acked);
                SessionOutcome::Completed
            }
            SenderState::Aborted { index, attempts } => {
                self.transport.send(Control::Abort.as_bytes()).await?;
                SessionOutcome::Failed(Error::RetryBudgetExhausted {
                    chunk: index,
                    attempts,
                })
            }
            // 청크 소스가 상태보다 먼저 끝난 경우
            SenderState::SendingChunk { index, .. } | SenderState::AwaitingAck { index, .. } => {
                self.transport.send(Control::Abort.as_bytes()).await?;
                SessionOutcome::Failed(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("청크 {} 읽기 실패", index),
                )))
            }
        };

        Ok(SessionReport {
            session,
            outcome,
            chunks_acked: stats.unique_acked,
            bytes_read: chunker.bytes_read(),
            metrics: stats.snapshot(),
        })
    }

    /// 알려진 형식의 파일이면 확장자 태그 전송
    async fn send_preamble(&mut self, payload: &Payload) -> Result<()> {
        if !self.config.send_extension_tag {
            return Ok(());
        }
        let Some(extension) = payload.extension() else {
            return Ok(());
        };
        if !is_known_extension(&extension) {
            return Ok(());
        }

        match ExtensionTag::new(&extension) {
            Ok(tag) => {
                debug!("확장자 태그 전송: {}", tag.extension());
                self.transport.send(&tag.to_wire()).await
            }
            Err(e) => {
                debug!("확장자 태그 생략: {}", e);
                Ok(())
            }
        }
    }

    /// 청크 하나를 ACK 받을 때까지 (또는 한도까지) 전송
    ///
    /// `state`는 이 청크의 `SendingChunk`에서 시작해서, 돌아올 때는 다음 청크의
    /// `SendingChunk`, `Completed`, `Aborted` 중 하나가 된다.
    pub async fn deliver_chunk(
        &mut self,
        state: &mut SenderState,
        chunk: &Chunk,
        has_next: bool,
        stats: &mut SessionStats,
    ) -> Result<Delivery> {
        let max_retries = self.config.max_retries;
        let crc = checksum(&chunk.data);

        loop {
            match *state {
                SenderState::SendingChunk { index, attempts } => {
                    let (wire, corrupted) = self.prepare_wire(&chunk.data, crc);
                    trace!("청크 {}: CRC sent: {:08X}", index, crc);
                    if corrupted {
                        debug!("청크 {}: 비트 에러 삽입", index);
                    }

                    self.transport.send(&wire).await?;
                    stats.record_attempt(chunk.len(), corrupted);
                    debug!("청크 {} 전송 (시도 {})", index, attempts + 1);

                    *state = state.transition(SenderEvent::Sent { at: Instant::now() }, max_retries);
                }
                SenderState::AwaitingAck {
                    index,
                    attempts,
                    sent_at,
                } => {
                    let event = match tokio::time::timeout(
                        self.config.ack_timeout(),
                        self.transport.recv(self.config.response_buffer_size),
                    )
                    .await
                    {
                        Ok(Ok(bytes)) => match Response::parse(&bytes) {
                            Response::Ack => {
                                let rtt = sent_at.elapsed();
                                stats.record_ack(chunk.len(), Some(rtt));
                                *state = state.transition(SenderEvent::Ack { has_next }, max_retries);
                                return Ok(Delivery::Acked { attempts, rtt });
                            }
                            Response::Nack(reason) => {
                                debug!("청크 {}: NACK 수신 ({:?}), 재전송", index, reason);
                                stats.record_nack();
                                SenderEvent::Nack
                            }
                        },
                        Ok(Err(e)) => return Err(e),
                        Err(_) => {
                            let timeout = Error::FrameTimeout {
                                chunk: index,
                                timeout_ms: self.config.ack_timeout_ms,
                            };
                            debug!("{}, 재전송", timeout);
                            stats.record_timeout();
                            SenderEvent::Timeout
                        }
                    };

                    *state = state.transition(event, max_retries);
                    if let SenderState::Aborted { attempts, .. } = *state {
                        return Ok(Delivery::RetriesExhausted { attempts });
                    }
                }
                SenderState::Completed | SenderState::Aborted { .. } => {
                    return Err(Error::InvalidConfig(format!(
                        "청크 {} 전달 시작 상태가 잘못됨: {:?}",
                        chunk.index, state
                    )));
                }
            }
        }
    }

    /// 와이어 바이트 생성 (확률에 따라 비트 하나 반전)
    fn prepare_wire(&mut self, data: &Bytes, crc: u32) -> (Bytes, bool) {
        let probability = self.config.corruption_probability;
        if probability <= 0.0 || data.is_empty() || !self.rng.gen_bool(probability) {
            return (encode_with_checksum(data, crc), false);
        }

        let mut corrupted = BytesMut::from(&data[..]);
        let byte = self.rng.gen_range(0..corrupted.len());
        let bit = self.rng.gen_range(0..8u8);
        corrupted[byte] ^= 1 << bit;
        (encode_with_checksum(&corrupted, crc), true)
    }
}
