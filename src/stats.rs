//! 전송 통계
//!
//! 세션 동안 카운터를 모으고, 세션이 끝나면 한 번 `MetricsSnapshot`을 계산한다.
//! 계산은 I/O 없는 순수 함수다.

use std::fmt;
use std::time::{Duration, Instant};

/// 손상된 전송 시도 하나당 집계하는 에러 비트 수 (시뮬레이션 기준)
pub const SIMULATED_ERROR_BITS: u64 = 8;

/// 경과 시간이 0일 때 대신 쓰는 최소 시간
pub const MIN_DURATION: Duration = Duration::from_secs(1);

/// 세션 카운터
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// 측정 시작 시각
    pub started_at: Option<Instant>,

    /// 측정 종료 시각
    pub finished_at: Option<Instant>,

    /// 확인된 바이트 (송신: ACK 받은 바이트, 수신: 수락한 바이트)
    pub acked_bytes: u64,

    /// 청크 전송(수신) 시도 수
    pub attempts: u64,

    /// 확인된 고유 청크 수
    pub unique_acked: u64,

    /// 청크별 RTT 샘플
    rtt_samples: Vec<Duration>,

    /// 전송(수신)된 총 비트
    pub total_bits: u64,

    /// 에러 비트
    pub error_bits: u64,

    /// NACK 수
    pub nacks: u64,

    /// 타임아웃 수
    pub timeouts: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 측정 시작 (이미 시작했으면 무시)
    pub fn start(&mut self, at: Instant) {
        self.started_at.get_or_insert(at);
    }

    pub fn finish(&mut self, at: Instant) {
        self.finished_at = Some(at);
    }

    /// 전송 시도 기록
    pub fn record_attempt(&mut self, chunk_len: usize, corrupted: bool) {
        self.attempts += 1;
        self.total_bits += chunk_len as u64 * 8;
        if corrupted {
            self.error_bits += SIMULATED_ERROR_BITS;
        }
    }

    /// 수신측 CRC 불일치 기록 (청크 전체를 에러 비트로 집계)
    pub fn record_corrupted_frame(&mut self, chunk_len: usize) {
        self.error_bits += chunk_len as u64 * 8;
        self.nacks += 1;
    }

    /// 청크 확인 기록
    pub fn record_ack(&mut self, chunk_len: usize, rtt: Option<Duration>) {
        self.unique_acked += 1;
        self.acked_bytes += chunk_len as u64;
        if let Some(rtt) = rtt {
            self.rtt_samples.push(rtt);
        }
    }

    pub fn record_nack(&mut self) {
        self.nacks += 1;
    }

    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    pub fn rtt_samples(&self) -> &[Duration] {
        &self.rtt_samples
    }

    /// 재전송 수 (시도 - 고유 확인)
    pub fn retries(&self) -> u64 {
        self.attempts.saturating_sub(self.unique_acked)
    }

    /// 스냅샷 계산
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::compute(self)
    }
}

/// 신호 대 잡음비
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Snr {
    /// 에러 비트 없음
    Infinite,

    /// dB 값
    Decibels(f64),
}

impl fmt::Display for Snr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snr::Infinite => write!(f, "Infinity"),
            Snr::Decibels(db) => write!(f, "{:.2}", db),
        }
    }
}

impl Snr {
    /// `10 * log10(correct / error)`, 에러 비트가 0이면 무한대
    pub fn from_bits(total_bits: u64, error_bits: u64) -> Self {
        if error_bits == 0 {
            return Snr::Infinite;
        }
        let correct_bits = total_bits.saturating_sub(error_bits);
        if correct_bits == 0 {
            return Snr::Decibels(0.0);
        }
        Snr::Decibels(10.0 * (correct_bits as f64 / error_bits as f64).log10())
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Snr::Infinite)
    }
}

/// 세션 품질 스냅샷 (읽기 전용)
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// 전송 시간
    pub duration: Duration,

    /// 처리율 (bytes/sec)
    pub throughput: f64,

    /// 무결성 비율 = 고유 확인 청크 / 전체 시도 (0.0 ~ 1.0)
    pub integrity_rate: f64,

    /// 평균 RTT (샘플 없으면 None)
    pub average_rtt: Option<Duration>,

    /// 신호 대 잡음비
    pub snr: Snr,

    pub acked_bytes: u64,
    pub attempts: u64,
    pub unique_acked: u64,
    pub total_bits: u64,
    pub error_bits: u64,
    pub nacks: u64,
    pub timeouts: u64,
}

impl MetricsSnapshot {
    /// 세션 카운터로부터 계산
    pub fn compute(stats: &SessionStats) -> Self {
        let elapsed = match (stats.started_at, stats.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        };
        let duration = if elapsed.is_zero() { MIN_DURATION } else { elapsed };

        let throughput = stats.acked_bytes as f64 / duration.as_secs_f64();

        let integrity_rate = if stats.attempts == 0 {
            0.0
        } else {
            (stats.unique_acked as f64 / stats.attempts as f64).min(1.0)
        };

        let samples = stats.rtt_samples();
        let average_rtt = if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<Duration>() / samples.len() as u32)
        };

        Self {
            duration,
            throughput,
            integrity_rate,
            average_rtt,
            snr: Snr::from_bits(stats.total_bits, stats.error_bits),
            acked_bytes: stats.acked_bytes,
            attempts: stats.attempts,
            unique_acked: stats.unique_acked,
            total_bits: stats.total_bits,
            error_bits: stats.error_bits,
            nacks: stats.nacks,
            timeouts: stats.timeouts,
        }
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Time: {:.4}s | Throughput: {:.2} B/s | Integrity: {:.4} | RTT: {} | SNR: {} dB | NACKs: {} | Timeouts: {}",
            self.duration.as_secs_f64(),
            self.throughput,
            self.integrity_rate,
            self.average_rtt
                .map(|rtt| format!("{:.4}s", rtt.as_secs_f64()))
                .unwrap_or_else(|| "-".into()),
            self.snr,
            self.nacks,
            self.timeouts,
        )
    }

    /// 메트릭 로그용 여러 줄
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Total transmission time: {:.4} seconds", self.duration.as_secs_f64()),
            format!("Throughput: {:.2} bytes/sec", self.throughput),
            format!("Data Integrity Rate: {:.4}", self.integrity_rate),
        ];
        if let Some(rtt) = self.average_rtt {
            lines.push(format!("Average RTT: {:.4} seconds", rtt.as_secs_f64()));
        }
        lines.push(format!(
            "SNR: {} dB (Total bits: {}, Error bits: {})",
            self.snr, self.total_bits, self.error_bits
        ));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_session() {
        let snapshot = SessionStats::new().snapshot();

        assert_eq!(snapshot.duration, MIN_DURATION);
        assert_eq!(snapshot.throughput, 0.0);
        assert_eq!(snapshot.integrity_rate, 0.0);
        assert_eq!(snapshot.average_rtt, None);
        assert!(snapshot.snr.is_infinite());
    }

    #[test]
    fn test_integrity_with_retries() {
        let mut stats = SessionStats::new();
        // 청크 3개, 재전송 2번
        for (len, attempts) in [(100usize, 1), (100, 2), (50, 2)] {
            for attempt in 0..attempts {
                stats.record_attempt(len, attempt + 1 < attempts);
                if attempt + 1 < attempts {
                    stats.record_nack();
                }
            }
            stats.record_ack(len, Some(Duration::from_millis(10)));
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempts, 5);
        assert_eq!(snapshot.unique_acked, 3);
        assert!((snapshot.integrity_rate - 3.0 / 5.0).abs() < 1e-12);
        assert_eq!(snapshot.acked_bytes, 250);
        assert_eq!(snapshot.nacks, 2);
        assert_eq!(stats.retries(), 2);
        assert_eq!(snapshot.error_bits, 2 * SIMULATED_ERROR_BITS);
        assert_eq!(snapshot.average_rtt, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_throughput_uses_elapsed() {
        let start = Instant::now();
        let mut stats = SessionStats::new();
        stats.start(start);
        stats.start(start + Duration::from_secs(5)); // 무시
        stats.finish(start + Duration::from_secs(2));
        stats.record_ack(1000, None);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.duration, Duration::from_secs(2));
        assert!((snapshot.throughput - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_snr() {
        assert_eq!(Snr::from_bits(1000, 0), Snr::Infinite);
        assert_eq!(Snr::from_bits(8, 8), Snr::Decibels(0.0));

        match Snr::from_bits(808, 8) {
            Snr::Decibels(db) => assert!((db - 20.0).abs() < 1e-9),
            Snr::Infinite => panic!("expected finite SNR"),
        }

        assert_eq!(Snr::Infinite.to_string(), "Infinity");
        assert_eq!(Snr::Decibels(20.0).to_string(), "20.00");
    }

    #[test]
    fn test_lines() {
        let mut stats = SessionStats::new();
        stats.record_attempt(4, false);
        stats.record_ack(4, Some(Duration::from_millis(2)));

        let lines = stats.snapshot().lines();
        assert_eq!(lines.len(), 5);
        assert!(lines[2].starts_with("Data Integrity Rate: 1.0000"));
        assert!(lines[4].starts_with("SNR: Infinity dB"));
    }
}
