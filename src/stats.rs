//! 전송 통계

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 클라이언트 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 새로 받은 데이터 패킷 수
    pub packets_received: u64,

    /// 중복 수신 패킷 수
    pub duplicate_packets: u64,

    /// 버린 패킷 수 (범위 밖, 다른 세션)
    pub dropped_packets: u64,

    /// 수신 바이트 (중복 제외)
    pub bytes_received: u64,

    /// 재전송 라운드 수
    pub resend_rounds: u32,

    /// 보낸 재전송 요청 데이터그램 수
    pub resend_requests: u64,

    /// 재전송 요청한 패킷 수 (누적)
    pub requested_packets: u64,

    /// 파일 요청 전송 횟수
    pub request_attempts: u32,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            packets_received: 0,
            duplicate_packets: 0,
            dropped_packets: 0,
            bytes_received: 0,
            resend_rounds: 0,
            resend_requests: 0,
            requested_packets: 0,
            request_attempts: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Packets: {} (+{} dup, {} dropped) | Bytes: {} | Throughput: {:.2} MB/s | Resend rounds: {} ({} packets requested)",
            self.elapsed().as_secs_f64(),
            self.packets_received,
            self.duplicate_packets,
            self.dropped_packets,
            self.bytes_received,
            self.throughput() / 1_000_000.0,
            self.resend_rounds,
            self.requested_packets,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 서버 통계 (워커 간 공유)
#[derive(Debug, Default)]
pub struct ServerStats {
    pub sessions_opened: AtomicU64,
    pub sessions_completed: AtomicU64,
    pub sessions_expired: AtomicU64,
    pub not_found: AtomicU64,
    pub packets_sent: AtomicU64,
    pub packets_resent: AtomicU64,
    /// 손실 시뮬레이션으로 버린 패킷
    pub packets_dropped: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Sessions: {} opened, {} completed, {} expired | Not found: {} | Packets: {} sent, {} resent, {} dropped",
            Self::get(&self.sessions_opened),
            Self::get(&self.sessions_completed),
            Self::get(&self.sessions_expired),
            Self::get(&self.not_found),
            Self::get(&self.packets_sent),
            Self::get(&self.packets_resent),
            Self::get(&self.packets_dropped),
        )
    }
}
