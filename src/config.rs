//! 프로토콜 설정

use std::path::PathBuf;
use std::time::Duration;

use crate::{DEFAULT_BASE_DIR, MAX_PAYLOAD_SIZE};

/// RFT 프로토콜 설정
///
/// 서버와 클라이언트가 같은 구조체를 공유하며 각자 필요한 필드만 사용함
#[derive(Debug, Clone)]
pub struct Config {
    /// 데이터 패킷당 최대 페이로드 크기 (바이트)
    pub max_payload_size: usize,

    /// 서버가 파일을 찾는 기준 디렉터리
    pub base_dir: PathBuf,

    /// 워커 풀 크기
    pub workers: usize,

    /// 수신 루프와 워커 사이 작업 큐 크기
    /// 큐가 가득 차면 수신 루프가 대기함
    pub dispatch_queue_capacity: usize,

    /// 최초 전송 시 패킷 간 간격 (마이크로초)
    /// 0이면 최대 속도로 전송
    pub send_interval_us: u64,

    /// 유휴 세션 만료 시간 (밀리초)
    pub session_ttl_ms: u64,

    /// 만료 세션 정리 주기 (밀리초)
    pub sweep_interval_ms: u64,

    /// 최초 전송 시 인위적 패킷 손실률 (0.0 ~ 1.0, 테스트용)
    pub simulated_loss_rate: f64,

    /// 클라이언트 기본 타임아웃 (밀리초)
    pub initial_timeout_ms: u64,

    /// 백오프 상한 (밀리초)
    pub max_timeout_ms: u64,

    /// 파일 요청 최대 시도 횟수
    pub max_request_attempts: u32,

    /// 재전송 요청 1개에 담는 최대 시퀀스 번호 수
    pub resend_batch_size: usize,

    /// 재전송 요청 배치 간 간격 (밀리초)
    pub resend_batch_interval_ms: u64,

    /// 부분 완료 허용 수신률 (이 값을 초과해야 허용)
    pub completion_threshold: f64,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            workers: 5,
            dispatch_queue_capacity: 1024,
            send_interval_us: 1000,           // 1ms
            session_ttl_ms: 60_000,           // 1분
            sweep_interval_ms: 5_000,         // 5초
            simulated_loss_rate: 0.0,
            initial_timeout_ms: 2_000,        // 2초
            max_timeout_ms: 8_000,            // 8초
            max_request_attempts: 5,
            resend_batch_size: 50,
            resend_batch_interval_ms: 50,
            completion_threshold: 0.98,       // 98%
            recv_buffer_size: 65535,
        }
    }
}

impl Config {
    /// 새 설정 생성
    /// 로컬 네트워크용 설정
    pub fn lan() -> Self {
        Self {
            send_interval_us: 200,
            initial_timeout_ms: 500,
            max_timeout_ms: 4_000,
            resend_batch_interval_ms: 10,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            send_interval_us: 2_000,
            session_ttl_ms: 180_000,
            initial_timeout_ms: 3_000,
            max_timeout_ms: 16_000,
            max_request_attempts: 8,
            resend_batch_size: 25,
            resend_batch_interval_ms: 100,
            ..Self::default()
        }
    }

    /// 기준 디렉터리 지정
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_micros(self.send_interval_us)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn resend_batch_interval(&self) -> Duration {
        Duration::from_millis(self.resend_batch_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_keep_wire_payload_size() {
        assert_eq!(Config::lan().max_payload_size, MAX_PAYLOAD_SIZE);
        assert_eq!(Config::unstable_network().max_payload_size, MAX_PAYLOAD_SIZE);
        assert!(Config::unstable_network().max_timeout() > Config::lan().max_timeout());
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let config = Config {
            sweep_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_millis(1));
    }
}
