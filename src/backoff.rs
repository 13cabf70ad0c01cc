//! 타임아웃 백오프
//!
//! 수신 라운드가 실패할 때마다 타임아웃을 두 배로 늘리고 상한에서 멈춤.
//! RTT 추정은 하지 않음

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// 현재 타임아웃
    pub fn current(&self) -> Duration {
        self.current
    }

    /// 실패한 라운드 수
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// 다음 타임아웃으로 진행하고 그 값을 반환
    pub fn advance(&mut self) -> Duration {
        self.attempts += 1;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_cap() {
        let t = Duration::from_secs(1);
        let mut backoff = Backoff::new(t, Duration::from_secs(10));

        let mut seen = vec![backoff.current()];
        for _ in 0..4 {
            seen.push(backoff.advance());
        }

        assert_eq!(seen, vec![t, 2 * t, 4 * t, 8 * t, Duration::from_secs(10)]);
        assert_eq!(backoff.attempts(), 4);
        assert_eq!(backoff.advance(), Duration::from_secs(10));
    }

    #[test]
    fn test_default_client_timeouts() {
        let mut backoff = Backoff::new(Duration::from_millis(2000), Duration::from_millis(8000));
        assert_eq!(backoff.advance(), Duration::from_millis(4000));
        assert_eq!(backoff.advance(), Duration::from_millis(8000));
        assert_eq!(backoff.advance(), Duration::from_millis(8000));
    }

    #[test]
    fn test_initial_above_cap_is_clamped() {
        let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.current(), Duration::from_secs(1));
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.advance();
        backoff.advance();
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(100));
        assert_eq!(backoff.attempts(), 0);
    }
}
