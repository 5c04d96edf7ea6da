//! HTTP 재시도 정책.

use std::time::Duration;

/// 제공자 요청 재시도 정책.
///
/// - 일시적 오류(타임아웃, 5xx): `base_delay`부터 두 배씩 증가, `max_attempts`회까지 시도
/// - 요청 한도 초과(429): `rate_limit_delay`부터 두 배씩 증가하되 `max_delay`에서 멈춤,
///   `max_rate_limit_retries`회까지 같은 구간을 재요청
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 일시적 오류에 대한 총 시도 횟수 (최초 요청 포함)
    pub max_attempts: u32,
    /// 첫 재시도 대기 시간
    pub base_delay: Duration,
    /// 백오프 상한
    pub max_delay: Duration,
    /// 429 응답 후 첫 대기 시간
    pub rate_limit_delay: Duration,
    /// 429 응답에 대한 최대 재요청 횟수
    pub max_rate_limit_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            rate_limit_delay: Duration::from_secs(5),
            max_rate_limit_retries: 20,
        }
    }
}

impl RetryPolicy {
    /// 대기 없이 즉시 재시도하는 정책 (테스트용).
    pub fn immediate(max_attempts: u32, max_rate_limit_retries: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            max_rate_limit_retries,
        }
    }

    /// `retry`번째(1부터) 일시적 오류 재시도 전 대기 시간.
    pub fn backoff(&self, retry: u32) -> Duration {
        exponential(self.base_delay, retry, self.max_delay)
    }

    /// `retry`번째(1부터) 429 재요청 전 대기 시간.
    pub fn rate_limit_backoff(&self, retry: u32) -> Duration {
        exponential(self.rate_limit_delay, retry, self.max_delay.max(self.rate_limit_delay))
    }
}

fn exponential(base: Duration, retry: u32, ceiling: Duration) -> Duration {
    let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(ceiling).min(ceiling)
}
