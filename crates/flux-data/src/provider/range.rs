//! 조회 구간 분할.
//!
//! 제공자는 한 번의 요청에 최대 5년(1,825일) 구간만 허용합니다.
//! 긴 이력은 기준일에서 과거 방향으로 걸어가며 청크로 나눕니다.
//!
//! ```text
//! today-L          today-2C   today-C-1  today-C          today
//!   |<-- 청크 3 -->|<-- 청크 2 -------->|<-- 청크 1 ------->|
//! ```
//!
//! - k번째 청크의 시작 = `today - k·C` (마지막 청크는 `today - L`로 절단)
//! - 첫 청크의 끝 = `today`, 이후 청크의 끝 = 직전 청크 시작 - 1일
//!
//! 따라서 청크 수는 정확히 ⌈L/C⌉이고, 날짜 중복/누락이 없습니다.

use chrono::{Duration, NaiveDate};
use flux_core::DateRange;

/// 제공자가 허용하는 요청당 최대 구간 (일).
pub const MAX_CHUNK_DAYS: u32 = 1825;

/// `[today - lookback_days, today]`를 최신 구간부터 과거 순서로 분할합니다.
///
/// `lookback_days == 0`이면 `[today, today]` 하나를 반환합니다.
/// `max_chunk_days == 0`은 `MAX_CHUNK_DAYS`로 취급합니다.
pub fn plan_chunks(lookback_days: u32, today: NaiveDate, max_chunk_days: u32) -> Vec<DateRange> {
    let chunk = i64::from(if max_chunk_days == 0 {
        MAX_CHUNK_DAYS
    } else {
        max_chunk_days
    });
    let lookback = i64::from(lookback_days);
    let final_start = today - Duration::days(lookback);

    if lookback == 0 {
        return vec![DateRange::new(today, today)];
    }

    let count = (lookback + chunk - 1) / chunk;
    let mut chunks = Vec::with_capacity(count as usize);
    let mut end = today;

    for k in 1..=count {
        let start = (today - Duration::days(k * chunk)).max(final_start);
        chunks.push(DateRange { start, end });
        end = start - Duration::days(1);
    }

    chunks
}
