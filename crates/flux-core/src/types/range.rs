//! 날짜 구간 타입.

use chrono::{NaiveDate, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 양 끝을 포함하는 달력 날짜 구간 `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// 새 구간을 생성합니다. `start > end`이면 두 값을 바꿉니다.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// 구간에 포함된 달력 일수 (양 끝 포함).
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// 날짜가 구간에 포함되는지 확인합니다.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.start, self.end)
    }
}

/// 미국 동부(거래소) 기준 오늘 날짜.
///
/// 데이터 제공자의 일봉은 뉴욕 거래일 기준이므로 구간 계획의 기준일로 사용합니다.
pub fn market_today() -> NaiveDate {
    Utc::now().with_timezone(&New_York).date_naive()
}
