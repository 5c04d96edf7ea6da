//! 분석 모듈 오류 타입.

use thiserror::Error;

/// 분석 계산 오류.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// 잘못된 입력
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 십진수 연산 범위 초과
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
