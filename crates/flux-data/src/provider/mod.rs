//! 외부 데이터 제공자 연동.
//!
//! - `fmp` - FMP HTTP 클라이언트
//! - `range` - 요청 구간 분할
//! - `retry` - 재시도/백오프 정책
//! - `corporate_actions` - 분할/배당 감지

pub mod corporate_actions;
pub mod fmp;
pub mod range;
pub mod retry;
