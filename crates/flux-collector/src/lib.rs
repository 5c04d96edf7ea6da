//! SectorFlux 데이터 수집기.
//!
//! 이 crate는 다음 작업을 실행하는 바이너리를 제공합니다:
//! - 일별 가격/시가총액 수집 (증분, 기업행동 감지 시 전체 이력 재적재)
//! - ETF 보유종목 수집
//! - RS 피처 재계산 (최근 구간 또는 전체)
//! - 자금흐름 행렬 보고

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use stats::CollectionStats;
