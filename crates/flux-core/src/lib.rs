//! # Flux Core
//!
//! 섹터 자금흐름 파이프라인의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 일별 가격/시가총액 레코드 및 ETF 보유종목 레코드
//! - 추적 대상 유니버스 분류 (코어 섹터, 테마, 헤지, 벤치마크, 매크로)
//! - 날짜 구간 타입
//! - 로깅 인프라

pub mod error;
pub mod logging;
pub mod types;

pub use error::*;
pub use logging::*;
pub use types::*;
