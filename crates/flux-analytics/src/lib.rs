//! 상대강도 피처와 자금흐름 행렬 계산.
//!
//! DB 의존 없이 메모리에서 계산합니다. 입력은 `flux-data` 저장소가 읽어온 행이고,
//! 결과는 다시 저장소(피처)나 보고서(자금흐름)로 넘어갑니다.
//!
//! - [`features`]: RS 비율, RS 로그수익률, 20일 Z-score
//! - [`flux`]: 두 기준일 사이의 보존형 자금흐름 행렬

pub mod error;
pub mod features;
pub mod flux;

pub use error::{AnalyticsError, Result};
pub use features::{RsFeatureCalculator, DEFAULT_ZSCORE_WINDOW};
pub use flux::{FluxCalculator, FluxMatrix, FluxNode, HEDGE_NODE};
