//! 데이터 수집 및 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - 데이터 제공자(FMP) HTTP 클라이언트 (재시도, 응답 형태 정규화)
//! - 제공자 한도에 맞춘 조회 구간 분할
//! - 기업행동(분할/배당) 감지
//! - 장기 이력용 압축 스냅샷 캐시
//! - 스테이징 테이블 + 병합 방식의 멱등 upsert 저장소

pub mod cache;
pub mod error;
pub mod provider;
pub mod storage;

pub use error::{DataError, Result, RetryKind};

// 제공자 재내보내기
pub use provider::corporate_actions::detect_corporate_actions;
pub use provider::fmp::{Endpoint, FmpClient, FmpConfig};
pub use provider::range::{plan_chunks, MAX_CHUNK_DAYS};
pub use provider::retry::RetryPolicy;

// 캐시 재내보내기
pub use cache::snapshot::SnapshotCache;

// 저장소 재내보내기
pub use storage::price::{ClosePoint, FeatureUpdate, PriceRepository, PriceSnapshotRow};
pub use storage::run_migrations;
pub use storage::table::FactTable;
pub use storage::upsert::{StagedRecord, UpsertWriter, WriteRetryPolicy};
