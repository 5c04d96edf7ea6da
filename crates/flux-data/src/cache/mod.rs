//! 로컬 캐시.
//!
//! - Snapshot 캐시: 장기 이력 조회 결과를 티커별 gzip 파일로 보관

pub mod snapshot;

pub use snapshot::SnapshotCache;
