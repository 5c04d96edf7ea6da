//! 팩트 테이블 저장소.
//!
//! - `table` - 허용된 테이블 식별자
//! - `upsert` - 스테이징 + 병합 작성기
//! - `price` - 일별 가격 팩트 (적재, 피처 갱신, 스냅샷 조회)
//! - `holdings` - ETF 보유종목 팩트

pub mod holdings;
pub mod price;
pub mod table;
pub mod upsert;

use sqlx::PgPool;
use tracing::info;

use crate::error::{DataError, Result};

/// 스키마 마이그레이션을 실행합니다.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("데이터베이스 마이그레이션 실행 중...");

    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| DataError::MigrationError(e.to_string()))?;

    info!("마이그레이션 완료");
    Ok(())
}
