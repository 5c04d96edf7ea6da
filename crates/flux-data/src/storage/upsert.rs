//! 스테이징 테이블 기반 멱등 upsert.
//!
//! # 동작 방식
//!
//! 하나의 트랜잭션 안에서:
//! 1. `CREATE TEMP TABLE ... ON COMMIT DROP` 으로 스테이징 테이블 생성
//! 2. 배치를 `UNNEST` 배열 바인딩으로 스테이징에 적재
//! 3. `INSERT ... SELECT ... ON CONFLICT DO UPDATE` 로 영구 테이블에 병합
//! 4. 스테이징 삭제 후 커밋
//!
//! 실패하면 트랜잭션이 롤백되며 스테이징도 함께 사라집니다. 연결이 끊겨도 마찬가지입니다.
//! 직렬화 실패/교착 상태(`DataError::WriteConflict`)는 전체 시도를 처음부터 재실행합니다.

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::table::FactTable;
use crate::error::{Result, RetryKind};

/// 스테이징 테이블에 적재할 수 있는 레코드.
#[async_trait]
pub trait StagedRecord: Sized + Send + Sync {
    /// 대상 팩트 테이블.
    const TABLE: FactTable;

    /// 레코드를 `TABLE.staging_name()`에 적재하고 적재된 행 수를 반환합니다.
    ///
    /// `TABLE.staged_columns()`에 없는 컬럼은 쓰지 않습니다. 값이 없는 선택 컬럼은 NULL로 적재합니다.
    async fn copy_into_staging(conn: &mut PgConnection, rows: &[Self]) -> Result<u64>;
}

/// 쓰기 충돌 재시도 정책.
#[derive(Debug, Clone)]
pub struct WriteRetryPolicy {
    /// 총 시도 횟수 (최초 포함)
    pub max_attempts: u32,
    /// n번째 실패 후 `n × delay_step` 대기
    pub delay_step: Duration,
}

impl Default for WriteRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_step: Duration::from_secs(2),
        }
    }
}

impl WriteRetryPolicy {
    /// `attempt`번째(1부터) 실패 후 대기 시간.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_step.saturating_mul(attempt)
    }
}

/// 팩트 테이블 upsert 작성기.
#[derive(Clone)]
pub struct UpsertWriter {
    pool: PgPool,
    policy: WriteRetryPolicy,
}

impl UpsertWriter {
    pub fn new(pool: PgPool) -> Self {
        Self::with_policy(pool, WriteRetryPolicy::default())
    }

    pub fn with_policy(pool: PgPool, policy: WriteRetryPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 배치를 병합하고 영향받은 행 수를 반환합니다.
    ///
    /// 기존 키는 배치 값으로 덮어쓰고 새 키는 삽입합니다. 같은 배치를 두 번 적용해도
    /// 결과가 같습니다.
    #[instrument(skip(self, rows), fields(table = %R::TABLE, rows = rows.len()))]
    pub async fn upsert<R: StagedRecord>(&self, rows: &[R]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        retry_write(&self.policy, || self.try_upsert(rows)).await
    }

    /// 단일 시도. 에러가 나면 `tx`가 drop되며 롤백됩니다.
    async fn try_upsert<R: StagedRecord>(&self, rows: &[R]) -> Result<u64> {
        let table = R::TABLE;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&table.create_staging_sql())
            .execute(&mut *tx)
            .await?;

        let staged = R::copy_into_staging(&mut *tx, rows).await?;

        let merged = sqlx::query(&table.merge_sql())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(&table.drop_staging_sql())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(table = %table, staged, merged, "upsert 완료");
        Ok(merged)
    }
}

/// 쓰기 충돌이면 `op` 전체를 처음부터 다시 실행합니다. 다른 에러는 즉시 반환합니다.
pub(crate) async fn retry_write<T, F, Fut>(policy: &WriteRetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e)
                if e.retry_kind() == Some(RetryKind::WriteConflict)
                    && attempt < policy.max_attempts =>
            {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "쓰기 충돌, 트랜잭션 재시도"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_delay(max_attempts: u32) -> WriteRetryPolicy {
        WriteRetryPolicy {
            max_attempts,
            delay_step: Duration::ZERO,
        }
    }

    #[test]
    fn test_write_retry_delay_grows_linearly() {
        let policy = WriteRetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_write_conflict_retries_whole_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_write(&no_delay(3), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(DataError::WriteConflict("deadlock detected".to_string()))
            } else {
                Ok(42u64)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_write_conflict_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<u64> = retry_write(&no_delay(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DataError::WriteConflict("could not serialize access".to_string()))
        })
        .await;

        assert!(matches!(result, Err(DataError::WriteConflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<u64> = retry_write(&no_delay(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DataError::QueryError("syntax error".to_string()))
        })
        .await;

        assert!(matches!(result, Err(DataError::QueryError(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
