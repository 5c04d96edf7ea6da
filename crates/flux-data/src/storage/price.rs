//! `fact_daily_price` 저장소.
//!
//! 적재는 `UpsertWriter`를 거치고, 이 모듈은 스테이징 적재와
//! 피처 엔진/자금흐름 계산용 조회 및 피처 컬럼 갱신을 담당합니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::FromRow;
use tracing::{debug, instrument};

use flux_core::PriceRecord;

use super::table::FactTable;
use super::upsert::StagedRecord;
use crate::error::Result;

/// 한 번의 UNNEST 바인딩에 넣는 최대 행 수.
const BIND_BATCH: usize = 1000;

#[async_trait]
impl StagedRecord for PriceRecord {
    const TABLE: FactTable = FactTable::DailyPrice;

    async fn copy_into_staging(conn: &mut PgConnection, rows: &[Self]) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {} ({}) \
             SELECT * FROM UNNEST(\
                $1::date[], $2::text[], \
                $3::numeric[], $4::numeric[], $5::numeric[], $6::numeric[], \
                $7::int8[], $8::numeric[], $9::numeric[])",
            Self::TABLE.staging_name(),
            Self::TABLE.staged_columns().join(", "),
        );

        let mut staged = 0u64;
        for chunk in rows.chunks(BIND_BATCH) {
            let dates: Vec<NaiveDate> = chunk.iter().map(|r| r.date).collect();
            let symbols: Vec<&str> = chunk.iter().map(|r| r.symbol.as_str()).collect();
            let opens: Vec<Option<Decimal>> = chunk.iter().map(|r| r.open).collect();
            let highs: Vec<Option<Decimal>> = chunk.iter().map(|r| r.high).collect();
            let lows: Vec<Option<Decimal>> = chunk.iter().map(|r| r.low).collect();
            let closes: Vec<Option<Decimal>> = chunk.iter().map(|r| r.close).collect();
            let volumes: Vec<Option<i64>> = chunk.iter().map(|r| r.volume).collect();
            let caps: Vec<Option<Decimal>> = chunk.iter().map(|r| r.market_cap).collect();
            let shares: Vec<Option<Decimal>> = chunk.iter().map(|r| r.shares_outstanding).collect();

            let result = sqlx::query(&sql)
                .bind(&dates)
                .bind(&symbols)
                .bind(&opens)
                .bind(&highs)
                .bind(&lows)
                .bind(&closes)
                .bind(&volumes)
                .bind(&caps)
                .bind(&shares)
                .execute(&mut *conn)
                .await?;

            staged += result.rows_affected();
        }

        Ok(staged)
    }
}

/// 피처 계산 입력 (날짜, 종가).
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: Option<Decimal>,
}

/// 한 행의 파생 피처 값.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureUpdate {
    pub date: NaiveDate,
    pub rs_ratio: Option<f64>,
    pub log_return_rs: Option<f64>,
    pub zscore_20d: Option<f64>,
}

/// 자금흐름 계산용 스냅샷 행.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PriceSnapshotRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub close: Option<Decimal>,
    pub market_cap: Option<Decimal>,
}

/// `fact_daily_price` 조회/피처 갱신 저장소.
#[derive(Clone)]
pub struct PriceRepository {
    pool: PgPool,
}

impl PriceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 저장된 전체 심볼 목록.
    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        let symbols: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT symbol FROM fact_daily_price ORDER BY symbol")
                .fetch_all(&self.pool)
                .await?;
        Ok(symbols.into_iter().map(|(s,)| s).collect())
    }

    /// 심볼의 종가 시계열 (날짜 오름차순). `since`가 있으면 그 날짜부터.
    #[instrument(skip(self))]
    pub async fn load_close_series(
        &self,
        symbol: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<ClosePoint>> {
        let rows: Vec<ClosePoint> = sqlx::query_as(
            r#"
            SELECT date, close
            FROM fact_daily_price
            WHERE symbol = $1 AND ($2::date IS NULL OR date >= $2)
            ORDER BY date
            "#,
        )
        .bind(symbol)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        debug!(symbol, count = rows.len(), "종가 시계열 조회");
        Ok(rows)
    }

    /// 피처 컬럼 갱신. 다른 컬럼은 건드리지 않습니다.
    #[instrument(skip(self, updates), fields(rows = updates.len()))]
    pub async fn update_features(&self, symbol: &str, updates: &[FeatureUpdate]) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0u64;

        for chunk in updates.chunks(BIND_BATCH) {
            let dates: Vec<NaiveDate> = chunk.iter().map(|u| u.date).collect();
            let rs: Vec<Option<f64>> = chunk.iter().map(|u| u.rs_ratio).collect();
            let log_ret: Vec<Option<f64>> = chunk.iter().map(|u| u.log_return_rs).collect();
            let zscore: Vec<Option<f64>> = chunk.iter().map(|u| u.zscore_20d).collect();

            let result = sqlx::query(
                r#"
                UPDATE fact_daily_price AS f
                SET rs_ratio = u.rs_ratio,
                    log_return_rs = u.log_return_rs,
                    zscore_20d = u.zscore_20d
                FROM UNNEST($2::date[], $3::float8[], $4::float8[], $5::float8[])
                    AS u(date, rs_ratio, log_return_rs, zscore_20d)
                WHERE f.symbol = $1 AND f.date = u.date
                "#,
            )
            .bind(symbol)
            .bind(&dates)
            .bind(&rs)
            .bind(&log_ret)
            .bind(&zscore)
            .execute(&mut *tx)
            .await?;

            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// 두 기준일 × 심볼 목록에 해당하는 스냅샷 행.
    #[instrument(skip(self, symbols), fields(symbols = symbols.len()))]
    pub async fn load_snapshot_rows(
        &self,
        dates: &[NaiveDate],
        symbols: &[String],
    ) -> Result<Vec<PriceSnapshotRow>> {
        let rows: Vec<PriceSnapshotRow> = sqlx::query_as(
            r#"
            SELECT date, symbol, close, market_cap
            FROM fact_daily_price
            WHERE date = ANY($1) AND symbol = ANY($2)
            ORDER BY date, symbol
            "#,
        )
        .bind(dates)
        .bind(symbols)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
