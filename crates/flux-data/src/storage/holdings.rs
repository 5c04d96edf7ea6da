//! `fact_etf_holdings` 스테이징 적재.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgConnection;

use flux_core::HoldingRecord;

use super::table::FactTable;
use super::upsert::StagedRecord;
use crate::error::Result;

const BIND_BATCH: usize = 1000;

#[async_trait]
impl StagedRecord for HoldingRecord {
    const TABLE: FactTable = FactTable::EtfHoldings;

    async fn copy_into_staging(conn: &mut PgConnection, rows: &[Self]) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {} ({}) \
             SELECT * FROM UNNEST($1::date[], $2::text[], $3::text[], $4::numeric[], $5::numeric[])",
            Self::TABLE.staging_name(),
            Self::TABLE.staged_columns().join(", "),
        );

        let mut staged = 0u64;
        for chunk in rows.chunks(BIND_BATCH) {
            let dates: Vec<NaiveDate> = chunk.iter().map(|r| r.date).collect();
            let etfs: Vec<&str> = chunk.iter().map(|r| r.etf_symbol.as_str()).collect();
            let holdings: Vec<&str> = chunk.iter().map(|r| r.holding_symbol.as_str()).collect();
            let weights: Vec<Option<Decimal>> = chunk.iter().map(|r| r.weight).collect();
            let shares: Vec<Option<Decimal>> = chunk.iter().map(|r| r.shares).collect();

            staged += sqlx::query(&sql)
                .bind(&dates)
                .bind(&etfs)
                .bind(&holdings)
                .bind(&weights)
                .bind(&shares)
                .execute(&mut *conn)
                .await?
                .rows_affected();
        }

        Ok(staged)
    }
}
