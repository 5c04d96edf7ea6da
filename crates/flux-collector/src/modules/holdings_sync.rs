//! ETF 보유종목 동기화.
//!
//! 코어 섹터 + 테마 ETF의 보유종목 스냅샷을 조회하여
//! `(date, etf_symbol, holding_symbol)` 키로 upsert합니다.
//! 응답에 같은 키가 반복되면 마지막 항목을 씁니다.

use chrono::NaiveDate;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Instant;

use flux_core::{market_today, HoldingRecord};
use flux_data::{FmpClient, UpsertWriter};

use crate::modules::price_collect::parse_symbols;
use crate::{CollectionStats, CollectorConfig, Result};

/// 보유종목 동기화 실행
pub async fn sync_holdings(
    pool: &PgPool,
    config: &CollectorConfig,
    symbols: Option<String>,
) -> Result<CollectionStats> {
    let start = Instant::now();
    let mut stats = CollectionStats::new();

    let client = FmpClient::new(config.fmp.client_config()?)?;
    let writer = UpsertWriter::with_policy(pool.clone(), config.writer.retry_policy());
    let today = market_today();

    let etfs = match symbols.as_deref() {
        Some(s) => parse_symbols(s),
        None => config.universe.holdings_targets(),
    };

    tracing::info!(etfs = etfs.len(), "보유종목 동기화 시작");

    for etf in &etfs {
        stats.total += 1;

        let result = async {
            let holdings = dedup_holdings(client.fetch_etf_holdings(etf, today).await?);
            if holdings.is_empty() {
                return Ok::<_, flux_data::DataError>((0, 0));
            }
            let written = writer.upsert(&holdings).await?;
            Ok((holdings.len(), written))
        }
        .await;

        match result {
            Ok((0, _)) => {
                stats.empty += 1;
                tracing::warn!(symbol = %etf, "보유종목 없음");
            }
            Ok((count, written)) => {
                stats.success += 1;
                stats.total_rows += written as usize;
                tracing::info!(symbol = %etf, count, "보유종목 저장 완료");
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(symbol = %etf, error = %e, "보유종목 동기화 실패");
            }
        }

        tokio::time::sleep(config.fmp.request_delay()).await;
    }

    stats.elapsed = start.elapsed();
    Ok(stats)
}

/// 키별로 마지막 항목만 남깁니다. 처음 등장한 순서는 유지합니다.
pub fn dedup_holdings(holdings: Vec<HoldingRecord>) -> Vec<HoldingRecord> {
    let mut index: HashMap<(NaiveDate, String, String), usize> = HashMap::new();
    let mut unique: Vec<HoldingRecord> = Vec::with_capacity(holdings.len());

    for holding in holdings {
        let key = (
            holding.date,
            holding.etf_symbol.clone(),
            holding.holding_symbol.clone(),
        );
        match index.get(&key) {
            Some(&i) => unique[i] = holding,
            None => {
                index.insert(key, unique.len());
                unique.push(holding);
            }
        }
    }
    unique
}
