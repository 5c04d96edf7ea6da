//! RS 피처 동기화.
//!
//! 저장된 종가로 RS 비율, RS 로그수익률, 20일 Z-score를 다시 계산하여
//! `fact_daily_price`의 피처 컬럼을 갱신합니다.
//!
//! - 전체 모드: 모든 행 재계산
//! - 증분 모드: 최근 `incremental_days`일만 갱신. Z-score 윈도우를 채우기 위해
//!   그보다 앞선 구간을 함께 읽지만 갱신하지는 않습니다.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Instant;

use flux_analytics::RsFeatureCalculator;
use flux_core::market_today;
use flux_data::{ClosePoint, FeatureUpdate, PriceRepository};

use crate::modules::price_collect::parse_symbols;
use crate::{CollectionStats, CollectorConfig, Result};

/// 증분 갱신 시 앞쪽으로 더 읽는 일수 (Z-score 윈도우 확보).
pub const WARMUP_DAYS: i64 = 60;

/// 피처 갱신 범위.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMode {
    Incremental,
    Full,
}

/// 피처 동기화 실행
pub async fn sync_features(
    pool: &PgPool,
    config: &CollectorConfig,
    mode: FeatureMode,
    symbols: Option<String>,
) -> Result<CollectionStats> {
    let start = Instant::now();
    let mut stats = CollectionStats::new();

    let repo = PriceRepository::new(pool.clone());
    let calculator = RsFeatureCalculator::new();

    let (update_from, load_from) = match mode {
        FeatureMode::Full => (None, None),
        FeatureMode::Incremental => {
            let from = market_today() - Duration::days(config.features.incremental_days as i64);
            (Some(from), Some(from - Duration::days(WARMUP_DAYS)))
        }
    };

    let benchmark_symbol = config.features.benchmark.as_str();
    let benchmark = benchmark_closes(&repo.load_close_series(benchmark_symbol, load_from).await?);

    let targets = match symbols.as_deref() {
        Some(s) => parse_symbols(s),
        None => repo.list_symbols().await?,
    };

    if benchmark.is_empty() {
        tracing::warn!(benchmark = benchmark_symbol, "벤치마크 종가가 없어 피처 계산을 건너뜁니다");
        stats.total = targets.len();
        stats.skipped = targets.len();
        stats.elapsed = start.elapsed();
        return Ok(stats);
    }

    tracing::info!(
        mode = ?mode,
        symbols = targets.len(),
        benchmark = benchmark_symbol,
        update_from = ?update_from,
        "피처 계산 시작"
    );

    for symbol in &targets {
        stats.total += 1;

        let series = match repo.load_close_series(symbol, load_from).await {
            Ok(series) => series,
            Err(e) => {
                stats.errors += 1;
                tracing::error!(symbol = %symbol, error = %e, "종가 조회 실패");
                continue;
            }
        };

        let updates = compute_updates(&calculator, &series, &benchmark, update_from);
        if updates.is_empty() {
            stats.empty += 1;
            continue;
        }

        match repo.update_features(symbol, &updates).await {
            Ok(updated) => {
                stats.success += 1;
                stats.total_rows += updated as usize;
                tracing::debug!(symbol = %symbol, updated, "피처 갱신");
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(symbol = %symbol, error = %e, "피처 갱신 실패");
            }
        }
    }

    stats.elapsed = start.elapsed();
    Ok(stats)
}

/// 벤치마크 시계열을 날짜별 종가 맵으로 변환 (종가 NULL 제외)
pub fn benchmark_closes(series: &[ClosePoint]) -> HashMap<NaiveDate, Decimal> {
    series
        .iter()
        .filter_map(|p| p.close.map(|c| (p.date, c)))
        .collect()
}

/// 피처를 계산하고 `update_from` 이전 행은 버립니다.
pub fn compute_updates(
    calculator: &RsFeatureCalculator,
    series: &[ClosePoint],
    benchmark: &HashMap<NaiveDate, Decimal>,
    update_from: Option<NaiveDate>,
) -> Vec<FeatureUpdate> {
    let mut updates = calculator.calculate(series, benchmark);
    if let Some(from) = update_from {
        updates.retain(|u| u.date >= from);
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap() + Duration::days(i)
    }

    fn points(closes: &[Option<Decimal>]) -> Vec<ClosePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| ClosePoint {
                date: day(i as i64),
                close: *close,
            })
            .collect()
    }

    #[test]
    fn test_benchmark_closes_skips_null() {
        let map = benchmark_closes(&points(&[Some(dec!(400)), None, Some(dec!(402))]));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&day(2)), Some(&dec!(402)));
        assert!(!map.contains_key(&day(1)));
    }

    #[test]
    fn test_incremental_keeps_warmup_context() {
        let closes: Vec<Option<Decimal>> = [10, 12, 11, 13, 12, 14, 15]
            .iter()
            .map(|c| Some(Decimal::from(*c)))
            .collect();
        let series = points(&closes);
        let bench = benchmark_closes(&points(&vec![Some(dec!(1)); 7]));
        let calc = RsFeatureCalculator::new();

        let full = compute_updates(&calc, &series, &bench, None);
        let recent = compute_updates(&calc, &series, &bench, Some(day(5)));

        assert_eq!(full.len(), 7);
        assert_eq!(recent.len(), 2);
        // 앞선 행을 읽었으므로 증분 결과가 전체 계산과 같다
        assert_eq!(recent[0], full[5]);
        assert_eq!(recent[1], full[6]);
        assert!(recent[0].log_return_rs.is_some());
        assert!(recent[0].zscore_20d.is_some());
    }
}
