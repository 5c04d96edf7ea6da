//! 일별 가격/시가총액 수집 모듈.
//!
//! 티커 단위로 순차 처리합니다:
//! 1. 조회 기간 결정 (증분 / 기업행동 감지 시 전체 이력)
//! 2. 기간을 제공자 한도에 맞게 분할하여 청크별 조회 (장기 이력은 스냅샷 캐시 우선)
//! 3. 날짜 기준 중복 제거, 시가총액 결합, 발행주식수 파생
//! 4. upsert
//!
//! 한 티커의 실패(네트워크, 파싱, 저장)는 기록 후 건너뛰며 나머지 티커는 계속 진행합니다.
//! 청크 하나라도 실패하면 해당 티커는 저장하지 않습니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use tracing::Instrument;

use flux_core::{market_today, ticker_span, DateRange, MarketCapPoint, PriceBar, PriceRecord};
use flux_data::{
    detect_corporate_actions, plan_chunks, DataError, FmpClient, SnapshotCache, UpsertWriter,
};

use crate::config::IngestConfig;
use crate::{CollectionStats, CollectorConfig, Result};

/// 수집 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectMode {
    /// 최근 구간만 (기업행동 감지 티커는 전체 이력)
    Incremental,
    /// 모든 티커 전체 이력
    FullHistory,
}

/// 장기 이력 조회 시 스냅샷 캐시 사용 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotUse {
    /// 신선한 스냅샷이 있으면 재사용
    ReuseFresh,
    /// 스냅샷을 읽지 않고 다시 조회한 뒤 덮어씀 (기업행동 감지 티커)
    Refresh,
}

/// 한 티커의 정규화된 배치.
#[derive(Debug)]
pub struct TickerBatch {
    pub records: Vec<PriceRecord>,
    /// 일봉을 스냅샷 캐시에서 읽었는지 여부
    pub from_snapshot: bool,
    /// 시가총액 엔드포인트를 건너뛰었는지 여부 (권한 없음)
    pub market_cap_skipped: bool,
}

/// 가격 데이터 수집
pub async fn collect_prices(
    pool: &PgPool,
    config: &CollectorConfig,
    mode: CollectMode,
    symbols: Option<String>,
) -> Result<CollectionStats> {
    let start = Instant::now();
    let mut stats = CollectionStats::new();

    let client = FmpClient::new(config.fmp.client_config()?)?;
    let writer = UpsertWriter::with_policy(pool.clone(), config.writer.retry_policy());
    let cache = config.snapshot.cache();
    let today = market_today();

    let tickers = match symbols.as_deref() {
        Some(s) => parse_symbols(s),
        None => config.universe.all_tickers(),
    };

    if tickers.is_empty() {
        tracing::warn!("수집할 티커가 없습니다");
        stats.elapsed = start.elapsed();
        return Ok(stats);
    }

    let full_refresh: HashSet<String> = match mode {
        CollectMode::FullHistory => tickers.iter().cloned().collect(),
        CollectMode::Incremental => {
            detect_corporate_actions(
                &client,
                &tickers,
                today,
                config.ingest.corporate_action_lookback_days,
            )
            .await
        }
    };

    tracing::info!(
        mode = ?mode,
        tickers = tickers.len(),
        full_refresh = full_refresh.len(),
        today = %today,
        "가격 수집 시작"
    );

    for (idx, ticker) in tickers.iter().enumerate() {
        stats.total += 1;

        let is_full = full_refresh.contains(ticker);
        let lookback = plan_lookback(&config.ingest, is_full);
        if is_full {
            stats.full_refreshes += 1;
        }
        let snapshot_use = plan_snapshot_use(mode, is_full);

        let span = ticker_span!("ingest", ticker, lookback);
        let result = async {
            tracing::debug!(current = idx + 1, total = tickers.len(), "수집 시작");

            let batch = gather_ticker_batch(
                &client,
                &cache,
                ticker,
                lookback,
                today,
                &config.ingest,
                snapshot_use,
            )
            .await?;
            if batch.records.is_empty() {
                return Ok::<_, DataError>((batch, 0));
            }
            let written = writer.upsert(&batch.records).await?;
            Ok((batch, written))
        }
        .instrument(span)
        .await;

        match result {
            Ok((batch, _)) if batch.records.is_empty() => {
                stats.empty += 1;
                tracing::debug!(symbol = %ticker, "데이터 없음");
            }
            Ok((batch, written)) => {
                stats.success += 1;
                stats.total_rows += written as usize;
                tracing::info!(
                    symbol = %ticker,
                    rows = batch.records.len(),
                    written,
                    from_snapshot = batch.from_snapshot,
                    market_cap_skipped = batch.market_cap_skipped,
                    "수집 및 저장 완료"
                );
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(symbol = %ticker, lookback_days = lookback, error = %e, "수집 실패, 건너뜀");
            }
        }

        // Rate limiting
        tokio::time::sleep(config.fmp.request_delay()).await;
    }

    stats.elapsed = start.elapsed();
    Ok(stats)
}

/// 티커의 조회 기간 (일).
pub fn plan_lookback(config: &IngestConfig, full_refresh: bool) -> u32 {
    if full_refresh {
        config.full_history_days
    } else {
        config.incremental_days
    }
}

/// 증분 수집 중 기업행동으로 전체 이력에 들어간 티커는 스냅샷을 믿지 않습니다.
/// 스냅샷이 분할 이전에 기록되었을 수 있습니다.
pub fn plan_snapshot_use(mode: CollectMode, full_refresh: bool) -> SnapshotUse {
    if mode == CollectMode::Incremental && full_refresh {
        SnapshotUse::Refresh
    } else {
        SnapshotUse::ReuseFresh
    }
}

/// 쉼표로 구분된 티커 목록 파싱 (대문자, 중복 제거)
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// 한 티커의 일봉(+시가총액)을 모아 저장할 배치를 만듭니다.
pub async fn gather_ticker_batch(
    client: &FmpClient,
    cache: &SnapshotCache,
    ticker: &str,
    lookback_days: u32,
    today: NaiveDate,
    config: &IngestConfig,
    snapshot_use: SnapshotUse,
) -> flux_data::Result<TickerBatch> {
    let chunks = plan_chunks(lookback_days, today, config.max_chunk_days);
    let use_cache = cache.applies_to(lookback_days);

    let cached = if use_cache && snapshot_use == SnapshotUse::ReuseFresh {
        cache.load_fresh(ticker).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "스냅샷 읽기 실패, 재조회");
            None
        })
    } else {
        None
    };
    let from_snapshot = cached.is_some();

    let bars = match cached {
        Some(bars) => bars,
        None => {
            let bars = fetch_bars(client, ticker, &chunks).await?;
            if use_cache && !bars.is_empty() {
                if let Err(e) = cache.store(ticker, &bars) {
                    tracing::warn!(error = %e, "스냅샷 저장 실패");
                }
            }
            bars
        }
    };

    let (caps, market_cap_skipped) = if config.include_market_cap && !bars.is_empty() {
        match fetch_market_caps(client, ticker, &chunks).await {
            Ok(caps) => (caps, false),
            Err(e) if e.is_forbidden() => {
                tracing::warn!(error = %e, "시가총액 엔드포인트 권한 없음, 가격만 저장");
                (Vec::new(), true)
            }
            Err(e) => return Err(e),
        }
    } else {
        (Vec::new(), false)
    };

    Ok(TickerBatch {
        records: merge_price_batch(ticker, bars, caps),
        from_snapshot,
        market_cap_skipped,
    })
}

async fn fetch_bars(
    client: &FmpClient,
    ticker: &str,
    chunks: &[DateRange],
) -> flux_data::Result<Vec<PriceBar>> {
    let mut bars = Vec::new();
    for chunk in chunks {
        let part = client.fetch_price_range(ticker, *chunk).await?;
        tracing::debug!(range = %chunk, count = part.len(), "일봉 청크");
        bars.extend(part);
    }
    Ok(bars)
}

async fn fetch_market_caps(
    client: &FmpClient,
    ticker: &str,
    chunks: &[DateRange],
) -> flux_data::Result<Vec<MarketCapPoint>> {
    let mut caps = Vec::new();
    for chunk in chunks {
        caps.extend(client.fetch_market_cap_range(ticker, *chunk).await?);
    }
    Ok(caps)
}

/// 일봉과 시가총액을 날짜로 결합합니다.
///
/// - 같은 날짜의 일봉은 처음 것만 유지 (청크 경계 중복)
/// - 시가총액이 없는 날은 NULL
/// - 결과는 날짜 오름차순
pub fn merge_price_batch(
    symbol: &str,
    bars: Vec<PriceBar>,
    caps: Vec<MarketCapPoint>,
) -> Vec<PriceRecord> {
    let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
    for bar in bars {
        by_date.entry(bar.date).or_insert(bar);
    }

    let cap_by_date: HashMap<NaiveDate, Decimal> =
        caps.into_iter().map(|c| (c.date, c.market_cap)).collect();

    let symbol = symbol.to_uppercase();
    by_date
        .into_values()
        .map(|bar| {
            let cap = cap_by_date.get(&bar.date).copied();
            PriceRecord::from_bar(&symbol, bar, cap)
        })
        .collect()
}
