//! 기업행동(분할/배당) 감지.
//!
//! 최근 구간에 분할이나 배당이 기록된 티커는 과거 수정주가가 바뀌었을 수 있으므로
//! 전체 이력 재적재 경로로 보냅니다. 캘린더 조회 실패는 "감지 없음"으로 처리하며
//! 실행을 중단하지 않습니다. 다음 실행에서 다시 확인합니다.

use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use tracing::{info, warn};

use flux_core::{ActionKind, DateRange};

use super::fmp::FmpClient;

/// `[today - lookback_days, today]` 구간에 기업행동이 있는 유니버스 티커 집합.
pub async fn detect_corporate_actions(
    client: &FmpClient,
    universe: &[String],
    today: NaiveDate,
    lookback_days: u32,
) -> HashSet<String> {
    let range = DateRange::new(today - Duration::days(i64::from(lookback_days)), today);
    let tracked: HashSet<String> = universe.iter().map(|t| t.to_uppercase()).collect();
    let mut detected = HashSet::new();

    for kind in [ActionKind::Split, ActionKind::Dividend] {
        match client.fetch_corporate_actions(kind, range).await {
            Ok(actions) => {
                for action in actions {
                    if tracked.contains(&action.symbol) && detected.insert(action.symbol.clone()) {
                        info!(
                            symbol = %action.symbol,
                            kind = %action.kind,
                            effective_date = ?action.effective_date,
                            "기업행동 감지, 전체 이력 재적재 대상"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(kind = %kind, range = %range, error = %e, "기업행동 캘린더 조회 실패, 감지 없음으로 진행");
            }
        }
    }

    detected
}
