//! 자금흐름(Flux) 행렬 계산기.
//!
//! 두 기준일의 종가/시가총액 스냅샷에서 자산 간 자금 이동을 추정합니다.
//!
//! # 계산 순서
//!
//! 1. 두 날짜 모두 시세가 있는 티커만 남김 (상장/상폐 자동 처리)
//! 2. 티커별 순유입: `cap_now - cap_past × (close_now / close_past)`
//!    가격 변동에 따른 시가총액 변화를 제거하고 자금 유출입만 남깁니다
//! 3. 헤지 유니버스는 하나의 `HEDGE` 노드로 합산
//! 4. 유출(순유입 < 0)과 유입(순유입 > 0)으로 분리
//! 5. 총유출 ≠ 총유입이면 차이를 `HEDGE`의 부족한 쪽에 더해 균형을 맞춤
//! 6. `matrix[s][t] = outflow[s] × inflow[t] / total_inflow` (비례 배분)
//!
//! 어느 기준일이든 유니버스 시세가 하나도 없으면 행렬 대신 `None`을 반환합니다.
//! 0 행렬은 "흐름 없음"이라는 실제 결과이므로 "데이터 없음"과 구분합니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! use flux_analytics::FluxCalculator;
//!
//! let rows = repo.load_snapshot_rows(&[past, now], &universe).await?;
//! match FluxCalculator::new().calculate(&targets, &hedge, past, now, &rows)? {
//!     Some(matrix) => println!("{}", serde_json::to_string_pretty(&matrix)?),
//!     None => println!("스냅샷 없음"),
//! }
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use flux_data::PriceSnapshotRow;

use crate::error::{AnalyticsError, Result};

/// 헤지 집계 노드 라벨.
pub const HEDGE_NODE: &str = "HEDGE";

/// 행렬의 노드.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FluxNode {
    /// 개별 추적 자산
    Asset(String),
    /// 헤지 유니버스 합산 노드
    Hedge,
}

impl fmt::Display for FluxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluxNode::Asset(symbol) => f.write_str(symbol),
            FluxNode::Hedge => f.write_str(HEDGE_NODE),
        }
    }
}

impl Serialize for FluxNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 자금흐름 행렬.
///
/// 행 합 = 노드 유출, 열 합 = 노드 유입, 총유출 = 총유입.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FluxMatrix {
    pub past_date: NaiveDate,
    pub now_date: NaiveDate,
    /// 노드 순서 (대상 자산은 입력 순서, `HEDGE`는 항상 마지막)
    pub nodes: Vec<FluxNode>,
    /// 보정 전 노드별 순유입 (양수 = 유입)
    pub net_flows: Vec<Decimal>,
    /// 보정 후 노드별 유출 크기
    pub outflows: Vec<Decimal>,
    /// 보정 후 노드별 유입 크기
    pub inflows: Vec<Decimal>,
    /// 보정 전 `총유출 - 총유입`. 양수면 `HEDGE` 유입에, 음수면 `HEDGE` 유출에 더해짐
    pub residual: Decimal,
    /// `matrix[source][target]`
    pub matrix: Vec<Vec<Decimal>>,
}

impl FluxMatrix {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 노드 인덱스.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.to_string() == label)
    }

    /// `source → target` 이동량.
    pub fn flow(&self, source: &str, target: &str) -> Option<Decimal> {
        Some(self.matrix[self.index_of(source)?][self.index_of(target)?])
    }

    /// 행렬 전체 이동량.
    pub fn total_flow(&self) -> Decimal {
        self.matrix.iter().flatten().copied().sum()
    }

    pub fn row_sum(&self, i: usize) -> Decimal {
        self.matrix[i].iter().copied().sum()
    }

    pub fn column_sum(&self, j: usize) -> Decimal {
        self.matrix.iter().map(|row| row[j]).sum()
    }
}

/// 자금흐름 행렬 계산기.
#[derive(Debug, Default, Clone)]
pub struct FluxCalculator;

impl FluxCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 두 기준일 스냅샷에서 자금흐름 행렬을 계산합니다.
    ///
    /// # 인자
    ///
    /// * `targets` - 개별 노드로 남길 대상 유니버스 (순서 유지)
    /// * `hedge` - `HEDGE` 노드로 합산할 헤지 유니버스. 대상과 겹치면 헤지로 취급
    /// * `rows` - 두 기준일의 스냅샷 행 (다른 날짜/심볼은 무시)
    ///
    /// # 반환
    ///
    /// - `Ok(None)`: 어느 한 날짜에 유니버스 시세가 하나도 없음
    /// - `Err`: 날짜가 같거나 역순, 또는 십진수 연산 범위 초과
    pub fn calculate(
        &self,
        targets: &[String],
        hedge: &[String],
        past_date: NaiveDate,
        now_date: NaiveDate,
        rows: &[PriceSnapshotRow],
    ) -> Result<Option<FluxMatrix>> {
        if past_date >= now_date {
            return Err(AnalyticsError::InvalidInput(format!(
                "past({})는 now({})보다 앞서야 합니다",
                past_date, now_date
            )));
        }

        let hedge_set: HashSet<String> = hedge.iter().map(|s| s.to_uppercase()).collect();
        let mut seen = HashSet::new();
        let target_list: Vec<String> = targets
            .iter()
            .map(|s| s.to_uppercase())
            .filter(|s| !hedge_set.contains(s))
            .filter(|s| seen.insert(s.clone()))
            .collect();

        let in_universe = |symbol: &str| hedge_set.contains(symbol) || seen.contains(symbol);

        let mut past: HashMap<String, &PriceSnapshotRow> = HashMap::new();
        let mut now: HashMap<String, &PriceSnapshotRow> = HashMap::new();
        for row in rows {
            let symbol = row.symbol.to_uppercase();
            if !in_universe(&symbol) {
                continue;
            }
            if row.date == past_date {
                past.insert(symbol, row);
            } else if row.date == now_date {
                now.insert(symbol, row);
            }
        }

        if past.is_empty() || now.is_empty() {
            debug!(%past_date, %now_date, past = past.len(), now = now.len(), "스냅샷 없음");
            return Ok(None);
        }

        // 1~2. 생존 티커의 순유입
        let mut flows: HashMap<&str, Decimal> = HashMap::new();
        for (symbol, past_row) in &past {
            let Some(now_row) = now.get(symbol) else {
                continue;
            };
            match net_flow(past_row, now_row)? {
                Some(flow) => {
                    flows.insert(symbol.as_str(), flow);
                }
                None => debug!(symbol = %symbol, "종가/시가총액 누락으로 제외"),
            }
        }

        // 3. 노드 구성
        let mut nodes: Vec<FluxNode> = Vec::with_capacity(target_list.len() + 1);
        let mut net_flows: Vec<Decimal> = Vec::with_capacity(target_list.len() + 1);
        for symbol in &target_list {
            if let Some(flow) = flows.get(symbol.as_str()) {
                nodes.push(FluxNode::Asset(symbol.clone()));
                net_flows.push(*flow);
            }
        }
        let hedge_flow = hedge_set
            .iter()
            .filter_map(|s| flows.get(s.as_str()))
            .try_fold(Decimal::ZERO, |acc, f| acc.checked_add(*f))
            .ok_or_else(|| AnalyticsError::Overflow("HEDGE 합산".to_string()))?;
        nodes.push(FluxNode::Hedge);
        net_flows.push(hedge_flow);

        // 4~5. 유출/유입 분리 및 보존 보정
        let mut outflows: Vec<Decimal> = net_flows.iter().map(|f| (-*f).max(Decimal::ZERO)).collect();
        let mut inflows: Vec<Decimal> = net_flows.iter().map(|f| (*f).max(Decimal::ZERO)).collect();
        let total_out = checked_sum(&outflows)?;
        let total_in = checked_sum(&inflows)?;
        let residual = total_out - total_in;

        let hedge_idx = nodes.len() - 1;
        if residual > Decimal::ZERO {
            inflows[hedge_idx] += residual;
        } else if residual < Decimal::ZERO {
            outflows[hedge_idx] += -residual;
        }
        if !residual.is_zero() {
            debug!(%residual, "보존 보정을 HEDGE에 반영");
        }

        // 6. 비례 배분
        let matrix = allocate(&outflows, &inflows)?;

        Ok(Some(FluxMatrix {
            past_date,
            now_date,
            nodes,
            net_flows,
            outflows,
            inflows,
            residual,
            matrix,
        }))
    }
}

/// 가격 효과를 제거한 순유입. 필요한 값이 없거나 과거 종가가 0이면 `None`.
fn net_flow(past: &PriceSnapshotRow, now: &PriceSnapshotRow) -> Result<Option<Decimal>> {
    let (Some(close_past), Some(close_now), Some(cap_past), Some(cap_now)) =
        (past.close, now.close, past.market_cap, now.market_cap)
    else {
        return Ok(None);
    };
    if close_past.is_zero() {
        return Ok(None);
    }

    // cap_past × (1 + return) = cap_past × close_now / close_past
    let price_driven = cap_past
        .checked_mul(close_now)
        .and_then(|v| v.checked_div(close_past))
        .ok_or_else(|| AnalyticsError::Overflow(format!("{} 시가총액 계산", now.symbol)))?;

    match cap_now.checked_sub(price_driven) {
        Some(flow) => Ok(Some(flow)),
        None => {
            warn!(symbol = %now.symbol, "순유입 계산 범위 초과");
            Err(AnalyticsError::Overflow(now.symbol.clone()))
        }
    }
}

fn checked_sum(values: &[Decimal]) -> Result<Decimal> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| AnalyticsError::Overflow("합계".to_string()))
}

/// 유출을 유입 비중대로 배분합니다. 각 행의 마지막 유입 칸에 반올림 잔차를 넣어 행 합을 맞춥니다.
fn allocate(outflows: &[Decimal], inflows: &[Decimal]) -> Result<Vec<Vec<Decimal>>> {
    let n = outflows.len();
    let mut matrix = vec![vec![Decimal::ZERO; n]; n];

    let total_in = checked_sum(inflows)?;
    if total_in.is_zero() {
        return Ok(matrix);
    }

    let last_target = inflows.iter().rposition(|v| !v.is_zero());

    for (s, outflow) in outflows.iter().enumerate() {
        if outflow.is_zero() {
            continue;
        }
        let Some(last) = last_target else { continue };

        let mut allocated = Decimal::ZERO;
        for t in 0..n {
            if inflows[t].is_zero() || t == last {
                continue;
            }
            let cell = outflow
                .checked_mul(inflows[t])
                .and_then(|v| v.checked_div(total_in))
                .ok_or_else(|| AnalyticsError::Overflow("배분".to_string()))?;
            matrix[s][t] = cell;
            allocated += cell;
        }
        matrix[s][last] = (*outflow - allocated).max(Decimal::ZERO);
    }

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn past() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn now() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    fn row(date: NaiveDate, symbol: &str, close: Decimal, cap: Decimal) -> PriceSnapshotRow {
        PriceSnapshotRow {
            date,
            symbol: symbol.to_string(),
            close: Some(close),
            market_cap: Some(cap),
        }
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_asset_with_hedge_scenario() {
        let rows = vec![
            row(past(), "AAA", dec!(100), dec!(1000)),
            row(past(), "HEDGE-ONLY", dec!(50), dec!(500)),
            row(now(), "AAA", dec!(110), dec!(1200)),
            row(now(), "HEDGE-ONLY", dec!(49), dec!(480)),
        ];

        let m = FluxCalculator::new()
            .calculate(&list(&["AAA"]), &list(&["HEDGE-ONLY"]), past(), now(), &rows)
            .unwrap()
            .unwrap();

        assert_eq!(m.nodes, vec![FluxNode::Asset("AAA".into()), FluxNode::Hedge]);
        // 보정 전: AAA +100, HEDGE -10
        assert_eq!(m.net_flows, vec![dec!(100), dec!(-10)]);
        assert_eq!(m.residual, dec!(-90));
        // 유입 100을 맞추기 위해 HEDGE 유출이 100으로 보정됨
        assert_eq!(m.outflows, vec![dec!(0), dec!(100)]);
        assert_eq!(m.inflows, vec![dec!(100), dec!(0)]);
        assert_eq!(m.flow("HEDGE", "AAA"), Some(dec!(100)));
        assert_eq!(m.flow("AAA", "HEDGE"), Some(dec!(0)));
        assert_eq!(m.flow("AAA", "AAA"), Some(dec!(0)));
        assert_eq!(m.total_flow(), dec!(100));
    }

    #[test]
    fn test_proportional_allocation() {
        // A: -60, B: +20, C: +40 (가격 불변)
        let rows = vec![
            row(past(), "A", dec!(10), dec!(100)),
            row(past(), "B", dec!(10), dec!(100)),
            row(past(), "C", dec!(10), dec!(100)),
            row(now(), "A", dec!(10), dec!(40)),
            row(now(), "B", dec!(10), dec!(120)),
            row(now(), "C", dec!(10), dec!(140)),
        ];
        let m = FluxCalculator::new()
            .calculate(&list(&["A", "B", "C"]), &[], past(), now(), &rows)
            .unwrap()
            .unwrap();

        assert_eq!(m.residual, Decimal::ZERO);
        assert_eq!(m.flow("A", "B"), Some(dec!(20)));
        assert_eq!(m.flow("A", "C"), Some(dec!(40)));
        assert_eq!(m.outflows[m.index_of("HEDGE").unwrap()], Decimal::ZERO);
    }

    #[test]
    fn test_absence_when_a_date_has_no_rows() {
        let rows = vec![row(past(), "AAA", dec!(100), dec!(1000))];
        let result = FluxCalculator::new()
            .calculate(&list(&["AAA"]), &list(&["BIL"]), past(), now(), &rows)
            .unwrap();
        assert!(result.is_none());

        let result = FluxCalculator::new()
            .calculate(&list(&["AAA"]), &list(&["BIL"]), past(), now(), &[])
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_rows_outside_universe_do_not_count() {
        let rows = vec![
            row(past(), "AAA", dec!(100), dec!(1000)),
            row(now(), "ZZZ", dec!(1), dec!(1)),
        ];
        let result = FluxCalculator::new()
            .calculate(&list(&["AAA"]), &[], past(), now(), &rows)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_no_flow_is_zero_matrix_not_absence() {
        let rows = vec![
            row(past(), "AAA", dec!(100), dec!(1000)),
            row(now(), "AAA", dec!(110), dec!(1100)),
        ];
        let m = FluxCalculator::new()
            .calculate(&list(&["AAA"]), &list(&["BIL"]), past(), now(), &rows)
            .unwrap()
            .unwrap();
        assert_eq!(m.total_flow(), Decimal::ZERO);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_lifecycle_pruning_and_hedge_precedence() {
        let rows = vec![
            row(past(), "OLD", dec!(10), dec!(100)),
            row(past(), "AAA", dec!(10), dec!(100)),
            row(past(), "BIL", dec!(100), dec!(1000)),
            row(now(), "NEW", dec!(10), dec!(100)),
            row(now(), "AAA", dec!(10), dec!(150)),
            row(now(), "BIL", dec!(100), dec!(950)),
        ];
        // BIL은 대상에도 있지만 헤지로 취급
        let m = FluxCalculator::new()
            .calculate(
                &list(&["OLD", "AAA", "NEW", "BIL"]),
                &list(&["BIL"]),
                past(),
                now(),
                &rows,
            )
            .unwrap()
            .unwrap();

        assert_eq!(m.nodes, vec![FluxNode::Asset("AAA".into()), FluxNode::Hedge]);
        assert_eq!(m.net_flows, vec![dec!(50), dec!(-50)]);
        assert_eq!(m.flow("HEDGE", "AAA"), Some(dec!(50)));
    }

    #[test]
    fn test_hedge_absorbs_missing_inflow() {
        // 대상만 유출 → 총유입이 부족하므로 HEDGE 유입으로 보정
        let rows = vec![
            row(past(), "A", dec!(10), dec!(100)),
            row(now(), "A", dec!(10), dec!(70)),
        ];
        let m = FluxCalculator::new()
            .calculate(&list(&["A"]), &list(&["BIL"]), past(), now(), &rows)
            .unwrap()
            .unwrap();
        assert_eq!(m.residual, dec!(30));
        assert_eq!(m.flow("A", "HEDGE"), Some(dec!(30)));
    }

    #[test]
    fn test_missing_market_cap_excludes_ticker() {
        let mut no_cap = row(now(), "B", dec!(10), dec!(0));
        no_cap.market_cap = None;
        let rows = vec![
            row(past(), "A", dec!(10), dec!(100)),
            row(past(), "B", dec!(10), dec!(100)),
            row(now(), "A", dec!(10), dec!(120)),
            no_cap,
        ];
        let m = FluxCalculator::new()
            .calculate(&list(&["A", "B"]), &[], past(), now(), &rows)
            .unwrap()
            .unwrap();
        assert!(m.index_of("B").is_none());
    }

    #[test]
    fn test_dates_must_be_ordered() {
        let err = FluxCalculator::new().calculate(&[], &[], now(), past(), &[]);
        assert!(matches!(err, Err(AnalyticsError::InvalidInput(_))));
    }

    #[test]
    fn test_serializes_node_labels() {
        let rows = vec![
            row(past(), "AAA", dec!(100), dec!(1000)),
            row(now(), "AAA", dec!(100), dec!(1100)),
        ];
        let m = FluxCalculator::new()
            .calculate(&list(&["AAA"]), &[], past(), now(), &rows)
            .unwrap()
            .unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["nodes"], serde_json::json!(["AAA", "HEDGE"]));
    }

    proptest! {
        #[test]
        fn prop_flux_is_conserved(
            caps in proptest::collection::vec((1u32..10_000, 1u32..10_000, 1u32..500, 1u32..500), 1..8)
        ) {
            let mut rows = Vec::new();
            let mut targets = Vec::new();
            for (i, (cap_past, cap_now, close_past, close_now)) in caps.iter().enumerate() {
                let symbol = format!("T{}", i);
                rows.push(row(past(), &symbol, Decimal::from(*close_past), Decimal::from(*cap_past)));
                rows.push(row(now(), &symbol, Decimal::from(*close_now), Decimal::from(*cap_now)));
                targets.push(symbol);
            }

            let m = FluxCalculator::new()
                .calculate(&targets, &list(&["BIL"]), past(), now(), &rows)
                .unwrap()
                .unwrap();

            let tolerance = dec!(0.000000001);
            let total_out: Decimal = m.outflows.iter().copied().sum();
            let total_in: Decimal = m.inflows.iter().copied().sum();
            prop_assert!((total_out - total_in).abs() < tolerance);

            for i in 0..m.len() {
                prop_assert!((m.row_sum(i) - m.outflows[i]).abs() < tolerance);
                prop_assert!((m.column_sum(i) - m.inflows[i]).abs() < tolerance);
                for j in 0..m.len() {
                    prop_assert!(m.matrix[i][j] >= Decimal::ZERO);
                }
            }

            if !total_in.is_zero() {
                prop_assert!((m.total_flow() - total_in).abs() < tolerance);
            }
        }
    }
}
