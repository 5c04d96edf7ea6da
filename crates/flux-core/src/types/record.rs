//! 일별 가격 팩트, ETF 보유종목, 기업행동 레코드.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 데이터 제공자에서 받은 정규화된 일봉.
///
/// 스냅샷 캐시에 그대로 직렬화되므로 필드 추가 시 `#[serde(default)]`를 유지하세요.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    #[serde(default)]
    pub open: Option<Decimal>,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default)]
    pub close: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<i64>,
}

/// 일별 시가총액 포인트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapPoint {
    pub date: NaiveDate,
    pub market_cap: Decimal,
}

/// `fact_daily_price` 한 행 (파생 피처 컬럼 제외).
///
/// (date, symbol)이 키입니다. 피처 컬럼(RS, 로그수익률, Z-score)은
/// 피처 엔진만 갱신하므로 적재 배치에는 포함되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<i64>,
    pub market_cap: Option<Decimal>,
    pub shares_outstanding: Option<Decimal>,
}

impl PriceRecord {
    /// 일봉과 (선택적) 시가총액으로 팩트 행을 만듭니다.
    ///
    /// 발행주식수는 `market_cap / close`로 파생되며, 둘 중 하나가 없거나
    /// 종가가 0이면 `None`입니다.
    pub fn from_bar(symbol: &str, bar: PriceBar, market_cap: Option<Decimal>) -> Self {
        let shares_outstanding = implied_shares_outstanding(market_cap, bar.close);
        Self {
            date: bar.date,
            symbol: symbol.to_string(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            market_cap,
            shares_outstanding,
        }
    }
}

/// 시가총액과 종가로 암묵적 발행주식수를 계산합니다.
pub fn implied_shares_outstanding(
    market_cap: Option<Decimal>,
    close: Option<Decimal>,
) -> Option<Decimal> {
    match (market_cap, close) {
        (Some(cap), Some(close)) if !close.is_zero() => cap.checked_div(close),
        _ => None,
    }
}

/// `fact_etf_holdings` 한 행.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub date: NaiveDate,
    pub etf_symbol: String,
    pub holding_symbol: String,
    /// 편입 비중 (%)
    pub weight: Option<Decimal>,
    pub shares: Option<Decimal>,
}

/// 기업행동 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// 주식 분할/병합
    Split,
    /// 배당
    Dividend,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Split => write!(f, "split"),
            ActionKind::Dividend => write!(f, "dividend"),
        }
    }
}

/// 기업행동 캘린더에서 관측한 이벤트. 한 번의 실행 안에서만 쓰이고 저장하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporateAction {
    pub symbol: String,
    pub effective_date: Option<NaiveDate>,
    pub kind: ActionKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(close: Option<Decimal>) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            open: Some(dec!(99)),
            high: Some(dec!(101)),
            low: Some(dec!(98)),
            close,
            volume: Some(1_000),
        }
    }

    #[test]
    fn test_implied_shares() {
        assert_eq!(
            implied_shares_outstanding(Some(dec!(1000)), Some(dec!(100))),
            Some(dec!(10))
        );
        assert_eq!(implied_shares_outstanding(None, Some(dec!(100))), None);
        assert_eq!(implied_shares_outstanding(Some(dec!(1000)), None), None);
        assert_eq!(implied_shares_outstanding(Some(dec!(1000)), Some(Decimal::ZERO)), None);
    }

    #[test]
    fn test_record_from_bar() {
        let record = PriceRecord::from_bar("XLK", bar(Some(dec!(200))), Some(dec!(5000)));
        assert_eq!(record.symbol, "XLK");
        assert_eq!(record.shares_outstanding, Some(dec!(25)));

        let price_only = PriceRecord::from_bar("XLK", bar(Some(dec!(200))), None);
        assert_eq!(price_only.market_cap, None);
        assert_eq!(price_only.shares_outstanding, None);
    }

    #[test]
    fn test_price_bar_snapshot_defaults() {
        let bar: PriceBar = serde_json::from_str(r#"{"date":"2024-06-03","close":"12.5"}"#).unwrap();
        assert_eq!(bar.close, Some(dec!(12.5)));
        assert_eq!(bar.open, None);
        assert_eq!(bar.volume, None);
    }
}
