//! 팩트 테이블 식별자.
//!
//! SQL에 들어가는 테이블/컬럼 식별자는 이 enum에서만 나옵니다.
//! 외부 입력(CLI 인자 등)은 `FromStr`을 거쳐야 하며, 목록에 없는 이름은 거부됩니다.

use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// 적재 대상 팩트 테이블.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactTable {
    /// 일별 가격/시가총액 (+ 파생 피처)
    DailyPrice,
    /// ETF 보유종목
    EtfHoldings,
}

impl FactTable {
    pub const ALL: [FactTable; 2] = [FactTable::DailyPrice, FactTable::EtfHoldings];

    /// 영구 테이블 이름.
    pub fn table_name(&self) -> &'static str {
        match self {
            FactTable::DailyPrice => "fact_daily_price",
            FactTable::EtfHoldings => "fact_etf_holdings",
        }
    }

    /// 트랜잭션 범위 임시 스테이징 테이블 이름.
    pub fn staging_name(&self) -> &'static str {
        match self {
            FactTable::DailyPrice => "stg_fact_daily_price",
            FactTable::EtfHoldings => "stg_fact_etf_holdings",
        }
    }

    /// 충돌 판정 키.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            FactTable::DailyPrice => &["date", "symbol"],
            FactTable::EtfHoldings => &["date", "etf_symbol", "holding_symbol"],
        }
    }

    /// 병합 시 덮어쓰는 값 컬럼.
    ///
    /// 가격 테이블의 파생 피처 컬럼은 포함하지 않습니다 (피처 엔진 전용).
    pub fn value_columns(&self) -> &'static [&'static str] {
        match self {
            FactTable::DailyPrice => &[
                "open",
                "high",
                "low",
                "close",
                "volume",
                "market_cap",
                "shares_outstanding",
            ],
            FactTable::EtfHoldings => &["weight", "shares"],
        }
    }

    /// 병합 시 현재 시각으로 갱신하는 컬럼.
    fn touch_column(&self) -> Option<&'static str> {
        match self {
            FactTable::DailyPrice => None,
            FactTable::EtfHoldings => Some("updated_at"),
        }
    }

    /// 스테이징에 적재하는 컬럼 (키 + 값).
    pub fn staged_columns(&self) -> Vec<&'static str> {
        self.key_columns()
            .iter()
            .chain(self.value_columns())
            .copied()
            .collect()
    }

    pub(crate) fn create_staging_sql(&self) -> String {
        let columns = self.staged_columns().join(", ");
        format!(
            "CREATE TEMP TABLE {stg} ON COMMIT DROP AS SELECT {columns} FROM {table} WITH NO DATA",
            stg = self.staging_name(),
            table = self.table_name(),
        )
    }

    /// 스테이징 → 영구 테이블 병합.
    ///
    /// 같은 키가 배치 안에 여러 번 있으면 하나만 남깁니다 (`DISTINCT ON`).
    pub(crate) fn merge_sql(&self) -> String {
        let keys = self.key_columns().join(", ");
        let staged = self.staged_columns().join(", ");

        let mut assignments: Vec<String> = self
            .value_columns()
            .iter()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();

        let (insert_columns, select_columns) = match self.touch_column() {
            Some(touch) => {
                assignments.push(format!("{touch} = NOW()"));
                (format!("{staged}, {touch}"), format!("{staged}, NOW()"))
            }
            None => (staged.clone(), staged),
        };

        format!(
            "INSERT INTO {table} ({insert_columns}) \
             SELECT DISTINCT ON ({keys}) {select_columns} FROM {stg} ORDER BY {keys} \
             ON CONFLICT ({keys}) DO UPDATE SET {assignments}",
            table = self.table_name(),
            stg = self.staging_name(),
            assignments = assignments.join(", "),
        )
    }

    pub(crate) fn drop_staging_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.staging_name())
    }
}

impl fmt::Display for FactTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for FactTable {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fact_daily_price" | "daily_price" | "price" => Ok(FactTable::DailyPrice),
            "fact_etf_holdings" | "etf_holdings" | "holdings" => Ok(FactTable::EtfHoldings),
            other => Err(DataError::InvalidData(format!("허용되지 않은 테이블: {}", other))),
        }
    }
}
