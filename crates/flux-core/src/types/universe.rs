//! 추적 대상 유니버스 분류.
//!
//! 각 티커는 최대 하나의 분류에만 속합니다:
//! - `CoreSector` - 코어 섹터 ETF (XLK, XLF, ...)
//! - `Thematic` - 테마 ETF (SMH, ITA, ...)
//! - `Hedge` - 헤지/현금성 자산 (BIL, SHV)
//! - `Benchmark` - RS 분모가 되는 기준 자산 (SPY)
//! - `Macro` - 매크로 프록시 (GLD, USO, UUP)

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// 유니버스 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    CoreSector,
    Thematic,
    Hedge,
    Benchmark,
    Macro,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::CoreSector => write!(f, "core_sector"),
            AssetClass::Thematic => write!(f, "thematic"),
            AssetClass::Hedge => write!(f, "hedge"),
            AssetClass::Benchmark => write!(f, "benchmark"),
            AssetClass::Macro => write!(f, "macro"),
        }
    }
}

/// 추적 대상 유니버스.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    core_sectors: Vec<String>,
    thematics: Vec<String>,
    hedge: Vec<String>,
    benchmark: String,
    macro_tickers: Vec<String>,
}

impl Universe {
    /// 유니버스를 생성합니다.
    ///
    /// 티커는 대문자로 정규화되며, 같은 티커가 두 분류에 나타나면 설정 에러입니다.
    pub fn new(
        core_sectors: Vec<String>,
        thematics: Vec<String>,
        hedge: Vec<String>,
        benchmark: impl Into<String>,
        macro_tickers: Vec<String>,
    ) -> CoreResult<Self> {
        let universe = Self {
            core_sectors: normalize(core_sectors),
            thematics: normalize(thematics),
            hedge: normalize(hedge),
            benchmark: benchmark.into().trim().to_uppercase(),
            macro_tickers: normalize(macro_tickers),
        };

        if universe.benchmark.is_empty() {
            return Err(CoreError::Config("벤치마크 티커가 비어 있습니다".to_string()));
        }

        let mut seen = HashSet::new();
        for (ticker, class) in universe.members() {
            if !seen.insert(ticker) {
                return Err(CoreError::Config(format!(
                    "티커 {}가 여러 분류에 중복 등록되었습니다 (마지막: {})",
                    ticker, class
                )));
            }
        }

        Ok(universe)
    }

    pub fn core_sectors(&self) -> &[String] {
        &self.core_sectors
    }

    pub fn thematics(&self) -> &[String] {
        &self.thematics
    }

    pub fn hedge(&self) -> &[String] {
        &self.hedge
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn macro_tickers(&self) -> &[String] {
        &self.macro_tickers
    }

    /// 티커의 분류를 반환합니다.
    pub fn classify(&self, ticker: &str) -> Option<AssetClass> {
        let ticker = ticker.trim().to_uppercase();
        self.members()
            .find(|(t, _)| **t == ticker)
            .map(|(_, class)| class)
    }

    /// 적재 대상 전체 티커 (분류 순서, 중복 없음).
    pub fn all_tickers(&self) -> Vec<String> {
        self.members().map(|(t, _)| t.clone()).collect()
    }

    /// ETF 보유종목 수집 대상 (코어 섹터 + 테마).
    pub fn holdings_targets(&self) -> Vec<String> {
        self.core_sectors
            .iter()
            .chain(self.thematics.iter())
            .cloned()
            .collect()
    }

    fn members(&self) -> impl Iterator<Item = (&String, AssetClass)> {
        self.core_sectors
            .iter()
            .map(|t| (t, AssetClass::CoreSector))
            .chain(self.thematics.iter().map(|t| (t, AssetClass::Thematic)))
            .chain(self.hedge.iter().map(|t| (t, AssetClass::Hedge)))
            .chain(std::iter::once((&self.benchmark, AssetClass::Benchmark)))
            .chain(self.macro_tickers.iter().map(|t| (t, AssetClass::Macro)))
    }
}

fn normalize(tickers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .into_iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
