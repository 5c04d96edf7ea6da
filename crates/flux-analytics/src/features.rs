//! 상대강도(RS) 피처 계산기.
//!
//! # 계산 공식
//!
//! - **RS 비율**: `close[t] / benchmark_close[t]`
//!   벤치마크 시세가 없거나 0이면 NULL
//! - **RS 로그수익률**: `ln(rs[t] / rs[t-1])` (심볼별 직전 행 기준)
//!   어느 한쪽이 NULL이거나 직전 RS가 0이면 NULL
//! - **Z-score (20일)**: `(r[t] - mean) / stdev`
//!   현재 행을 포함한 직전 20행의 NULL이 아닌 로그수익률로 계산하며,
//!   관측치가 2개 미만이거나 표준편차가 0이면 NULL
//!
//! 세 값 모두 매번 처음부터 다시 계산합니다. 분할 수정으로 과거 종가가 바뀌어도
//! 누적 오차가 생기지 않습니다.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

use flux_data::{ClosePoint, FeatureUpdate};

use crate::error::{AnalyticsError, Result};

/// 기본 Z-score 윈도우 (행 수).
pub const DEFAULT_ZSCORE_WINDOW: usize = 20;

/// 표준편차가 이 값보다 작으면 0으로 간주.
const STDEV_EPSILON: f64 = 1e-12;

/// RS 피처 계산기.
#[derive(Debug, Clone)]
pub struct RsFeatureCalculator {
    window: usize,
}

impl Default for RsFeatureCalculator {
    fn default() -> Self {
        Self {
            window: DEFAULT_ZSCORE_WINDOW,
        }
    }
}

impl RsFeatureCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Z-score 윈도우를 지정합니다. 2 미만은 의미가 없으므로 거부합니다.
    pub fn with_window(window: usize) -> Result<Self> {
        if window < 2 {
            return Err(AnalyticsError::InvalidInput(format!(
                "Z-score 윈도우는 2 이상이어야 합니다: {}",
                window
            )));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// 한 심볼의 시계열 전체에 대해 피처를 계산합니다.
    ///
    /// # 인자
    ///
    /// * `series` - 심볼의 (날짜, 종가) 목록
    /// * `benchmark` - 날짜별 벤치마크 종가
    ///
    /// # 반환
    ///
    /// 날짜 오름차순의 피처 행 (입력 행마다 하나)
    pub fn calculate(
        &self,
        series: &[ClosePoint],
        benchmark: &HashMap<NaiveDate, Decimal>,
    ) -> Vec<FeatureUpdate> {
        let mut points: Vec<&ClosePoint> = series.iter().collect();
        points.sort_by_key(|p| p.date);

        let rs: Vec<Option<f64>> = points
            .iter()
            .map(|p| rs_ratio(p.close, benchmark.get(&p.date).copied()))
            .collect();

        let log_returns: Vec<Option<f64>> = (0..rs.len())
            .map(|i| if i == 0 { None } else { log_return(rs[i - 1], rs[i]) })
            .collect();

        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let start = (i + 1).saturating_sub(self.window);
                FeatureUpdate {
                    date: p.date,
                    rs_ratio: rs[i],
                    log_return_rs: log_returns[i],
                    zscore_20d: log_returns[i]
                        .and_then(|current| zscore(current, &log_returns[start..=i])),
                }
            })
            .collect()
    }
}

/// 종가와 벤치마크 종가의 비율.
pub fn rs_ratio(close: Option<Decimal>, benchmark_close: Option<Decimal>) -> Option<f64> {
    let close = close?.to_f64()?;
    let bench = benchmark_close?.to_f64()?;
    if bench == 0.0 {
        return None;
    }
    finite(close / bench)
}

fn log_return(prev: Option<f64>, current: Option<f64>) -> Option<f64> {
    let prev = prev?;
    let current = current?;
    if prev == 0.0 {
        return None;
    }
    let ratio = current / prev;
    if ratio <= 0.0 {
        return None;
    }
    finite(ratio.ln())
}

/// 윈도우 내 NULL이 아닌 값으로 표본 표준편차 기반 Z-score 계산.
fn zscore(current: f64, window: &[Option<f64>]) -> Option<f64> {
    let values: Vec<f64> = window.iter().flatten().copied().collect();
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let stdev = variance.sqrt();
    if !stdev.is_finite() || stdev < STDEV_EPSILON {
        return None;
    }

    finite((current - mean) / stdev)
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i)
    }

    fn series(closes: &[Option<Decimal>]) -> Vec<ClosePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| ClosePoint {
                date: day(i as i64),
                close: *c,
            })
            .collect()
    }

    fn flat_benchmark(n: i64, price: Decimal) -> HashMap<NaiveDate, Decimal> {
        (0..n).map(|i| (day(i), price)).collect()
    }

    #[test]
    fn test_rs_ratio_edge_cases() {
        assert_eq!(rs_ratio(Some(dec!(50)), Some(dec!(100))), Some(0.5));
        assert_eq!(rs_ratio(Some(dec!(50)), Some(Decimal::ZERO)), None);
        assert_eq!(rs_ratio(Some(dec!(50)), None), None);
        assert_eq!(rs_ratio(None, Some(dec!(100))), None);
    }

    #[test]
    fn test_rs_and_log_return() {
        let rows = series(&[Some(dec!(100)), Some(dec!(110)), Some(dec!(121))]);
        let bench = flat_benchmark(3, dec!(200));

        let out = RsFeatureCalculator::new().calculate(&rows, &bench);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].rs_ratio, Some(0.5));
        assert_eq!(out[0].log_return_rs, None);

        let expected = (1.1f64).ln();
        assert!((out[1].log_return_rs.unwrap() - expected).abs() < 1e-12);
        assert!((out[2].log_return_rs.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_missing_benchmark_breaks_chain() {
        let rows = series(&[Some(dec!(100)), Some(dec!(101)), Some(dec!(102))]);
        let mut bench = flat_benchmark(3, dec!(100));
        bench.remove(&day(1));

        let out = RsFeatureCalculator::new().calculate(&rows, &bench);
        assert_eq!(out[1].rs_ratio, None);
        assert_eq!(out[1].log_return_rs, None);
        // 직전 RS가 NULL이므로 다음 행의 로그수익률도 NULL
        assert_eq!(out[2].log_return_rs, None);
        assert_eq!(out[2].zscore_20d, None);
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_date() {
        let mut rows = series(&[Some(dec!(100)), Some(dec!(200))]);
        rows.reverse();
        let out = RsFeatureCalculator::new().calculate(&rows, &flat_benchmark(2, dec!(100)));
        assert_eq!(out[0].date, day(0));
        assert_eq!(out[1].rs_ratio, Some(2.0));
    }

    #[test]
    fn test_zscore_null_for_identical_returns() {
        // RS가 매일 정확히 두 배 → 21행, 로그수익률 20개가 모두 ln(2)
        let closes: Vec<Option<Decimal>> = (0..21u32)
            .map(|i| Some(Decimal::from(2u64.pow(i))))
            .collect();
        let out = RsFeatureCalculator::new().calculate(&series(&closes), &flat_benchmark(21, dec!(1)));

        assert!(out[20].log_return_rs.is_some());
        assert!(out.iter().all(|r| r.zscore_20d.is_none()));
    }

    #[test]
    fn test_zscore_null_for_constant_ratio() {
        let closes = vec![Some(dec!(50)); 25];
        let out = RsFeatureCalculator::new().calculate(&series(&closes), &flat_benchmark(25, dec!(100)));
        assert!(out.iter().skip(1).all(|r| r.log_return_rs == Some(0.0)));
        assert!(out.iter().all(|r| r.zscore_20d.is_none()));
    }

    #[test]
    fn test_zscore_matches_sample_stdev() {
        // 로그수익률: ln(2), ln(0.5), ln(2)
        let closes = [dec!(1), dec!(2), dec!(1), dec!(2)].map(Some);
        let out = RsFeatureCalculator::new().calculate(&series(&closes), &flat_benchmark(4, dec!(1)));

        assert_eq!(out[1].zscore_20d, None); // 관측치 1개
        let l = (2.0f64).ln();
        let values = [l, -l, l];
        let mean = values.iter().sum::<f64>() / 3.0;
        let sd = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 2.0).sqrt();
        let expected = (l - mean) / sd;
        assert!((out[3].zscore_20d.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zscore_window_is_trailing() {
        let calc = RsFeatureCalculator::with_window(3).unwrap();
        // 앞쪽의 큰 변동은 윈도우 밖으로 밀려나야 한다
        let closes = [dec!(1), dec!(100), dec!(1), dec!(2), dec!(4), dec!(8), dec!(16)].map(Some);
        let out = calc.calculate(&series(&closes), &flat_benchmark(7, dec!(1)));
        // 마지막 3개 로그수익률이 모두 ln(2) → 표준편차 0
        assert_eq!(out[6].zscore_20d, None);
        assert!(out[3].zscore_20d.is_some());
    }

    #[test]
    fn test_invalid_window() {
        assert!(RsFeatureCalculator::with_window(1).is_err());
    }
}
