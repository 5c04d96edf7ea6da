//! Financial Modeling Prep (FMP) API 클라이언트.
//!
//! 일봉, 시가총액, 기업행동 캘린더, ETF 보유종목을 조회합니다.
//!
//! # 재시도
//!
//! - 429: 같은 파라미터(같은 구간)로 재요청. 커서를 옮기지 않으므로 구간 누락이 없습니다.
//! - 5xx/타임아웃: 지수 백오프 후 재요청, `max_attempts`회 시도 후 실패
//! - 401/403: 재시도하지 않고 `DataError::Forbidden` 반환
//!
//! # 응답 형태
//!
//! 엔드포인트/요금제에 따라 응답이 세 가지 형태로 옵니다:
//!
//! ```text
//! [ {...}, {...} ]
//! { "symbol": "XLK", "historical": [ {...} ] }
//! { "data": [ {...} ] }
//! ```
//!
//! 모두 같은 레코드 목록으로 정규화하며, 그 외 형태나 빈 응답은 0건으로 취급합니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use flux_data::{FmpClient, FmpConfig};
//!
//! let client = FmpClient::new(FmpConfig::new(api_key))?;
//! let bars = client.fetch_price_range("XLK", range).await?;
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use flux_core::{
    ActionKind, CorporateAction, DateRange, HoldingRecord, MarketCapPoint, PriceBar,
};

use super::retry::RetryPolicy;
use crate::error::{DataError, Result, RetryKind};

/// FMP 기본 URL.
pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com";

/// FMP 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct FmpConfig {
    pub api_key: String,
    pub base_url: String,
    /// 요청당 타임아웃
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl FmpConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// 사용하는 FMP 엔드포인트.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// 수정주가 일봉 (symbol, from, to)
    HistoricalPrice,
    /// 일별 시가총액 (symbol, from, to)
    MarketCap,
    /// 주식 분할 캘린더 (from, to)
    SplitsCalendar,
    /// 배당 캘린더 (from, to)
    DividendsCalendar,
    /// ETF 보유종목 (symbol)
    EtfHoldings,
}

impl Endpoint {
    /// URL 경로.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::HistoricalPrice => "/stable/historical-price-eod/full",
            Endpoint::MarketCap => "/stable/historical-market-capitalization",
            Endpoint::SplitsCalendar => "/stable/splits-calendar",
            Endpoint::DividendsCalendar => "/stable/dividends-calendar",
            Endpoint::EtfHoldings => "/stable/etf/holdings",
        }
    }

    /// 기업행동 종류에 해당하는 캘린더 엔드포인트.
    pub fn calendar(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Split => Endpoint::SplitsCalendar,
            ActionKind::Dividend => Endpoint::DividendsCalendar,
        }
    }
}

/// FMP API 클라이언트.
#[derive(Clone)]
pub struct FmpClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl FmpClient {
    /// 새 클라이언트 생성.
    pub fn new(config: FmpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DataError::ConfigError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// 일봉 조회 (한 청크).
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn fetch_price_range(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceBar>> {
        let items = self
            .request(Endpoint::HistoricalPrice, &range_params(Some(symbol), range))
            .await?;

        let bars = decode_items::<WireBar>(items, Endpoint::HistoricalPrice)
            .filter_map(WireBar::into_bar)
            .collect::<Vec<_>>();

        debug!(symbol, count = bars.len(), "일봉 조회 완료");
        Ok(bars)
    }

    /// 일별 시가총액 조회 (한 청크).
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn fetch_market_cap_range(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<MarketCapPoint>> {
        let items = self
            .request(Endpoint::MarketCap, &range_params(Some(symbol), range))
            .await?;

        Ok(decode_items::<WireMarketCap>(items, Endpoint::MarketCap)
            .filter_map(WireMarketCap::into_point)
            .collect())
    }

    /// 기업행동 캘린더 조회 (전체 종목).
    #[instrument(skip(self, range), fields(range = %range))]
    pub async fn fetch_corporate_actions(
        &self,
        kind: ActionKind,
        range: DateRange,
    ) -> Result<Vec<CorporateAction>> {
        let endpoint = Endpoint::calendar(kind);
        let items = self.request(endpoint, &range_params(None, range)).await?;

        Ok(decode_items::<WireAction>(items, endpoint)
            .filter_map(|w| w.into_action(kind))
            .collect())
    }

    /// ETF 보유종목 조회.
    ///
    /// 응답에 날짜가 없으면 `today`를 기준일로 사용합니다.
    #[instrument(skip(self))]
    pub async fn fetch_etf_holdings(
        &self,
        etf_symbol: &str,
        today: NaiveDate,
    ) -> Result<Vec<HoldingRecord>> {
        let params = vec![("symbol", etf_symbol.to_string())];
        let items = self.request(Endpoint::EtfHoldings, &params).await?;
        let etf_symbol = etf_symbol.to_uppercase();

        Ok(decode_items::<WireHolding>(items, Endpoint::EtfHoldings)
            .filter_map(|w| w.into_record(&etf_symbol, today))
            .collect())
    }

    /// 재시도를 포함한 요청. 성공 시 정규화된 레코드 목록을 반환합니다.
    async fn request(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<Vec<Value>> {
        let mut transient_retries = 0u32;
        let mut rate_limit_retries = 0u32;

        loop {
            let err = match self.request_once(endpoint, params).await {
                Ok(payload) => return Ok(normalize_payload(payload)),
                Err(e) => e,
            };

            let delay = match err.retry_kind() {
                Some(RetryKind::RateLimit)
                    if rate_limit_retries < self.retry.max_rate_limit_retries =>
                {
                    rate_limit_retries += 1;
                    let delay = self.retry.rate_limit_backoff(rate_limit_retries);
                    warn!(
                        endpoint = endpoint.path(),
                        retry = rate_limit_retries,
                        delay_ms = delay.as_millis() as u64,
                        "요청 한도 초과, 같은 구간 재요청 대기"
                    );
                    delay
                }
                Some(RetryKind::Transient) if transient_retries + 1 < self.retry.max_attempts => {
                    transient_retries += 1;
                    let delay = self.retry.backoff(transient_retries);
                    warn!(
                        endpoint = endpoint.path(),
                        attempt = transient_retries + 1,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "일시적 오류, 재시도 대기"
                    );
                    delay
                }
                _ => return Err(err),
            };

            tokio::time::sleep(delay).await;
        }
    }

    /// 단일 요청. 상태 코드를 분류하고, 본문이 JSON이 아니면 `Value::Null`을 반환합니다.
    async fn request_once(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint.path());

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        if let Some(err) = DataError::from_status(status, endpoint.path()) {
            let body = response.text().await.unwrap_or_default();
            debug!(endpoint = endpoint.path(), status, body = %truncate(&body, 200), "FMP 오류 응답");
            return Err(err);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(endpoint = endpoint.path(), error = %e, "JSON 파싱 실패, 0건으로 처리");
                Ok(Value::Null)
            }
        }
    }
}

/// 응답 형태를 레코드 목록으로 정규화합니다.
///
/// 배열, `{"historical": [...]}`, `{"data": [...]}` 외의 형태는 빈 목록입니다.
pub fn normalize_payload(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => ["historical", "data"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn range_params(symbol: Option<&str>, range: DateRange) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(3);
    if let Some(symbol) = symbol {
        params.push(("symbol", symbol.to_string()));
    }
    params.push(("from", range.start.format("%Y-%m-%d").to_string()));
    params.push(("to", range.end.format("%Y-%m-%d").to_string()));
    params
}

/// 레코드 단위로 역직렬화합니다. 형식이 맞지 않는 레코드는 건너뜁니다.
fn decode_items<T: for<'de> Deserialize<'de>>(
    items: Vec<Value>,
    endpoint: Endpoint,
) -> impl Iterator<Item = T> {
    items
        .into_iter()
        .filter_map(move |item| match serde_json::from_value::<T>(item) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(endpoint = endpoint.path(), error = %e, "레코드 형식 불일치, 건너뜀");
                None
            }
        })
}

/// `YYYY-MM-DD` 또는 `YYYY-MM-DD HH:MM:SS` 형태에서 날짜만 추출.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ==================== 응답 레코드 ====================

#[derive(Debug, Deserialize)]
struct WireBar {
    date: String,
    #[serde(default)]
    open: Option<Decimal>,
    #[serde(default)]
    high: Option<Decimal>,
    #[serde(default)]
    low: Option<Decimal>,
    #[serde(default)]
    close: Option<Decimal>,
    #[serde(default)]
    volume: Option<f64>,
}

impl WireBar {
    fn into_bar(self) -> Option<PriceBar> {
        Some(PriceBar {
            date: parse_date(&self.date)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.map(|v| v.round() as i64),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMarketCap {
    date: String,
    #[serde(default)]
    market_cap: Option<Decimal>,
}

impl WireMarketCap {
    fn into_point(self) -> Option<MarketCapPoint> {
        Some(MarketCapPoint {
            date: parse_date(&self.date)?,
            market_cap: self.market_cap?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireAction {
    symbol: String,
    #[serde(default)]
    date: Option<String>,
}

impl WireAction {
    fn into_action(self, kind: ActionKind) -> Option<CorporateAction> {
        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }
        Some(CorporateAction {
            symbol,
            effective_date: self.date.as_deref().and_then(parse_date),
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHolding {
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    weight_percentage: Option<Decimal>,
    #[serde(default)]
    shares_number: Option<Decimal>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl WireHolding {
    fn into_record(self, etf_symbol: &str, today: NaiveDate) -> Option<HoldingRecord> {
        let holding_symbol = self.asset?.trim().to_uppercase();
        if holding_symbol.is_empty() {
            return None;
        }
        let date = self
            .date
            .as_deref()
            .or(self.updated_at.as_deref())
            .and_then(parse_date)
            .unwrap_or(today);

        Some(HoldingRecord {
            date,
            etf_symbol: etf_symbol.to_string(),
            holding_symbol,
            weight: self.weight_percentage,
            shares: self.shares_number,
        })
    }
}
