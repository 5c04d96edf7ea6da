//! 환경변수 기반 설정 모듈.

use crate::error::CollectorError;
use crate::Result;
use flux_core::Universe;
use flux_data::{FmpConfig, RetryPolicy, SnapshotCache, WriteRetryPolicy};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CORE_SECTORS: &[&str] = &[
    "XLK", "XLF", "XLV", "XLE", "XLI", "XLY", "XLP", "XLU", "XLB", "XLRE", "XLC",
];
const DEFAULT_THEMATICS: &[&str] = &["SMH", "IGV", "ITA", "XBI", "KRE", "ICLN"];
const DEFAULT_HEDGE: &[&str] = &["BIL", "SHV"];
const DEFAULT_MACRO: &[&str] = &["GLD", "USO", "UUP"];

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 연결 풀 최대 크기
    pub db_max_connections: u32,
    /// FMP 설정
    pub fmp: FmpSettings,
    /// 추적 유니버스
    pub universe: Universe,
    /// 가격 수집 설정
    pub ingest: IngestConfig,
    /// 스냅샷 캐시 설정
    pub snapshot: SnapshotConfig,
    /// upsert 재시도 설정
    pub writer: WriterConfig,
    /// 피처 계산 설정
    pub features: FeatureConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// FMP 설정
#[derive(Debug, Clone)]
pub struct FmpSettings {
    /// API 키 (제공자를 호출하는 작업에서만 필수)
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    /// 티커 간 요청 딜레이 (밀리초)
    pub request_delay_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub rate_limit_delay_ms: u64,
    pub rate_limit_max_retries: u32,
}

/// 가격 수집 설정
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// 증분 수집 조회 기간 (일)
    pub incremental_days: u32,
    /// 전체 이력 조회 기간 (일, 약 30년)
    pub full_history_days: u32,
    /// 요청당 최대 구간 (일)
    pub max_chunk_days: u32,
    /// 시가총액 함께 수집 여부
    pub include_market_cap: bool,
    /// 기업행동 감지 기간 (일)
    pub corporate_action_lookback_days: u32,
}

/// 스냅샷 캐시 설정
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub dir: PathBuf,
    pub max_age_days: u64,
    /// 이 기간보다 긴 조회에만 캐시 사용
    pub min_lookback_days: u32,
}

/// upsert 재시도 설정
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

/// 피처 계산 설정
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// RS 분모 티커
    pub benchmark: String,
    /// 증분 재계산 구간 (일)
    pub incremental_days: u32,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 워크플로우 실행 주기 (분 단위)
    pub interval_minutes: u64,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 구성 (테스트에서 환경변수 대신 사용)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let database_url = env.get("DATABASE_URL").ok_or_else(|| {
            CollectorError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let benchmark = env
            .get("UNIVERSE_BENCHMARK")
            .unwrap_or_else(|| "SPY".to_string());
        let universe = Universe::new(
            env.list("UNIVERSE_CORE_SECTORS", DEFAULT_CORE_SECTORS),
            env.list("UNIVERSE_THEMATICS", DEFAULT_THEMATICS),
            env.list("UNIVERSE_HEDGE", DEFAULT_HEDGE),
            benchmark.clone(),
            env.list("UNIVERSE_MACRO", DEFAULT_MACRO),
        )?;

        Ok(Self {
            database_url,
            db_max_connections: env.parse("DB_MAX_CONNECTIONS", 5),
            fmp: FmpSettings {
                api_key: env.get("FMP_API_KEY"),
                base_url: env
                    .get("FMP_BASE_URL")
                    .unwrap_or_else(|| flux_data::provider::fmp::DEFAULT_BASE_URL.to_string()),
                timeout_secs: env.parse("FMP_TIMEOUT_SECS", 10),
                request_delay_ms: env.parse("FMP_REQUEST_DELAY_MS", 100),
                max_attempts: env.parse("FMP_MAX_ATTEMPTS", 4),
                backoff_base_ms: env.parse("FMP_BACKOFF_BASE_MS", 500),
                backoff_max_ms: env.parse("FMP_BACKOFF_MAX_MS", 30_000),
                rate_limit_delay_ms: env.parse("FMP_RATE_LIMIT_DELAY_MS", 5_000),
                rate_limit_max_retries: env.parse("FMP_RATE_LIMIT_MAX_RETRIES", 20),
            },
            universe,
            ingest: IngestConfig {
                incremental_days: env.parse("INGEST_INCREMENTAL_DAYS", 30),
                full_history_days: env.parse("INGEST_FULL_HISTORY_DAYS", 10_950),
                max_chunk_days: env.parse("INGEST_MAX_CHUNK_DAYS", flux_data::MAX_CHUNK_DAYS),
                include_market_cap: env.bool("INGEST_INCLUDE_MARKET_CAP", true),
                corporate_action_lookback_days: env.parse("CORPORATE_ACTION_LOOKBACK_DAYS", 7),
            },
            snapshot: SnapshotConfig {
                dir: env
                    .get("SNAPSHOT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("data/raw_backup")),
                max_age_days: env.parse("SNAPSHOT_MAX_AGE_DAYS", 7),
                min_lookback_days: env.parse("SNAPSHOT_MIN_LOOKBACK_DAYS", 5_000),
            },
            writer: WriterConfig {
                max_attempts: env.parse("WRITER_MAX_ATTEMPTS", 3),
                retry_delay_ms: env.parse("WRITER_RETRY_DELAY_MS", 2_000),
            },
            features: FeatureConfig {
                benchmark: env
                    .get("FEATURE_BENCHMARK")
                    .map(|b| b.trim().to_uppercase())
                    .unwrap_or(benchmark.trim().to_uppercase()),
                incremental_days: env.parse("FEATURE_INCREMENTAL_DAYS", 60),
            },
            daemon: DaemonConfig {
                interval_minutes: env.parse("DAEMON_INTERVAL_MINUTES", 1440),
            },
        })
    }
}

impl CollectorConfig {
    /// 데이터베이스 연결 풀 생성
    pub async fn connect_pool(&self) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.db_max_connections)
            .connect(&self.database_url)
            .await?;
        Ok(pool)
    }
}

impl FmpSettings {
    /// FMP 클라이언트 설정 생성. API 키가 없으면 설정 에러.
    pub fn client_config(&self) -> Result<FmpConfig> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            CollectorError::Config("FMP_API_KEY 환경변수가 설정되지 않았습니다".to_string())
        })?;

        Ok(FmpConfig {
            api_key,
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: self.retry_policy(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            rate_limit_delay: Duration::from_millis(self.rate_limit_delay_ms),
            max_rate_limit_retries: self.rate_limit_max_retries,
        }
    }

    /// 티커 간 딜레이를 Duration으로 반환
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl SnapshotConfig {
    pub fn cache(&self) -> SnapshotCache {
        SnapshotCache::new(
            self.dir.clone(),
            Duration::from_secs(self.max_age_days * 24 * 3600),
            self.min_lookback_days,
        )
    }
}

impl WriterConfig {
    pub fn retry_policy(&self) -> WriteRetryPolicy {
        WriteRetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay_step: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl DaemonConfig {
    /// 워크플로우 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// 키 조회 래퍼.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// 값을 파싱 (실패 시 기본값 사용)
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// bool 값 파싱
    fn bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(default)
    }

    /// 쉼표 구분 목록
    fn list(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            Some(v) => v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<CollectorConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/flux")]).unwrap();

        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.fmp.api_key, None);
        assert_eq!(config.fmp.base_url, "https://financialmodelingprep.com");
        assert_eq!(config.ingest.incremental_days, 30);
        assert_eq!(config.ingest.full_history_days, 10_950);
        assert_eq!(config.ingest.max_chunk_days, 1825);
        assert!(config.ingest.include_market_cap);
        assert_eq!(config.ingest.corporate_action_lookback_days, 7);
        assert_eq!(config.snapshot.dir, PathBuf::from("data/raw_backup"));
        assert_eq!(config.writer.retry_policy().max_attempts, 3);
        assert_eq!(config.features.benchmark, "SPY");
        assert_eq!(config.features.incremental_days, 60);
        assert_eq!(config.universe.benchmark(), "SPY");
        assert_eq!(config.universe.hedge(), &["BIL".to_string(), "SHV".to_string()]);
        assert_eq!(config.daemon.interval(), Duration::from_secs(1440 * 60));
    }

    #[test]
    fn test_missing_database_url() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[test]
    fn test_overrides_and_lists() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db"),
            ("UNIVERSE_CORE_SECTORS", "xlk, xlf,,"),
            ("UNIVERSE_THEMATICS", "smh"),
            ("UNIVERSE_MACRO", ""),
            ("INGEST_INCLUDE_MARKET_CAP", "false"),
            ("FMP_MAX_ATTEMPTS", "not-a-number"),
            ("FMP_API_KEY", "secret"),
        ])
        .unwrap();

        assert_eq!(config.universe.core_sectors(), &["XLK".to_string(), "XLF".to_string()]);
        // 빈 값은 미설정으로 취급
        assert_eq!(config.universe.macro_tickers().len(), 3);
        assert!(!config.ingest.include_market_cap);
        assert_eq!(config.fmp.max_attempts, 4);

        let fmp = config.fmp.client_config().unwrap();
        assert_eq!(fmp.api_key, "secret");
        assert_eq!(fmp.timeout, Duration::from_secs(10));
        assert_eq!(fmp.retry.rate_limit_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_client_config_requires_api_key() {
        let config = config_from(&[("DATABASE_URL", "postgres://db")]).unwrap();
        assert!(config.fmp.client_config().is_err());
    }

    #[test]
    fn test_overlapping_universe_is_rejected() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://db"),
            ("UNIVERSE_HEDGE", "XLK"),
        ])
        .unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }
}
