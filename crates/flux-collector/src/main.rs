//! SectorFlux collector CLI.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use flux_collector::modules::{self, CollectMode, FeatureMode};
use flux_collector::{CollectorConfig, Result};
use flux_core::logging::{init_logging, LogConfig, LogFormat};

#[derive(Parser)]
#[command(name = "flux-collector")]
#[command(about = "SectorFlux ingestion and flux pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// 스키마 마이그레이션 실행
    Migrate,

    /// 증분 가격 수집 (기업행동 감지 티커는 전체 이력)
    Crawler {
        /// 특정 티커만 수집 (쉼표로 구분, 예: "XLK,XLF")
        #[arg(long)]
        symbols: Option<String>,
    },

    /// 전체 이력 가격 수집
    SeedHistory {
        #[arg(long)]
        symbols: Option<String>,
    },

    /// 최근 구간 RS 피처 재계산
    Process {
        #[arg(long)]
        symbols: Option<String>,
    },

    /// 전체 구간 RS 피처 재계산
    ProcessHistory {
        #[arg(long)]
        symbols: Option<String>,
    },

    /// ETF 보유종목 동기화
    Holdings {
        /// 특정 ETF만 (쉼표로 구분)
        #[arg(long)]
        symbols: Option<String>,
    },

    /// 두 기준일 사이 자금흐름 행렬 출력 (JSON)
    Flux {
        /// 과거 기준일 (YYYY-MM-DD)
        #[arg(long)]
        past: NaiveDate,

        /// 현재 기준일 (YYYY-MM-DD)
        #[arg(long)]
        now: NaiveDate,

        /// 대상 유니버스 (쉼표로 구분, 기본: 코어 섹터 + 테마)
        #[arg(long)]
        target: Option<String>,
    },

    /// 전체 워크플로우 실행 (가격 수집 → 보유종목 → 피처)
    RunAll,

    /// 데몬 모드: 주기적으로 전체 워크플로우 실행
    Daemon,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(
        LogConfig::new(format!("flux_collector={0},flux_data={0},flux_analytics={0}", cli.log_level))
            .with_format(cli.log_format),
    )?;

    tracing::info!("SectorFlux Collector 시작");

    let config = CollectorConfig::from_env()?;
    tracing::debug!(
        universe = config.universe.all_tickers().len(),
        max_connections = config.db_max_connections,
        "설정 로드 완료"
    );

    let pool = config.connect_pool().await?;
    tracing::info!("데이터베이스 연결 성공");

    match cli.command {
        Commands::Migrate => {
            flux_data::run_migrations(&pool).await?;
        }
        Commands::Crawler { symbols } => {
            let stats =
                modules::collect_prices(&pool, &config, CollectMode::Incremental, symbols).await?;
            stats.log_summary("증분 가격 수집");
        }
        Commands::SeedHistory { symbols } => {
            let stats =
                modules::collect_prices(&pool, &config, CollectMode::FullHistory, symbols).await?;
            stats.log_summary("전체 이력 수집");
        }
        Commands::Process { symbols } => {
            let stats =
                modules::sync_features(&pool, &config, FeatureMode::Incremental, symbols).await?;
            stats.log_summary("피처 계산");
        }
        Commands::ProcessHistory { symbols } => {
            let stats = modules::sync_features(&pool, &config, FeatureMode::Full, symbols).await?;
            stats.log_summary("전체 피처 계산");
        }
        Commands::Holdings { symbols } => {
            let stats = modules::sync_holdings(&pool, &config, symbols).await?;
            stats.log_summary("보유종목 동기화");
        }
        Commands::Flux { past, now, target } => {
            let matrix = modules::compute_flux(&pool, &config, past, now, target).await?;
            modules::print_flux(matrix.as_ref())?;
        }
        Commands::RunAll => {
            tracing::info!("=== 전체 워크플로우 시작 ===");

            tracing::info!("Step 1/3: 가격 수집");
            let price_stats =
                modules::collect_prices(&pool, &config, CollectMode::Incremental, None).await?;
            price_stats.log_summary("증분 가격 수집");

            tracing::info!("Step 2/3: 보유종목 동기화");
            let holdings_stats = modules::sync_holdings(&pool, &config, None).await?;
            holdings_stats.log_summary("보유종목 동기화");

            tracing::info!("Step 3/3: 피처 계산");
            let feature_stats =
                modules::sync_features(&pool, &config, FeatureMode::Incremental, None).await?;
            feature_stats.log_summary("피처 계산");

            tracing::info!("=== 전체 워크플로우 완료 ===");
        }
        Commands::Daemon => {
            tracing::info!(
                "=== 데몬 모드 시작 (주기: {}분) ===",
                config.daemon.interval_minutes
            );

            let mut interval = tokio::time::interval(config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("종료 신호 수신, 데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {
                        run_workflow_once(&pool, &config).await;
                        tracing::info!(
                            "=== 워크플로우 완료, 다음 실행: {}분 후 ===",
                            config.daemon.interval_minutes
                        );
                    }
                }
            }
        }
    }

    pool.close().await;
    tracing::info!("SectorFlux Collector 종료");

    Ok(())
}

/// 데몬 한 주기. 단계별 실패는 기록만 하고 다음 단계로 진행합니다.
async fn run_workflow_once(pool: &sqlx::PgPool, config: &CollectorConfig) {
    tracing::info!("=== 워크플로우 실행 시작 ===");

    log_step(
        "증분 가격 수집",
        modules::collect_prices(pool, config, CollectMode::Incremental, None).await,
    );
    log_step("보유종목 동기화", modules::sync_holdings(pool, config, None).await);
    log_step(
        "피처 계산",
        modules::sync_features(pool, config, FeatureMode::Incremental, None).await,
    );
}

fn log_step(operation: &str, result: Result<flux_collector::CollectionStats>) {
    match result {
        Ok(stats) => stats.log_summary(operation),
        Err(e) => tracing::error!("{} 실패: {}", operation, e),
    }
}
