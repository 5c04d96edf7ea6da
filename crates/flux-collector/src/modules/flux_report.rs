//! 자금흐름 행렬 보고.

use chrono::NaiveDate;
use sqlx::PgPool;

use flux_analytics::{FluxCalculator, FluxMatrix};
use flux_core::Universe;
use flux_data::PriceRepository;

use crate::modules::price_collect::parse_symbols;
use crate::{CollectorConfig, Result};

/// 두 기준일의 자금흐름 행렬을 계산합니다.
///
/// 대상 유니버스는 `--target` 목록, 없으면 코어 섹터 + 테마입니다.
/// 어느 날짜든 시세가 없으면 `None`.
pub async fn compute_flux(
    pool: &PgPool,
    config: &CollectorConfig,
    past: NaiveDate,
    now: NaiveDate,
    target: Option<String>,
) -> Result<Option<FluxMatrix>> {
    let repo = PriceRepository::new(pool.clone());
    let targets = resolve_targets(&config.universe, target.as_deref());
    let hedge = config.universe.hedge().to_vec();

    let mut symbols = targets.clone();
    symbols.extend(hedge.iter().cloned());

    let rows = repo.load_snapshot_rows(&[past, now], &symbols).await?;
    tracing::debug!(rows = rows.len(), past = %past, now = %now, "스냅샷 조회");

    let matrix = FluxCalculator::new().calculate(&targets, &hedge, past, now, &rows)?;
    match &matrix {
        Some(m) => tracing::info!(
            nodes = m.len(),
            total_flow = %m.total_flow(),
            residual = %m.residual,
            "자금흐름 계산 완료"
        ),
        None => tracing::warn!(past = %past, now = %now, "기준일 스냅샷이 없습니다"),
    }
    Ok(matrix)
}

/// 행렬을 JSON으로 출력합니다.
pub fn print_flux(matrix: Option<&FluxMatrix>) -> Result<()> {
    match matrix {
        Some(m) => {
            let json = serde_json::to_string_pretty(m)
                .map_err(|e| crate::CollectorError::Other(Box::new(e)))?;
            println!("{}", json);
        }
        None => println!("null"),
    }
    Ok(())
}

/// 대상 유니버스 결정
pub fn resolve_targets(universe: &Universe, target: Option<&str>) -> Vec<String> {
    match target {
        Some(list) => parse_symbols(list),
        None => universe
            .core_sectors()
            .iter()
            .chain(universe.thematics())
            .cloned()
            .collect(),
    }
}
