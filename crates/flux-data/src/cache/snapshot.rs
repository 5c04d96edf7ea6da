//! 장기 이력 스냅샷 캐시.
//!
//! 전체 이력(수십 년) 조회는 제공자 호출이 많으므로 결과를 티커별 압축 파일로 남겨두고,
//! 최근 `max_age` 이내에 쓰인 파일만 재사용합니다. 오래된 스냅샷은 그 사이 발표된
//! 분할/배당 수정이 빠져 있을 수 있어 무시하고 다시 조회합니다.
//!
//! 파일 형식: `{dir}/{TICKER}_full_history.json.gz` (gzip JSON `PriceBar` 배열).
//! 파일은 티커별로 분리되어 있어 잠금이 필요 없습니다.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use flux_core::PriceBar;

use crate::error::Result;

const FILE_SUFFIX: &str = "_full_history.json.gz";

/// 티커별 장기 이력 스냅샷 캐시.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    dir: PathBuf,
    max_age: Duration,
    min_lookback_days: u32,
}

impl SnapshotCache {
    /// 새 캐시 생성.
    ///
    /// # Arguments
    /// * `dir` - 스냅샷 디렉토리 (없으면 첫 저장 시 생성)
    /// * `max_age` - 재사용 가능한 최대 파일 수명
    /// * `min_lookback_days` - 이 값보다 긴 조회에만 캐시를 사용
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration, min_lookback_days: u32) -> Self {
        Self {
            dir: dir.into(),
            max_age,
            min_lookback_days,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 해당 조회 길이에 캐시를 사용하는지 여부.
    pub fn applies_to(&self, lookback_days: u32) -> bool {
        lookback_days > self.min_lookback_days
    }

    /// 티커의 스냅샷 파일 경로.
    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}{}", sanitize(ticker), FILE_SUFFIX))
    }

    /// 파일이 존재하고 `max_age` 이내에 쓰였는지 확인.
    pub fn is_fresh(&self, ticker: &str) -> bool {
        let Ok(metadata) = fs::metadata(self.path_for(ticker)) else {
            return false;
        };
        match metadata.modified() {
            // 미래 시각은 방금 쓴 파일로 취급
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age <= self.max_age)
                .unwrap_or(true),
            Err(_) => false,
        }
    }

    /// 신선한 스냅샷이 있으면 읽어 반환합니다.
    ///
    /// 파일이 없거나 만료되었거나 손상되었으면 `Ok(None)`.
    pub fn load_fresh(&self, ticker: &str) -> Result<Option<Vec<PriceBar>>> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Ok(None);
        }
        if !self.is_fresh(ticker) {
            debug!(ticker, path = %path.display(), "스냅샷 만료, 재조회");
            return Ok(None);
        }

        let reader = BufReader::new(GzDecoder::new(File::open(&path)?));
        match serde_json::from_reader::<_, Vec<PriceBar>>(reader) {
            Ok(bars) => {
                info!(ticker, count = bars.len(), "스냅샷 캐시 사용");
                Ok(Some(bars))
            }
            Err(e) => {
                warn!(ticker, path = %path.display(), error = %e, "스냅샷 손상, 무시");
                Ok(None)
            }
        }
    }

    /// 스냅샷을 저장합니다. 임시 파일에 쓴 뒤 이름을 바꿔 부분 파일이 남지 않게 합니다.
    pub fn store(&self, ticker: &str, bars: &[PriceBar]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(ticker);
        let tmp = path.with_extension("gz.tmp");
        {
            let mut encoder =
                GzEncoder::new(BufWriter::new(File::create(&tmp)?), Compression::default());
            serde_json::to_writer(&mut encoder, bars)?;
            encoder.finish()?.flush()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(ticker, count = bars.len(), path = %path.display(), "스냅샷 저장");
        Ok(path)
    }
}

/// 파일명에 안전한 티커 표기 (영숫자와 `-`만 유지).
fn sanitize(ticker: &str) -> String {
    ticker
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
