//! 수집/계산 작업 모듈.

pub mod feature_sync;
pub mod flux_report;
pub mod holdings_sync;
pub mod price_collect;

pub use feature_sync::{sync_features, FeatureMode};
pub use flux_report::{compute_flux, print_flux};
pub use holdings_sync::sync_holdings;
pub use price_collect::{collect_prices, CollectMode};
