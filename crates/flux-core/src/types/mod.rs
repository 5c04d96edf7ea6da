//! 파이프라인 전반에서 사용되는 공통 타입.

mod range;
mod record;
mod universe;

pub use range::*;
pub use record::*;
pub use universe::*;
