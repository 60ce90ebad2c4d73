pub mod market_regime;
pub mod timeframe;

pub use market_regime::{Direction, RegimeClassification, RegimeComponents, RegimeType, ThresholdSet};
pub use timeframe::Timeframe;
