pub mod indicator_engine;
pub mod market_data_provider;
pub mod mtf_orchestrator;
pub mod regime_detector;
pub mod segment_cache;
pub mod statistical_enricher;
pub mod trading_context_composer;

pub use indicator_engine::IndicatorEngine;
pub use market_data_provider::MarketDataProvider;
pub use mtf_orchestrator::MtfOrchestrator;
pub use regime_detector::RegimeDetector;
pub use segment_cache::SegmentCache;
pub use trading_context_composer::{compose as compose_trading_context, TradingContext};
