//! Midas Gateway demo binary.
//!
//! Wires the full pipeline — exchange client, cache, indicator engine,
//! regime detector, statistical enrichment, MTF orchestration, trading
//! context composition — and prints one end-to-end result to stdout.
//!
//! # Usage
//! ```sh
//! GATEWAY_SYMBOL=BTCUSDT cargo run --bin midas-gateway-demo
//! ```

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

use midas_gateway::application::{
    compose_trading_context, IndicatorEngine, MarketDataProvider, MtfOrchestrator, RegimeDetector, SegmentCache,
};
use midas_gateway::application::mtf_orchestrator::TimeframeMap;
use midas_gateway::application::regime_detector::RegimeDetectorConfig;
use midas_gateway::config::GatewayConfig;
use midas_gateway::domain::market::Timeframe;
use midas_gateway::infrastructure::core::HttpClientFactory;
use midas_gateway::infrastructure::{BinanceExchangeClient, InMemoryCacheStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("midas-gateway demo {} starting", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_env()?;
    let symbol = std::env::var("GATEWAY_SYMBOL").unwrap_or_else(|_| "BTCUSDT".to_string());
    info!(symbol, "configuration loaded");

    let http_client = HttpClientFactory::create_client();
    let exchange = BinanceExchangeClient::new(http_client, config.exchange.base_url.clone())
        .with_api_key(config.exchange.api_key.clone())
        .with_max_limit(config.exchange.max_limit);
    let exchange = Arc::new(exchange);

    let store = Arc::new(InMemoryCacheStore::new());
    let cache = Arc::new(SegmentCache::new(
        store,
        config.cache.key_prefix(),
        config.cache.max_bars_per_key,
        config.cache.ttl_seconds,
    ));

    let provider = Arc::new(MarketDataProvider::new(
        exchange,
        if config.cache.enabled { Some(cache) } else { None },
        config.indicator.max_data_points,
    ));
    let engine = Arc::new(IndicatorEngine::new(config.indicator.precision));
    let detector = Arc::new(RegimeDetector::new(config.indicator.precision, RegimeDetectorConfig::default()));

    let orchestrator = MtfOrchestrator::new(provider, engine, detector);

    let timeframes = TimeframeMap {
        long: Some(Timeframe::OneDay),
        medium: Some(Timeframe::FourHour),
        short: Some(Timeframe::OneHour),
    };

    info!("running multi-timeframe analysis");
    let result = orchestrator.run(&symbol, timeframes, 300, None).await?;

    info!(
        dominant_direction = %result.alignment.dominant_direction,
        alignment_score = result.alignment.alignment_score,
        conflicts = result.alignment.conflicts.len(),
        "alignment computed"
    );

    let trading_context = compose_trading_context(&result.alignment, &result.contexts);
    info!(
        trade_quality_score = trading_context.trade_quality_score,
        "trading context composed"
    );

    println!("{}", serde_json::to_string_pretty(&trading_context)?);

    Ok(())
}
