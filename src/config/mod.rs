//! Environment-driven configuration, organized by concern: exchange
//! client, cache store, indicator engine. `.env` is loaded by the binary
//! entry point via `dotenvy` before `GatewayConfig::from_env()` runs.

mod cache_config;
mod exchange_config;
mod indicator_config;

pub use cache_config::CacheEnvConfig;
pub use exchange_config::ExchangeEnvConfig;
pub use indicator_config::IndicatorEnvConfig;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub exchange: ExchangeEnvConfig,
    pub cache: CacheEnvConfig,
    pub indicator: IndicatorEnvConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let exchange = ExchangeEnvConfig::from_env().context("loading exchange configuration")?;
        let cache = CacheEnvConfig::from_env().context("loading cache configuration")?;
        let indicator = IndicatorEnvConfig::from_env().context("loading indicator configuration")?;

        Ok(Self {
            exchange,
            cache,
            indicator,
        })
    }
}
