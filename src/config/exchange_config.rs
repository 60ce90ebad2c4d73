use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ExchangeEnvConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_limit: usize,
    pub timeout_ms: u64,
    pub retry_max_attempts: u32,
}

impl ExchangeEnvConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("EXCHANGE_BASE_URL")
            .unwrap_or_else(|_| "https://api.binance.com".to_string());
        let api_key = std::env::var("EXCHANGE_API_KEY").ok().filter(|s| !s.is_empty());
        let max_limit = std::env::var("EXCHANGE_MAX_LIMIT")
            .unwrap_or_else(|_| "1500".to_string())
            .parse()
            .context("EXCHANGE_MAX_LIMIT must be a positive integer")?;
        let timeout_ms = std::env::var("EXCHANGE_TIMEOUT_MS")
            .unwrap_or_else(|_| "15000".to_string())
            .parse()
            .context("EXCHANGE_TIMEOUT_MS must be a positive integer")?;
        let retry_max_attempts = std::env::var("EXCHANGE_RETRY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("EXCHANGE_RETRY_MAX_ATTEMPTS must be a positive integer")?;

        Ok(Self {
            base_url,
            api_key,
            max_limit,
            timeout_ms,
            retry_max_attempts,
        })
    }
}
