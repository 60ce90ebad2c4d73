use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct CacheEnvConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
    pub ttl_seconds: u64,
    pub max_bars_per_key: usize,
}

impl CacheEnvConfig {
    pub fn from_env() -> Result<Self> {
        let enabled = std::env::var("REDIS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .context("REDIS_ENABLED must be true or false")?;
        let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("REDIS_PORT")
            .unwrap_or_else(|_| "6379".to_string())
            .parse()
            .context("REDIS_PORT must be a valid port number")?;
        let password = std::env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty());
        let db = std::env::var("REDIS_DB")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .context("REDIS_DB must be a non-negative integer")?;
        let ttl_seconds = std::env::var("REDIS_CACHE_TTL")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("REDIS_CACHE_TTL must be a positive integer")?;
        let max_bars_per_key = std::env::var("REDIS_MAX_BARS_PER_KEY")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .context("REDIS_MAX_BARS_PER_KEY must be a positive integer")?;

        Ok(Self {
            enabled,
            host,
            port,
            password,
            db,
            ttl_seconds,
            max_bars_per_key,
        })
    }

    pub fn key_prefix(&self) -> &'static str {
        "midas:cache:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_spec() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in ["REDIS_ENABLED", "REDIS_HOST", "REDIS_PORT", "REDIS_PASSWORD", "REDIS_DB", "REDIS_CACHE_TTL", "REDIS_MAX_BARS_PER_KEY"] {
            unsafe { std::env::remove_var(var) };
        }
        let cfg = CacheEnvConfig::from_env().unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.port, 6379);
        assert_eq!(cfg.ttl_seconds, 300);
        assert_eq!(cfg.max_bars_per_key, 10000);
        assert_eq!(cfg.key_prefix(), "midas:cache:");
    }
}
