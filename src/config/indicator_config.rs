use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct IndicatorEnvConfig {
    pub precision: u32,
    pub max_data_points: usize,
}

impl IndicatorEnvConfig {
    pub fn from_env() -> Result<Self> {
        let precision = std::env::var("INDICATOR_PRECISION")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("INDICATOR_PRECISION must be a non-negative integer")?;
        let max_data_points = std::env::var("MAX_DATA_POINTS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("MAX_DATA_POINTS must be a positive integer")?;

        Ok(Self { precision, max_data_points })
    }
}
