pub mod indicators;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::errors::{GatewayError, GatewayResult};

use indicators::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    Bollinger,
    Atr,
    Stochastic,
    Roc,
    Obv,
    EfficiencyRatio,
    Adx,
    Vwap,
}

impl IndicatorKind {
    pub fn key(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Bollinger => "bollinger",
            IndicatorKind::Atr => "atr",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::Roc => "roc",
            IndicatorKind::Obv => "obv",
            IndicatorKind::EfficiencyRatio => "efficiency_ratio",
            IndicatorKind::Adx => "adx",
            IndicatorKind::Vwap => "vwap",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Per-request configuration, keyed by parameter name (`"period"`,
/// `"fast"`, `"slow"`, `"signal"`, `"std_dev"`). Missing keys fall back to
/// the catalog default for that indicator.
pub type IndicatorConfig = HashMap<String, f64>;

#[derive(Debug, Clone)]
pub struct IndicatorRequest {
    pub kind: IndicatorKind,
    pub config: IndicatorConfig,
}

impl IndicatorRequest {
    pub fn new(kind: IndicatorKind) -> Self {
        Self {
            kind,
            config: IndicatorConfig::new(),
        }
    }

    pub fn with(kind: IndicatorKind, config: IndicatorConfig) -> Self {
        Self { kind, config }
    }

    fn get(&self, param: &str, default: f64) -> f64 {
        *self.config.get(param).unwrap_or(&default)
    }
}

fn default_period(kind: IndicatorKind) -> f64 {
    match kind {
        IndicatorKind::Sma => 20.0,
        IndicatorKind::Ema => 20.0,
        IndicatorKind::Rsi => 14.0,
        IndicatorKind::Macd => 26.0,
        IndicatorKind::Bollinger => 20.0,
        IndicatorKind::Atr => 14.0,
        IndicatorKind::Stochastic => 14.0,
        IndicatorKind::Roc => 10.0,
        IndicatorKind::Obv => 0.0,
        IndicatorKind::EfficiencyRatio => 10.0,
        IndicatorKind::Adx => 14.0,
        IndicatorKind::Vwap => 20.0,
    }
}

/// Bars of this timeframe an indicator needs before its output is
/// meaningful, given its (possibly user-overridden) config.
pub fn warmup_bars(request: &IndicatorRequest) -> usize {
    match request.kind {
        IndicatorKind::Macd => {
            let slow = request.get("slow", 26.0) as usize;
            let signal = request.get("signal", 9.0) as usize;
            slow + signal
        }
        IndicatorKind::Obv => 1,
        _ => request.get("period", default_period(request.kind)) as usize,
    }
}

fn build(request: &IndicatorRequest) -> Box<dyn StreamingIndicator> {
    match request.kind {
        IndicatorKind::Sma => Box::new(SmaIndicator::new(request.get("period", 20.0) as usize)),
        IndicatorKind::Ema => Box::new(EmaIndicator::new(request.get("period", 20.0) as usize)),
        IndicatorKind::Rsi => Box::new(RsiIndicator::new(request.get("period", 14.0) as usize)),
        IndicatorKind::Macd => Box::new(MacdIndicator::new(
            request.get("fast", 12.0) as usize,
            request.get("slow", 26.0) as usize,
            request.get("signal", 9.0) as usize,
        )),
        IndicatorKind::Bollinger => Box::new(BollingerIndicator::new(
            request.get("period", 20.0) as usize,
            request.get("std_dev", 2.0),
        )),
        IndicatorKind::Atr => Box::new(AtrIndicator::new(request.get("period", 14.0) as usize)),
        IndicatorKind::Stochastic => Box::new(StochasticIndicator::new(request.get("period", 14.0) as usize)),
        IndicatorKind::Roc => Box::new(RocIndicator::new(request.get("period", 10.0) as usize)),
        IndicatorKind::Obv => Box::new(ObvIndicator::new()),
        IndicatorKind::EfficiencyRatio => {
            Box::new(EfficiencyRatioIndicator::new(request.get("period", 10.0) as usize))
        }
        IndicatorKind::Adx => Box::new(AdxIndicator::new(request.get("period", 14.0) as usize)),
        IndicatorKind::Vwap => Box::new(VwapIndicator::new(request.get("period", 20.0) as usize)),
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Serialize)]
pub struct ComputeResult {
    /// series[output_key][bar_index] = rounded value, or null during warm-up.
    pub series: HashMap<String, Vec<Option<f64>>>,
    pub snapshot: HashMap<String, Option<f64>>,
}

/// Factory + streaming-update engine for the indicator catalog. Stateless
/// between calls: every `compute_series` invocation builds fresh
/// calculator instances and replays the full candle slice through them.
pub struct IndicatorEngine {
    pub precision: u32,
}

impl IndicatorEngine {
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// Feed `candles` through every requested indicator in one pass, then
    /// trim the leading bars so the returned series covers only the last
    /// `requested_bars` candles (defaults to all of `candles`).
    pub fn compute_series(
        &self,
        candles: &[Candle],
        requests: &[IndicatorRequest],
        requested_bars: Option<usize>,
    ) -> GatewayResult<ComputeResult> {
        if requests.is_empty() {
            return Err(GatewayError::InvalidInput("at least one indicator must be requested".into()));
        }

        let mut calculators: Vec<Box<dyn StreamingIndicator>> = requests.iter().map(build).collect();
        let mut series: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        for request in requests {
            for key in build(request).output_keys() {
                series.entry(key.to_string()).or_default();
            }
        }

        for candle in candles {
            for calc in calculators.iter_mut() {
                let outputs = calc.update(candle);
                for (key, value) in outputs {
                    let rounded = value.map(|v| round_to(v, self.precision));
                    series.entry(key.to_string()).or_default().push(rounded);
                }
            }
        }

        let total = candles.len();
        let requested = requested_bars.unwrap_or(total).min(total);
        if requested < total {
            let drop = total - requested;
            for values in series.values_mut() {
                if values.len() >= drop {
                    values.drain(0..drop);
                }
            }
        }

        let snapshot = series
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().rev().find_map(|x| *x)))
            .collect();

        Ok(ComputeResult { series, snapshot })
    }

    /// Total 1-minute-equivalent warm-up (with 20% buffer) required across
    /// every requested indicator.
    pub fn required_warmup(requests: &[IndicatorRequest]) -> usize {
        requests
            .iter()
            .map(|r| (warmup_bars(r) as f64 * 1.2).ceil() as usize)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle::new(
            "BTCUSDT",
            ts,
            rust_decimal::Decimal::try_from(close).unwrap(),
            rust_decimal::Decimal::try_from(close + 1.0).unwrap(),
            rust_decimal::Decimal::try_from(close - 1.0).unwrap(),
            rust_decimal::Decimal::try_from(close).unwrap(),
            dec!(100),
        )
        .unwrap()
    }

    #[test]
    fn compute_series_rejects_empty_request() {
        let engine = IndicatorEngine::new(3);
        let candles = vec![candle(0, 100.0)];
        assert!(engine.compute_series(&candles, &[], None).is_err());
    }

    #[test]
    fn compute_series_aligns_output_length_to_input() {
        let engine = IndicatorEngine::new(3);
        let candles: Vec<Candle> = (0..30).map(|i| candle(i, 100.0 + i as f64)).collect();
        let requests = vec![IndicatorRequest::new(IndicatorKind::Sma)];
        let result = engine.compute_series(&candles, &requests, None).unwrap();
        assert_eq!(result.series["sma"].len(), 30);
    }

    #[test]
    fn compute_series_trims_to_requested_bars() {
        let engine = IndicatorEngine::new(3);
        let candles: Vec<Candle> = (0..30).map(|i| candle(i, 100.0 + i as f64)).collect();
        let requests = vec![IndicatorRequest::new(IndicatorKind::Sma)];
        let result = engine.compute_series(&candles, &requests, Some(10)).unwrap();
        assert_eq!(result.series["sma"].len(), 10);
    }

    #[test]
    fn adx_output_is_null_before_warmup_then_populated() {
        let engine = IndicatorEngine::new(2);
        let candles: Vec<Candle> = (0..40).map(|i| candle(i, 100.0 + i as f64)).collect();
        let requests = vec![IndicatorRequest::new(IndicatorKind::Adx)];
        let result = engine.compute_series(&candles, &requests, None).unwrap();
        assert!(result.series["adx"][0].is_none());
        assert!(result.series["adx"].last().unwrap().is_some());
    }

    #[test]
    fn required_warmup_takes_max_across_requests_with_buffer() {
        let requests = vec![
            IndicatorRequest::new(IndicatorKind::Sma),
            IndicatorRequest::with(IndicatorKind::Rsi, HashMap::from([("period".to_string(), 50.0)])),
        ];
        assert_eq!(IndicatorEngine::required_warmup(&requests), 60);
    }

    #[test]
    fn snapshot_takes_last_non_null_value() {
        let engine = IndicatorEngine::new(3);
        let candles: Vec<Candle> = (0..5).map(|i| candle(i, 100.0)).collect();
        let requests = vec![IndicatorRequest::new(IndicatorKind::Adx)];
        let result = engine.compute_series(&candles, &requests, None).unwrap();
        assert_eq!(result.snapshot["adx"], None);
    }
}
