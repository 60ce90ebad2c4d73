use serde_json::{json, Value};

use crate::domain::candle::Candle;
use crate::domain::errors::GatewayResult;

use crate::application::indicator_engine::{IndicatorEngine, IndicatorKind, IndicatorRequest};

/// ATR(14), Bollinger(20, 2) band width, ATR expressed as a percentage of
/// price, and a percentile rank of current ATR against its own trailing
/// history (volatility regime relative to recent norms).
pub fn enrich(engine: &IndicatorEngine, candles: &[Candle]) -> GatewayResult<Value> {
    let price = candles.last().map(|c| c.close_f64()).unwrap_or(0.0);

    let atr_req = vec![IndicatorRequest::new(IndicatorKind::Atr)];
    let atr_series = engine.compute_series(candles, &atr_req, None)?.series["atr"].clone();
    let atr = atr_series.last().copied().flatten();
    let atr_pct = atr.filter(|_| price != 0.0).map(|a| a / price * 100.0);

    let bb_req = vec![IndicatorRequest::new(IndicatorKind::Bollinger)];
    let bb_result = engine.compute_series(candles, &bb_req, None)?;
    let bb_upper = bb_result.series.get("bb_upper").and_then(|s| s.last().copied().flatten());
    let bb_middle = bb_result.series.get("bb_middle").and_then(|s| s.last().copied().flatten());
    let bb_lower = bb_result.series.get("bb_lower").and_then(|s| s.last().copied().flatten());
    let bandwidth = match (bb_upper, bb_lower, bb_middle) {
        (Some(u), Some(l), Some(m)) if m != 0.0 => Some((u - l) / m * 100.0),
        _ => None,
    };

    let atr_values: Vec<f64> = atr_series.iter().filter_map(|v| *v).collect();
    let percentile = percentile_rank(&atr_values);

    let volatility_regime = match percentile {
        Some(p) if p >= 80.0 => "expanding",
        Some(p) if p <= 20.0 => "contracting",
        Some(_) => "normal",
        None => "unknown",
    };

    Ok(json!({
        "atr14": atr,
        "atr_pct_of_price": atr_pct,
        "bb_upper": bb_upper,
        "bb_middle": bb_middle,
        "bb_lower": bb_lower,
        "bb_bandwidth_pct": bandwidth,
        "atr_percentile": percentile,
        "volatility_regime": volatility_regime,
    }))
}

fn percentile_rank(values: &[f64]) -> Option<f64> {
    if values.len() < 5 {
        return None;
    }
    let current = *values.last()?;
    let below = values.iter().filter(|v| **v <= current).count();
    Some(below as f64 / values.len() as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.5).sin() * 3.0;
                Candle::new(
                    "BTCUSDT",
                    i as i64,
                    rust_decimal::Decimal::try_from(close).unwrap(),
                    rust_decimal::Decimal::try_from(close + 1.5).unwrap(),
                    rust_decimal::Decimal::try_from(close - 1.5).unwrap(),
                    rust_decimal::Decimal::try_from(close).unwrap(),
                    dec!(10),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn enrich_produces_volatility_fields() {
        let engine = IndicatorEngine::new(3);
        let cs = candles(60);
        let out = enrich(&engine, &cs).unwrap();
        assert!(out["atr14"].is_number());
        assert!(out["volatility_regime"].is_string());
    }

    #[test]
    fn percentile_rank_returns_none_with_too_little_history() {
        assert_eq!(percentile_rank(&[1.0, 2.0]), None);
    }

    #[test]
    fn percentile_rank_handles_constant_series() {
        assert_eq!(percentile_rank(&[2.0, 2.0, 2.0, 2.0, 2.0]), Some(100.0));
    }
}
