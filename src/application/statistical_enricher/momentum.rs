use std::collections::HashMap;

use serde_json::{json, Value};

use crate::domain::candle::Candle;
use crate::domain::errors::GatewayResult;

use crate::application::indicator_engine::{IndicatorEngine, IndicatorKind, IndicatorRequest};

fn last_of(engine: &IndicatorEngine, candles: &[Candle], kind: IndicatorKind, config: HashMap<String, f64>, key: &str) -> GatewayResult<Option<f64>> {
    let requests = vec![IndicatorRequest::with(kind, config)];
    let result = engine.compute_series(candles, &requests, None)?;
    Ok(result.series[key].last().copied().flatten())
}

fn rsi_zone(rsi: Option<f64>) -> &'static str {
    match rsi {
        Some(v) if v >= 70.0 => "overbought",
        Some(v) if v <= 30.0 => "oversold",
        Some(_) => "neutral",
        None => "unknown",
    }
}

/// RSI(14), MACD(12,26,9), Stochastic(14), ROC(10), overbought/oversold
/// zone classification, and bullish/bearish divergence between price and
/// RSI over the trailing window.
pub fn enrich(engine: &IndicatorEngine, candles: &[Candle]) -> GatewayResult<Value> {
    let rsi_req = vec![IndicatorRequest::new(IndicatorKind::Rsi)];
    let rsi_series = engine.compute_series(candles, &rsi_req, None)?.series["rsi"].clone();
    let rsi = rsi_series.last().copied().flatten();

    let macd_req = vec![IndicatorRequest::new(IndicatorKind::Macd)];
    let macd_result = engine.compute_series(candles, &macd_req, None)?;
    let macd_line = macd_result.series.get("macd").and_then(|s| s.last().copied().flatten());
    let macd_signal = macd_result.series.get("macd_signal").and_then(|s| s.last().copied().flatten());
    let macd_histogram = macd_result.series.get("macd_histogram").and_then(|s| s.last().copied().flatten());

    let stoch = last_of(engine, candles, IndicatorKind::Stochastic, HashMap::new(), "stochastic_k")?;
    let roc = last_of(engine, candles, IndicatorKind::Roc, HashMap::new(), "roc")?;

    let divergence = detect_divergence(candles, &rsi_series);

    Ok(json!({
        "rsi14": rsi,
        "rsi_zone": rsi_zone(rsi),
        "macd": macd_line,
        "macd_signal": macd_signal,
        "macd_histogram": macd_histogram,
        "stochastic_k": stoch,
        "roc10": roc,
        "divergence": divergence,
    }))
}

/// Compares the direction of the last two swing extremes in price against
/// RSI over the same window; `null` if there isn't enough history.
fn detect_divergence(candles: &[Candle], rsi: &[Option<f64>]) -> Value {
    let window = 20.min(candles.len()).min(rsi.len());
    if window < 10 {
        return Value::Null;
    }
    let closes: Vec<f64> = candles[candles.len() - window..].iter().map(|c| c.close_f64()).collect();
    let rsi_tail: Vec<f64> = rsi[rsi.len() - window..].iter().filter_map(|v| *v).collect();
    if rsi_tail.len() < window {
        return Value::Null;
    }

    let price_max_idx = closes.iter().enumerate().max_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap().0;
    let price_min_idx = closes.iter().enumerate().min_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap().0;
    let rsi_max_idx = rsi_tail.iter().enumerate().max_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap().0;
    let rsi_min_idx = rsi_tail.iter().enumerate().min_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap().0;

    let price_rising_late = price_max_idx > window / 2;
    let rsi_rising_late = rsi_max_idx > window / 2;
    let price_falling_late = price_min_idx > window / 2;
    let rsi_falling_late = rsi_min_idx > window / 2;

    if price_rising_late && !rsi_rising_late {
        json!("bearish")
    } else if price_falling_late && !rsi_falling_late {
        json!("bullish")
    } else {
        json!("none")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1;
                Candle::new(
                    "BTCUSDT",
                    i as i64,
                    rust_decimal::Decimal::try_from(close).unwrap(),
                    rust_decimal::Decimal::try_from(close + 1.0).unwrap(),
                    rust_decimal::Decimal::try_from(close - 1.0).unwrap(),
                    rust_decimal::Decimal::try_from(close).unwrap(),
                    dec!(10),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn enrich_produces_momentum_fields() {
        let engine = IndicatorEngine::new(3);
        let cs = candles(60);
        let out = enrich(&engine, &cs).unwrap();
        assert!(out["rsi14"].is_number());
        assert!(out["rsi_zone"].is_string());
    }

    #[test]
    fn rsi_zone_classifies_overbought() {
        assert_eq!(rsi_zone(Some(75.0)), "overbought");
        assert_eq!(rsi_zone(Some(20.0)), "oversold");
        assert_eq!(rsi_zone(Some(50.0)), "neutral");
        assert_eq!(rsi_zone(None), "unknown");
    }
}
