use std::collections::HashMap;

use serde_json::{json, Value};

use crate::domain::candle::Candle;
use crate::domain::errors::GatewayResult;

use crate::application::indicator_engine::{IndicatorEngine, IndicatorKind, IndicatorRequest};

fn ema_series(engine: &IndicatorEngine, candles: &[Candle], period: usize) -> GatewayResult<Vec<Option<f64>>> {
    let requests = vec![IndicatorRequest::with(
        IndicatorKind::Ema,
        HashMap::from([("period".to_string(), period as f64)]),
    )];
    let result = engine.compute_series(candles, &requests, None)?;
    Ok(result.series["ema"].clone())
}

fn sma_series(engine: &IndicatorEngine, candles: &[Candle], period: usize) -> GatewayResult<Vec<Option<f64>>> {
    let requests = vec![IndicatorRequest::with(
        IndicatorKind::Sma,
        HashMap::from([("period".to_string(), period as f64)]),
    )];
    let result = engine.compute_series(candles, &requests, None)?;
    Ok(result.series["sma"].clone())
}

/// Bars elapsed since `fast` last crossed `slow`; `None` if no cross has
/// happened within the available history.
fn bars_since_cross(fast: &[Option<f64>], slow: &[Option<f64>]) -> (Option<usize>, Option<&'static str>) {
    let mut last_cross: Option<(usize, &'static str)> = None;
    for i in 1..fast.len() {
        if let (Some(f0), Some(s0), Some(f1), Some(s1)) = (fast[i - 1], slow[i - 1], fast[i], slow[i]) {
            if f0 <= s0 && f1 > s1 {
                last_cross = Some((i, "bullish"));
            } else if f0 >= s0 && f1 < s1 {
                last_cross = Some((i, "bearish"));
            }
        }
    }
    match last_cross {
        Some((idx, direction)) => (Some(fast.len() - 1 - idx), Some(direction)),
        None => (None, None),
    }
}

fn linear_regression_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let x_sum: f64 = (0..values.len()).map(|i| i as f64).sum();
    let y_sum: f64 = values.iter().sum();
    let xy_sum: f64 = values.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let x2_sum: f64 = (0..values.len()).map(|i| (i * i) as f64).sum();
    let denom = n * x2_sum - x_sum * x_sum;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (n * xy_sum - x_sum * y_sum) / denom
}

/// Current/historical EMA(12/26/50/200) and SMA(20/50), price-vs-MA
/// percentages, EMA crosses with bars-since-cross, per-window regression
/// slope, an alignment label, and nearest MA cluster.
pub fn enrich(engine: &IndicatorEngine, candles: &[Candle]) -> GatewayResult<Value> {
    let price = candles.last().map(|c| c.close_f64()).unwrap_or(0.0);

    let ema12 = ema_series(engine, candles, 12)?;
    let ema26 = ema_series(engine, candles, 26)?;
    let ema50 = ema_series(engine, candles, 50)?;
    let ema200 = ema_series(engine, candles, 200)?;
    let sma20 = sma_series(engine, candles, 20)?;
    let sma50 = sma_series(engine, candles, 50)?;

    let last = |s: &[Option<f64>]| s.last().copied().flatten();
    let pct_vs = |ma: Option<f64>| ma.filter(|m| *m != 0.0).map(|m| (price - m) / m * 100.0);

    let (ema12_26_bars, ema12_26_dir) = bars_since_cross(&ema12, &ema26);

    let closes: Vec<f64> = candles.iter().map(|c| c.close_f64()).collect();
    let slope_20 = linear_regression_slope(&closes[closes.len().saturating_sub(20)..]);
    let slope_50 = linear_regression_slope(&closes[closes.len().saturating_sub(50).max(0)..]);

    let (e12, e26, e50) = (last(&ema12), last(&ema26), last(&ema50));
    let alignment = match (e12, e26, e50) {
        (Some(a), Some(b), Some(c)) if price > a && a > b && b > c => "perfect_bullish",
        (Some(a), Some(b), Some(c)) if price < a && a < b && b < c => "perfect_bearish",
        _ => "mixed",
    };

    let mut clusters: Vec<(&'static str, f64)> = vec![];
    for (name, value) in [("ema12", e12), ("ema26", e26), ("ema50", last(&ema50)), ("ema200", last(&ema200)), ("sma20", last(&sma20)), ("sma50", last(&sma50))] {
        if let Some(v) = value {
            clusters.push((name, v));
        }
    }
    let nearest = clusters
        .iter()
        .min_by(|a, b| (a.1 - price).abs().partial_cmp(&(b.1 - price).abs()).unwrap())
        .map(|(name, value)| json!({"name": name, "value": value}));

    Ok(json!({
        "ema12": e12,
        "ema26": e26,
        "ema50": last(&ema50),
        "ema200": last(&ema200),
        "sma20": last(&sma20),
        "sma50": last(&sma50),
        "price_vs_ema12_pct": pct_vs(e12),
        "price_vs_ema26_pct": pct_vs(e26),
        "price_vs_ema50_pct": pct_vs(last(&ema50)),
        "price_vs_sma20_pct": pct_vs(last(&sma20)),
        "ema12_26_cross": {
            "bars_since": ema12_26_bars,
            "direction": ema12_26_dir,
        },
        "slope_20": slope_20,
        "slope_50": slope_50,
        "alignment": alignment,
        "nearest_ma_cluster": nearest,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.2;
                Candle::new(
                    "BTCUSDT",
                    i as i64,
                    Decimal::try_from(close).unwrap(),
                    Decimal::try_from(close + 0.5).unwrap(),
                    Decimal::try_from(close - 0.5).unwrap(),
                    Decimal::try_from(close).unwrap(),
                    dec!(10),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn enrich_produces_all_ma_fields() {
        let engine = IndicatorEngine::new(3);
        let cs = candles(250);
        let out = enrich(&engine, &cs).unwrap();
        assert!(out["ema12"].is_number());
        assert!(out["alignment"].is_string());
    }

    #[test]
    fn bars_since_cross_detects_bullish_cross() {
        let fast = vec![Some(1.0), Some(1.0), Some(2.0), Some(3.0)];
        let slow = vec![Some(1.5), Some(1.5), Some(1.5), Some(1.5)];
        let (bars, dir) = bars_since_cross(&fast, &slow);
        assert_eq!(dir, Some("bullish"));
        assert_eq!(bars, Some(1));
    }
}
