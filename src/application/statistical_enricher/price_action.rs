use serde_json::{json, Value};

use crate::domain::candle::Candle;
use crate::domain::errors::GatewayResult;

/// Last-candle body/wick structure, recent swing high/low, distance from
/// each, and a naive nearest support/resistance pair built from local
/// extremes over the trailing window.
pub fn enrich(candles: &[Candle]) -> GatewayResult<Value> {
    let last = match candles.last() {
        Some(c) => c,
        None => return Ok(json!({})),
    };

    let body = (last.close_f64() - last.open_f64()).abs();
    let range = (last.high_f64() - last.low_f64()).max(1e-12);
    let upper_wick = last.high_f64() - last.open_f64().max(last.close_f64());
    let lower_wick = last.open_f64().min(last.close_f64()) - last.low_f64();
    let body_pct = body / range * 100.0;
    let candle_type = classify_candle(body_pct, upper_wick, lower_wick, range);

    let window = 50.min(candles.len());
    let recent = &candles[candles.len() - window..];
    let swing_high = recent.iter().map(|c| c.high_f64()).fold(f64::MIN, f64::max);
    let swing_low = recent.iter().map(|c| c.low_f64()).fold(f64::MAX, f64::min);
    let price = last.close_f64();
    let dist_from_high_pct = if swing_high != 0.0 { (price - swing_high) / swing_high * 100.0 } else { 0.0 };
    let dist_from_low_pct = if swing_low != 0.0 { (price - swing_low) / swing_low * 100.0 } else { 0.0 };

    let (support, resistance) = nearest_levels(recent, price);

    Ok(json!({
        "candle_type": candle_type,
        "body_pct_of_range": body_pct,
        "swing_high": swing_high,
        "swing_low": swing_low,
        "dist_from_swing_high_pct": dist_from_high_pct,
        "dist_from_swing_low_pct": dist_from_low_pct,
        "nearest_support": support,
        "nearest_resistance": resistance,
    }))
}

fn classify_candle(body_pct: f64, upper_wick: f64, lower_wick: f64, range: f64) -> &'static str {
    if body_pct < 10.0 {
        return "doji";
    }
    if lower_wick > range * 0.6 && upper_wick < range * 0.15 {
        return "hammer";
    }
    if upper_wick > range * 0.6 && lower_wick < range * 0.15 {
        return "shooting_star";
    }
    if body_pct > 70.0 {
        return "marubozu";
    }
    "normal"
}

/// Local extrema (a bar whose high/low is higher/lower than both
/// neighbours) below and above the current price, closest first.
fn nearest_levels(candles: &[Candle], price: f64) -> (Option<f64>, Option<f64>) {
    if candles.len() < 3 {
        return (None, None);
    }
    let mut supports = Vec::new();
    let mut resistances = Vec::new();
    for w in candles.windows(3) {
        let (a, b, c) = (&w[0], &w[1], &w[2]);
        if b.low_f64() < a.low_f64() && b.low_f64() < c.low_f64() && b.low_f64() < price {
            supports.push(b.low_f64());
        }
        if b.high_f64() > a.high_f64() && b.high_f64() > c.high_f64() && b.high_f64() > price {
            resistances.push(b.high_f64());
        }
    }
    let support = supports.into_iter().max_by(|a, b| a.partial_cmp(b).unwrap());
    let resistance = resistances.into_iter().min_by(|a, b| a.partial_cmp(b).unwrap());
    (support, resistance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(
            "BTCUSDT",
            ts,
            rust_decimal::Decimal::try_from(open).unwrap(),
            rust_decimal::Decimal::try_from(high).unwrap(),
            rust_decimal::Decimal::try_from(low).unwrap(),
            rust_decimal::Decimal::try_from(close).unwrap(),
            dec!(10),
        )
        .unwrap()
    }

    #[test]
    fn classify_candle_detects_doji() {
        assert_eq!(classify_candle(2.0, 1.0, 1.0, 10.0), "doji");
    }

    #[test]
    fn classify_candle_detects_hammer() {
        assert_eq!(classify_candle(20.0, 0.5, 7.0, 10.0), "hammer");
    }

    #[test]
    fn enrich_returns_empty_object_for_no_candles() {
        let out = enrich(&[]).unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn nearest_levels_finds_local_extrema() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(1, 99.0, 100.0, 95.0, 99.5),
            candle(2, 99.5, 101.0, 99.0, 100.0),
            candle(3, 100.0, 103.0, 99.5, 102.0),
            candle(4, 102.0, 102.5, 100.0, 101.0),
        ];
        let (support, resistance) = nearest_levels(&candles, 100.5);
        assert!(support.is_some() || resistance.is_some());
    }
}
