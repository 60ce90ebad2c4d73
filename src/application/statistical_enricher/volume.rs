use std::collections::HashMap;

use serde_json::{json, Value};

use crate::domain::candle::Candle;
use crate::domain::errors::GatewayResult;

use crate::application::indicator_engine::{IndicatorEngine, IndicatorKind, IndicatorRequest};

/// OBV trend, VWAP(20) and price-vs-VWAP, average volume over the
/// trailing 20 bars, and a spike flag when the latest bar's volume
/// exceeds that average by a wide margin. `null` whenever a candle's
/// volume is zero across the whole window (nothing meaningful to report).
pub fn enrich(engine: &IndicatorEngine, candles: &[Candle]) -> GatewayResult<Value> {
    let obv_req = vec![IndicatorRequest::new(IndicatorKind::Obv)];
    let obv_series = engine.compute_series(candles, &obv_req, None)?.series["obv"].clone();
    let obv = obv_series.last().copied().flatten();
    let obv_trend = obv_direction(&obv_series);

    let vwap_req = vec![IndicatorRequest::with(
        IndicatorKind::Vwap,
        HashMap::from([("period".to_string(), 20.0)]),
    )];
    let vwap_series = engine.compute_series(candles, &vwap_req, None)?.series["vwap"].clone();
    let vwap = vwap_series.last().copied().flatten();
    let price = candles.last().map(|c| c.close_f64()).unwrap_or(0.0);
    let price_vs_vwap_pct = vwap.filter(|v| *v != 0.0).map(|v| (price - v) / v * 100.0);

    let window = 20.min(candles.len());
    let recent_volumes: Vec<f64> = candles[candles.len() - window..].iter().map(|c| c.volume_f64()).collect();
    let avg_volume = if recent_volumes.is_empty() {
        None
    } else {
        Some(recent_volumes.iter().sum::<f64>() / recent_volumes.len() as f64)
    };
    let latest_volume = candles.last().map(|c| c.volume_f64());
    let spike = match (latest_volume, avg_volume) {
        (Some(v), Some(avg)) if avg > 0.0 => Some(v > avg * 2.0),
        _ => None,
    };

    Ok(json!({
        "obv": obv,
        "obv_trend": obv_trend,
        "vwap20": vwap,
        "price_vs_vwap_pct": price_vs_vwap_pct,
        "avg_volume_20": avg_volume,
        "latest_volume": latest_volume,
        "volume_spike": spike,
    }))
}

fn obv_direction(series: &[Option<f64>]) -> &'static str {
    let tail: Vec<f64> = series.iter().rev().take(10).filter_map(|v| *v).collect();
    if tail.len() < 2 {
        return "unknown";
    }
    if tail[0] > tail[tail.len() - 1] {
        "rising"
    } else if tail[0] < tail[tail.len() - 1] {
        "falling"
    } else {
        "flat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candles(n: usize, volumes: &[f64]) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1;
                Candle::new(
                    "BTCUSDT",
                    i as i64,
                    rust_decimal::Decimal::try_from(close).unwrap(),
                    rust_decimal::Decimal::try_from(close + 1.0).unwrap(),
                    rust_decimal::Decimal::try_from(close - 1.0).unwrap(),
                    rust_decimal::Decimal::try_from(close).unwrap(),
                    rust_decimal::Decimal::try_from(volumes[i % volumes.len()]).unwrap(),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn enrich_flags_volume_spike() {
        let engine = IndicatorEngine::new(3);
        let mut cs = candles(30, &[10.0]);
        let last_idx = cs.len() - 1;
        cs[last_idx] = Candle::new(
            "BTCUSDT",
            last_idx as i64,
            dec!(103),
            dec!(104),
            dec!(102),
            dec!(103),
            dec!(100),
        )
        .unwrap();
        let out = enrich(&engine, &cs).unwrap();
        assert_eq!(out["volume_spike"], json!(true));
    }

    #[test]
    fn obv_direction_reports_unknown_with_short_series() {
        assert_eq!(obv_direction(&[Some(1.0)]), "unknown");
    }
}
