use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::candle::Candle;
use crate::domain::errors::GatewayResult;

/// Flag pole must rise (or fall) at least this many ATRs before the
/// consolidation leg counts as a flag.
const FLAG_POLE_ATR_MULTIPLIER: f64 = 3.0;
const FLAG_MIN_BARS: usize = 5;
const FLAG_MAX_BARS: usize = 15;
const SHOULDER_SYMMETRY_PCT: f64 = 5.0;
const DOUBLE_TOP_TOLERANCE_PCT: f64 = 2.0;
const VOLUME_SPIKE_MULTIPLIER: f64 = 1.2;
const VOLUME_SPIKE_REVERSAL_MULTIPLIER: f64 = 1.4;
/// Trendline slope below this fraction of price per bar counts as flat,
/// for telling a triangle's horizontal leg from its sloped one.
const TRENDLINE_FLAT_SLOPE_FRACTION: f64 = 0.0003;
const TRENDLINE_MIN_POINTS: usize = 3;
const TRENDLINE_MAX_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Continuation,
    Reversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Forming,
    Confirmed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub bias: &'static str,
    pub confidence: f64,
    pub invalidation_price: f64,
    pub target_if_breaks: Option<f64>,
    pub status: PatternStatus,
}

struct SwingPoint {
    index: usize,
    price: f64,
    is_high: bool,
}

fn swing_points(candles: &[Candle], atr: f64) -> Vec<SwingPoint> {
    let min_move = atr * 0.5;
    let mut points = Vec::new();
    for w in candles.windows(3).enumerate() {
        let (i, window) = w;
        let (a, b, c) = (&window[0], &window[1], &window[2]);
        if b.high_f64() > a.high_f64() && b.high_f64() > c.high_f64() && (b.high_f64() - a.low_f64().min(c.low_f64())) > min_move {
            points.push(SwingPoint { index: i + 1, price: b.high_f64(), is_high: true });
        }
        if b.low_f64() < a.low_f64() && b.low_f64() < c.low_f64() && (a.high_f64().max(c.high_f64()) - b.low_f64()) > min_move {
            points.push(SwingPoint { index: i + 1, price: b.low_f64(), is_high: false });
        }
    }
    points
}

fn volume_spike(candles: &[Candle], avg_volume: f64, reversal: bool) -> bool {
    let threshold = if reversal { VOLUME_SPIKE_REVERSAL_MULTIPLIER } else { VOLUME_SPIKE_MULTIPLIER };
    match candles.last() {
        Some(c) if avg_volume > 0.0 => c.volume_f64() >= avg_volume * threshold,
        _ => false,
    }
}

fn detect_double_top_bottom(points: &[SwingPoint], candles: &[Candle], avg_volume: f64) -> Option<Pattern> {
    let highs: Vec<&SwingPoint> = points.iter().filter(|p| p.is_high).collect();
    let lows: Vec<&SwingPoint> = points.iter().filter(|p| !p.is_high).collect();

    if highs.len() >= 2 {
        let (a, b) = (highs[highs.len() - 2], highs[highs.len() - 1]);
        if ((a.price - b.price).abs() / a.price * 100.0) <= DOUBLE_TOP_TOLERANCE_PCT {
            let neckline = candles[a.index..=b.index].iter().map(|c| c.low_f64()).fold(f64::MAX, f64::min);
            let broke = candles.last().map(|c| c.close_f64() < neckline).unwrap_or(false);
            let confidence = if broke && volume_spike(candles, avg_volume, true) { 0.85 } else if broke { 0.65 } else { 0.45 };
            return Some(Pattern {
                name: "double_top",
                kind: PatternKind::Reversal,
                bias: "bearish",
                confidence,
                invalidation_price: a.price.max(b.price),
                target_if_breaks: Some(neckline - (a.price - neckline)),
                status: if broke { PatternStatus::Confirmed } else { PatternStatus::Forming },
            });
        }
    }

    if lows.len() >= 2 {
        let (a, b) = (lows[lows.len() - 2], lows[lows.len() - 1]);
        if ((a.price - b.price).abs() / a.price * 100.0) <= DOUBLE_TOP_TOLERANCE_PCT {
            let neckline = candles[a.index..=b.index].iter().map(|c| c.high_f64()).fold(f64::MIN, f64::max);
            let broke = candles.last().map(|c| c.close_f64() > neckline).unwrap_or(false);
            let confidence = if broke && volume_spike(candles, avg_volume, true) { 0.85 } else if broke { 0.65 } else { 0.45 };
            return Some(Pattern {
                name: "double_bottom",
                kind: PatternKind::Reversal,
                bias: "bullish",
                confidence,
                invalidation_price: a.price.min(b.price),
                target_if_breaks: Some(neckline + (neckline - a.price)),
                status: if broke { PatternStatus::Confirmed } else { PatternStatus::Forming },
            });
        }
    }

    None
}

fn detect_head_and_shoulders(points: &[SwingPoint]) -> Option<Pattern> {
    let highs: Vec<&SwingPoint> = points.iter().filter(|p| p.is_high).collect();
    if highs.len() < 3 {
        return None;
    }
    let (left, head, right) = (highs[highs.len() - 3], highs[highs.len() - 2], highs[highs.len() - 1]);
    if head.price <= left.price || head.price <= right.price {
        return None;
    }
    let shoulder_diff = (left.price - right.price).abs() / left.price * 100.0;
    if shoulder_diff > SHOULDER_SYMMETRY_PCT {
        return None;
    }
    let neckline = left.price.min(right.price);
    Some(Pattern {
        name: "head_and_shoulders",
        kind: PatternKind::Reversal,
        bias: "bearish",
        confidence: 0.6,
        invalidation_price: head.price,
        target_if_breaks: Some(neckline - (head.price - neckline)),
        status: PatternStatus::Forming,
    })
}

/// Least-squares fit of `(index, price)` pairs, most recent swing points
/// of one side (all highs, or all lows) last.
fn fit_trendline(points: &[&SwingPoint]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    if n < TRENDLINE_MIN_POINTS as f64 {
        return None;
    }
    let sum_x: f64 = points.iter().map(|p| p.index as f64).sum();
    let sum_y: f64 = points.iter().map(|p| p.price).sum();
    let sum_xy: f64 = points.iter().map(|p| p.index as f64 * p.price).sum();
    let sum_xx: f64 = points.iter().map(|p| (p.index as f64).powi(2)).sum();
    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < 1e-9 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((slope, intercept))
}

fn trendline_at(line: (f64, f64), x: f64) -> f64 {
    line.0 * x + line.1
}

fn detect_triangle(points: &[SwingPoint], candles: &[Candle], avg_volume: f64) -> Option<Pattern> {
    let highs: Vec<&SwingPoint> = points.iter().filter(|p| p.is_high).rev().take(TRENDLINE_MAX_POINTS).collect();
    let lows: Vec<&SwingPoint> = points.iter().filter(|p| !p.is_high).rev().take(TRENDLINE_MAX_POINTS).collect();
    let high_line = fit_trendline(&highs)?;
    let low_line = fit_trendline(&lows)?;

    let last_idx = (candles.len() - 1) as f64;
    let price = candles.last()?.close_f64();
    let flat = price * TRENDLINE_FLAT_SLOPE_FRACTION;

    let high_flat = high_line.0.abs() < flat;
    let low_flat = low_line.0.abs() < flat;
    let high_falling = high_line.0 < -flat;
    let low_rising = low_line.0 > flat;

    let (name, bias) = if high_flat && low_rising {
        ("ascending_triangle", "bullish")
    } else if low_flat && high_falling {
        ("descending_triangle", "bearish")
    } else if high_falling && low_rising {
        ("symmetrical_triangle", "neutral")
    } else {
        return None;
    };

    let high_now = trendline_at(high_line, last_idx);
    let low_now = trendline_at(low_line, last_idx);
    if high_now <= low_now || low_line.0 - high_line.0 <= 0.0 {
        return None;
    }

    let height = high_now - low_now;
    let close = candles.last()?.close_f64();
    let broke_up = close > high_now;
    let broke_down = close < low_now;
    let broke = broke_up || broke_down;
    let confidence = if broke && volume_spike(candles, avg_volume, false) { 0.8 } else if broke { 0.6 } else { 0.4 };

    let (bias, invalidation_price, target_if_breaks) = if bias == "neutral" {
        if broke_up {
            ("bullish", low_now, Some(high_now + height))
        } else if broke_down {
            ("bearish", high_now, Some(low_now - height))
        } else {
            ("neutral", low_now, None)
        }
    } else if bias == "bullish" {
        ("bullish", low_now, Some(high_now + height))
    } else {
        ("bearish", high_now, Some(low_now - height))
    };

    Some(Pattern {
        name,
        kind: PatternKind::Continuation,
        bias,
        confidence,
        invalidation_price,
        target_if_breaks,
        status: if broke { PatternStatus::Confirmed } else { PatternStatus::Forming },
    })
}

fn detect_wedge(points: &[SwingPoint], candles: &[Candle], avg_volume: f64) -> Option<Pattern> {
    let highs: Vec<&SwingPoint> = points.iter().filter(|p| p.is_high).rev().take(TRENDLINE_MAX_POINTS).collect();
    let lows: Vec<&SwingPoint> = points.iter().filter(|p| !p.is_high).rev().take(TRENDLINE_MAX_POINTS).collect();
    let high_line = fit_trendline(&highs)?;
    let low_line = fit_trendline(&lows)?;

    let last_idx = (candles.len() - 1) as f64;
    let price = candles.last()?.close_f64();
    let flat = price * TRENDLINE_FLAT_SLOPE_FRACTION;

    let rising = high_line.0 > flat && low_line.0 > flat && low_line.0 > high_line.0;
    let falling = high_line.0 < -flat && low_line.0 < -flat && high_line.0 < low_line.0;
    if !rising && !falling {
        return None;
    }

    let high_now = trendline_at(high_line, last_idx);
    let low_now = trendline_at(low_line, last_idx);
    if high_now <= low_now {
        return None;
    }
    let height = high_now - low_now;

    let close = candles.last()?.close_f64();
    let (name, bias, invalidation_price, target_if_breaks, broke) = if rising {
        let broke = close < low_now;
        ("rising_wedge", "bearish", high_now, Some(low_now - height), broke)
    } else {
        let broke = close > high_now;
        ("falling_wedge", "bullish", low_now, Some(high_now + height), broke)
    };

    let confidence = if broke && volume_spike(candles, avg_volume, true) { 0.8 } else if broke { 0.6 } else { 0.4 };

    Some(Pattern {
        name,
        kind: PatternKind::Reversal,
        bias,
        confidence,
        invalidation_price,
        target_if_breaks,
        status: if broke { PatternStatus::Confirmed } else { PatternStatus::Forming },
    })
}

fn detect_flag(candles: &[Candle], atr: f64, avg_volume: f64) -> Option<Pattern> {
    if candles.len() < FLAG_MAX_BARS + 5 || atr <= 0.0 {
        return None;
    }
    let pole_window = &candles[candles.len() - FLAG_MAX_BARS - 5..candles.len() - FLAG_MAX_BARS];
    let pole_start = pole_window.first()?.close_f64();
    let pole_end = pole_window.last()?.close_f64();
    let pole_move = pole_end - pole_start;
    if pole_move.abs() < atr * FLAG_POLE_ATR_MULTIPLIER {
        return None;
    }

    let flag_leg = &candles[candles.len() - FLAG_MAX_BARS..];
    if flag_leg.len() < FLAG_MIN_BARS {
        return None;
    }
    let flag_high = flag_leg.iter().map(|c| c.high_f64()).fold(f64::MIN, f64::max);
    let flag_low = flag_leg.iter().map(|c| c.low_f64()).fold(f64::MAX, f64::min);
    let bullish = pole_move > 0.0;
    let broke = candles.last().map(|c| if bullish { c.close_f64() > flag_high } else { c.close_f64() < flag_low }).unwrap_or(false);
    let confidence = if broke && volume_spike(candles, avg_volume, false) { 0.8 } else if broke { 0.6 } else { 0.4 };

    Some(Pattern {
        name: "flag",
        kind: PatternKind::Continuation,
        bias: if bullish { "bullish" } else { "bearish" },
        confidence,
        invalidation_price: if bullish { flag_low } else { flag_high },
        target_if_breaks: Some(if bullish { flag_high + pole_move.abs() } else { flag_low - pole_move.abs() }),
        status: if broke { PatternStatus::Confirmed } else { PatternStatus::Forming },
    })
}

/// Swing-based pattern detection over the trailing window: flag,
/// triangle (ascending/descending/symmetrical), wedge (rising/falling),
/// double top/bottom, head-and-shoulders. Filtered by an ATR multiple to
/// reject noise; volume spikes and ATR-buffered breaks raise confidence
/// and move `status` from `forming` to `confirmed`.
pub fn enrich(candles: &[Candle], atr: Option<f64>) -> GatewayResult<Value> {
    let window = 60.min(candles.len());
    if window < 20 {
        return Ok(json!({ "patterns": [] }));
    }
    let recent = &candles[candles.len() - window..];
    let atr = atr.unwrap_or_else(|| average_true_range_fallback(recent));
    let avg_volume = recent.iter().map(|c| c.volume_f64()).sum::<f64>() / recent.len() as f64;
    let points = swing_points(recent, atr);

    let mut patterns = Vec::new();
    if let Some(p) = detect_double_top_bottom(&points, recent, avg_volume) {
        patterns.push(p);
    }
    if let Some(p) = detect_head_and_shoulders(&points) {
        patterns.push(p);
    }
    if let Some(p) = detect_flag(recent, atr, avg_volume) {
        patterns.push(p);
    }
    if let Some(p) = detect_triangle(&points, recent, avg_volume) {
        patterns.push(p);
    }
    if let Some(p) = detect_wedge(&points, recent, avg_volume) {
        patterns.push(p);
    }

    Ok(json!({ "patterns": patterns }))
}

fn average_true_range_fallback(candles: &[Candle]) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }
    let sum: f64 = candles
        .windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            (cur.high_f64() - cur.low_f64())
                .max((cur.high_f64() - prev.close_f64()).abs())
                .max((cur.low_f64() - prev.close_f64()).abs())
        })
        .sum();
    sum / (candles.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: f64, volume: f64) -> Candle {
        Candle::new(
            "BTCUSDT",
            ts,
            rust_decimal::Decimal::try_from(close - 0.2).unwrap(),
            rust_decimal::Decimal::try_from(close + 0.5).unwrap(),
            rust_decimal::Decimal::try_from(close - 0.5).unwrap(),
            rust_decimal::Decimal::try_from(close).unwrap(),
            rust_decimal::Decimal::try_from(volume).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn enrich_returns_empty_list_with_insufficient_history() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, 100.0, 10.0)).collect();
        let out = enrich(&candles, None).unwrap();
        assert_eq!(out["patterns"], json!([]));
    }

    #[test]
    fn detect_flag_requires_strong_pole_move() {
        let candles: Vec<Candle> = (0..30).map(|i| candle(i, 100.0, 10.0)).collect();
        assert!(detect_flag(&candles, 1.0, 10.0).is_none());
    }

    #[test]
    fn volume_spike_detects_elevated_volume() {
        let candles = vec![candle(0, 100.0, 50.0)];
        assert!(volume_spike(&candles, 20.0, false));
        assert!(!volume_spike(&candles, 20.0, true));
    }

    #[test]
    fn fit_trendline_recovers_exact_linear_series() {
        let pts = vec![
            SwingPoint { index: 5, price: 100.25, is_high: true },
            SwingPoint { index: 15, price: 100.75, is_high: true },
            SwingPoint { index: 25, price: 101.25, is_high: true },
        ];
        let refs: Vec<&SwingPoint> = pts.iter().collect();
        let (slope, intercept) = fit_trendline(&refs).unwrap();
        assert!((slope - 0.05).abs() < 1e-9);
        assert!((intercept - 100.0).abs() < 1e-6);
    }

    #[test]
    fn detect_triangle_identifies_ascending_triangle() {
        let mut candles: Vec<Candle> = (0..60).map(|i| candle(i, 100.0, 10.0)).collect();
        *candles.last_mut().unwrap() = candle(59, 112.0, 10.0);

        let points = vec![
            SwingPoint { index: 5, price: 110.0, is_high: true },
            SwingPoint { index: 15, price: 110.0, is_high: true },
            SwingPoint { index: 25, price: 110.0, is_high: true },
            SwingPoint { index: 35, price: 110.0, is_high: true },
            SwingPoint { index: 45, price: 110.0, is_high: true },
            SwingPoint { index: 10, price: 97.0, is_high: false },
            SwingPoint { index: 20, price: 99.0, is_high: false },
            SwingPoint { index: 30, price: 101.0, is_high: false },
            SwingPoint { index: 40, price: 103.0, is_high: false },
            SwingPoint { index: 50, price: 105.0, is_high: false },
        ];

        let pattern = detect_triangle(&points, &candles, 10.0).unwrap();
        assert_eq!(pattern.name, "ascending_triangle");
        assert_eq!(pattern.bias, "bullish");
        assert_eq!(pattern.status, PatternStatus::Confirmed);
    }

    #[test]
    fn detect_wedge_identifies_rising_wedge() {
        let mut candles: Vec<Candle> = (0..60).map(|i| candle(i, 100.0, 10.0)).collect();
        *candles.last_mut().unwrap() = candle(59, 95.0, 10.0);

        let points = vec![
            SwingPoint { index: 5, price: 100.25, is_high: true },
            SwingPoint { index: 15, price: 100.75, is_high: true },
            SwingPoint { index: 25, price: 101.25, is_high: true },
            SwingPoint { index: 35, price: 101.75, is_high: true },
            SwingPoint { index: 45, price: 102.25, is_high: true },
            SwingPoint { index: 10, price: 91.5, is_high: false },
            SwingPoint { index: 20, price: 93.0, is_high: false },
            SwingPoint { index: 30, price: 94.5, is_high: false },
            SwingPoint { index: 40, price: 96.0, is_high: false },
            SwingPoint { index: 50, price: 97.5, is_high: false },
        ];

        let pattern = detect_wedge(&points, &candles, 10.0).unwrap();
        assert_eq!(pattern.name, "rising_wedge");
        assert_eq!(pattern.bias, "bearish");
        assert_eq!(pattern.status, PatternStatus::Confirmed);
    }
}
