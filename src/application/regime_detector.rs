use std::collections::HashMap;

use statrs::statistics::{Data, Median};

use crate::domain::candle::Candle;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::market::{Direction, RegimeClassification, RegimeComponents, RegimeType, Timeframe, ThresholdSet};

use super::indicator_engine::{IndicatorEngine, IndicatorKind, IndicatorRequest};

#[derive(Debug, Clone, Copy)]
pub struct RegimeDetectorConfig {
    pub min_bars: usize,
    pub adx_period: usize,
    pub atr_short_period: usize,
    pub atr_long_period: usize,
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub er_period: usize,
    pub volatility_window: usize,
    pub adaptive_thresholds: bool,
}

impl Default for RegimeDetectorConfig {
    fn default() -> Self {
        Self {
            min_bars: 60,
            adx_period: 14,
            atr_short_period: 7,
            atr_long_period: 21,
            ema_short_period: 12,
            ema_long_period: 26,
            er_period: 10,
            volatility_window: 20,
            adaptive_thresholds: true,
        }
    }
}

/// Derives a `RegimeClassification` from ADX/+DI/-DI, short/long ATR,
/// short/long EMA, and a smoothed Efficiency Ratio computed over the same
/// candle slice. Every input series is evaluated independently, so the
/// six underlying indicator passes run concurrently via `rayon`.
pub struct RegimeDetector {
    engine: IndicatorEngine,
    config: RegimeDetectorConfig,
}

impl RegimeDetector {
    pub fn new(precision: u32, config: RegimeDetectorConfig) -> Self {
        Self {
            engine: IndicatorEngine::new(precision),
            config,
        }
    }

    pub fn detect(&self, candles: &[Candle], timeframe: Timeframe) -> GatewayResult<RegimeClassification> {
        if candles.len() < self.config.min_bars {
            return Err(GatewayError::InsufficientData(format!(
                "regime detection needs at least {} bars, got {}",
                self.config.min_bars,
                candles.len()
            )));
        }

        let adx_req = vec![IndicatorRequest::with(
            IndicatorKind::Adx,
            HashMap::from([("period".to_string(), self.config.adx_period as f64)]),
        )];
        let atr_short_req = vec![IndicatorRequest::with(
            IndicatorKind::Atr,
            HashMap::from([("period".to_string(), self.config.atr_short_period as f64)]),
        )];
        let atr_long_req = vec![IndicatorRequest::with(
            IndicatorKind::Atr,
            HashMap::from([("period".to_string(), self.config.atr_long_period as f64)]),
        )];
        let ema_short_req = vec![IndicatorRequest::with(
            IndicatorKind::Ema,
            HashMap::from([("period".to_string(), self.config.ema_short_period as f64)]),
        )];
        let ema_long_req = vec![IndicatorRequest::with(
            IndicatorKind::Ema,
            HashMap::from([("period".to_string(), self.config.ema_long_period as f64)]),
        )];
        let er_req = vec![IndicatorRequest::with(
            IndicatorKind::EfficiencyRatio,
            HashMap::from([("period".to_string(), self.config.er_period as f64)]),
        )];

        let ((adx_series, atr_short_series), (atr_long_series, ema_short_series)) = rayon::join(
            || {
                rayon::join(
                    || self.engine.compute_series(candles, &adx_req, None),
                    || self.engine.compute_series(candles, &atr_short_req, None),
                )
            },
            || {
                rayon::join(
                    || self.engine.compute_series(candles, &atr_long_req, None),
                    || self.engine.compute_series(candles, &ema_short_req, None),
                )
            },
        );
        let (ema_long_series, er_series) = rayon::join(
            || self.engine.compute_series(candles, &ema_long_req, None),
            || self.engine.compute_series(candles, &er_req, None),
        );

        let adx_series = adx_series?;
        let atr_short_series = atr_short_series?;
        let atr_long_series = atr_long_series?;
        let ema_short_series = ema_short_series?;
        let ema_long_series = ema_long_series?;
        let er_series = er_series?;

        let adx = tail_or_insufficient(&adx_series.series, "adx")?;
        let plus_di = tail_or_insufficient(&adx_series.series, "plus_di")?;
        let minus_di = tail_or_insufficient(&adx_series.series, "minus_di")?;
        let atr_short = tail_or_insufficient(&atr_short_series.series, "atr")?;
        let atr_long = tail_or_insufficient(&atr_long_series.series, "atr")?;
        let ema_short = tail_or_insufficient(&ema_short_series.series, "ema")?;
        let ema_long = tail_or_insufficient(&ema_long_series.series, "ema")?;
        let raw_er = tail_series(&er_series.series, "efficiency_ratio");
        let er = smooth_last(&raw_er, 3).ok_or_else(|| {
            GatewayError::InsufficientData("efficiency ratio series had no valid tail for smoothing".into())
        })?;

        let atr_ratio_series: Vec<Option<f64>> = atr_short_series.series["atr"]
            .iter()
            .zip(atr_long_series.series["atr"].iter())
            .map(|(s, l)| match (s, l) {
                (Some(s), Some(l)) if *l > 0.0 => Some(s / l),
                _ => None,
            })
            .collect();
        let atr_ratio = atr_short / atr_long.max(1e-9);

        let price = candles.last().map(|c| c.close_f64()).unwrap_or(0.0);

        let thresholds = self.adaptive_thresholds(timeframe, &atr_ratio_series, atr_ratio);

        let (direction, direction_strength) =
            Self::direction_hypothesis(price, ema_short, ema_long, plus_di, minus_di, atr_long);

        let regime = Self::classify_regime(adx, er, atr_ratio, direction, &thresholds);

        let confidence = Self::confidence(regime, adx, er, atr_ratio, direction_strength, plus_di, minus_di, &thresholds);

        Ok(RegimeClassification {
            regime,
            direction,
            confidence,
            components: RegimeComponents {
                adx: round2(adx),
                plus_di: round2(plus_di),
                minus_di: round2(minus_di),
                efficiency_ratio: round4(er),
                atr_ratio: round4(atr_ratio),
                ema_short: round2(ema_short),
                ema_long: round2(ema_long),
                direction_strength: round4(direction_strength),
            },
            thresholds,
        })
    }

    fn adaptive_thresholds(&self, timeframe: Timeframe, atr_ratio_series: &[Option<f64>], current_ratio: f64) -> ThresholdSet {
        let tf_multiplier = timeframe.adaptive_multiplier();

        if !self.config.adaptive_thresholds {
            return ThresholdSet {
                adx_trending: 25.0,
                er_trending: 0.5,
                atr_ratio_low: 0.8,
                atr_ratio_high: 1.3,
                timeframe_multiplier: 1.0,
                volatility_multiplier: 1.0,
            };
        }

        let window: Vec<f64> = atr_ratio_series
            .iter()
            .rev()
            .take(self.config.volatility_window)
            .filter_map(|v| *v)
            .collect();

        let median = if window.is_empty() {
            current_ratio.max(1e-9)
        } else {
            Data::new(window).median()
        };

        let ratio = current_ratio / median.max(1e-9);
        let volatility_multiplier = (0.7 + ratio * 0.6).clamp(0.7, 1.5);
        let combined = tf_multiplier * volatility_multiplier;

        ThresholdSet {
            adx_trending: (25.0 * combined).clamp(10.0, 100.0),
            er_trending: (0.5 * tf_multiplier).clamp(0.1, 1.0),
            atr_ratio_low: (0.8 / combined.sqrt()).max(0.3),
            atr_ratio_high: (1.3 * combined.sqrt()).max(0.3),
            timeframe_multiplier: tf_multiplier,
            volatility_multiplier,
        }
    }

    fn direction_hypothesis(
        price: f64,
        ema_short: f64,
        ema_long: f64,
        plus_di: f64,
        minus_di: f64,
        atr_long: f64,
    ) -> (Direction, f64) {
        let mut direction = if price > ema_short && ema_short > ema_long {
            Direction::Bullish
        } else if price < ema_long && ema_long < ema_short {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        if direction == Direction::Bullish && plus_di < minus_di {
            direction = Direction::Neutral;
        }
        if direction == Direction::Bearish && minus_di < plus_di {
            direction = Direction::Neutral;
        }

        let strength = if atr_long > 0.0 {
            ((ema_short - ema_long) / atr_long).clamp(-2.0, 2.0)
        } else {
            0.0
        };

        (direction, strength)
    }

    fn classify_regime(adx: f64, er: f64, atr_ratio: f64, direction: Direction, thresholds: &ThresholdSet) -> RegimeType {
        if atr_ratio > thresholds.atr_ratio_high && adx >= thresholds.adx_trending {
            return match direction {
                Direction::Bullish => RegimeType::BreakoutBullish,
                Direction::Bearish => RegimeType::BreakoutBearish,
                Direction::Neutral => RegimeType::BreakoutNeutral,
            };
        }
        if adx >= thresholds.adx_trending && er >= thresholds.er_trending {
            return match direction {
                Direction::Bullish => RegimeType::TrendingBullish,
                Direction::Bearish => RegimeType::TrendingBearish,
                Direction::Neutral => RegimeType::TrendingNeutral,
            };
        }
        if adx >= thresholds.adx_trending {
            RegimeType::RangeDirectional
        } else if atr_ratio < thresholds.atr_ratio_low {
            RegimeType::RangeLowVol
        } else if atr_ratio > thresholds.atr_ratio_high {
            RegimeType::RangeHighVol
        } else {
            RegimeType::RangeNormal
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn confidence(
        regime: RegimeType,
        adx: f64,
        er: f64,
        atr_ratio: f64,
        direction_strength: f64,
        plus_di: f64,
        minus_di: f64,
        thresholds: &ThresholdSet,
    ) -> f64 {
        let clarity = if regime.is_trending() || regime.is_breakout() {
            tiered(adx, &[(thresholds.adx_trending, 0.5), (thresholds.adx_trending + 10.0, 0.75), (thresholds.adx_trending + 20.0, 0.95)])
        } else {
            tiered(
                thresholds.adx_trending - adx,
                &[(0.0, 0.5), (5.0, 0.7), (10.0, 0.9)],
            )
        };

        let er_fit = match regime {
            RegimeType::TrendingBullish | RegimeType::TrendingBearish | RegimeType::TrendingNeutral => {
                tiered(er - 0.7, &[(0.0, 0.6), (0.1, 0.8), (0.2, 0.95)])
            }
            RegimeType::BreakoutBullish | RegimeType::BreakoutBearish | RegimeType::BreakoutNeutral => {
                tiered(er - 0.4, &[(0.0, 0.6), (0.1, 0.8), (0.2, 0.9)])
            }
            _ => tiered(0.25 - er, &[(0.0, 0.55), (0.1, 0.75), (0.2, 0.9)]),
        };

        let direction_score = tiered(
            direction_strength.abs(),
            &[(0.2, 0.5), (0.6, 0.7), (1.2, 0.9)],
        );

        let coherence = coherence_score(regime, adx, er, atr_ratio, plus_di, minus_di, thresholds);

        (0.35 * clarity + 0.30 * coherence + 0.20 * direction_score + 0.15 * er_fit).clamp(0.0, 1.0)
    }
}

fn tiered(value: f64, tiers: &[(f64, f64)]) -> f64 {
    let mut result = 0.3;
    for (threshold, score) in tiers {
        if value >= *threshold {
            result = *score;
        }
    }
    result
}

fn coherence_score(
    regime: RegimeType,
    adx: f64,
    er: f64,
    atr_ratio: f64,
    plus_di: f64,
    minus_di: f64,
    thresholds: &ThresholdSet,
) -> f64 {
    let adx_high = adx >= thresholds.adx_trending;
    let er_high = er >= thresholds.er_trending;
    let er_low = er < 0.25;
    let low_vol = atr_ratio < thresholds.atr_ratio_low;
    let high_vol = atr_ratio > thresholds.atr_ratio_high;
    let bull = plus_di > minus_di;
    let bear = minus_di > plus_di;

    let predicates: Vec<bool> = match regime {
        RegimeType::TrendingBullish => vec![adx_high, er_high, bull],
        RegimeType::TrendingBearish => vec![adx_high, er_high, bear],
        RegimeType::TrendingNeutral => vec![adx_high, er_high, !bull, !bear],
        RegimeType::BreakoutBullish => vec![high_vol, adx_high, bull],
        RegimeType::BreakoutBearish => vec![high_vol, adx_high, bear],
        RegimeType::BreakoutNeutral => vec![high_vol, adx_high],
        RegimeType::RangeDirectional => vec![adx_high, !er_high],
        RegimeType::RangeLowVol => vec![low_vol, !adx_high],
        RegimeType::RangeHighVol => vec![high_vol, !adx_high],
        RegimeType::RangeNormal => vec![!low_vol, !high_vol, !adx_high, er_low || !er_high],
    };

    if predicates.is_empty() {
        return 0.5;
    }
    let matched = predicates.iter().filter(|p| **p).count();
    matched as f64 / predicates.len() as f64
}

fn tail_series(series: &HashMap<String, Vec<Option<f64>>>, key: &str) -> Vec<Option<f64>> {
    series.get(key).cloned().unwrap_or_default()
}

fn tail_or_insufficient(series: &HashMap<String, Vec<Option<f64>>>, key: &str) -> GatewayResult<f64> {
    series
        .get(key)
        .and_then(|v| v.last().copied().flatten())
        .ok_or_else(|| GatewayError::InsufficientData(format!("indicator series '{key}' had no valid tail value")))
}

/// EMA-smooth the last `period` valid values of a series and return the
/// final smoothed value.
fn smooth_last(series: &[Option<f64>], period: usize) -> Option<f64> {
    let valid: Vec<f64> = series.iter().filter_map(|v| *v).collect();
    if valid.is_empty() {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = valid[0];
    for &v in &valid[1..] {
        ema = alpha * v + (1.0 - alpha) * ema;
    }
    Some(ema)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn trending_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.3;
                Candle::new(
                    "BTCUSDT",
                    i as i64 * 60_000,
                    Decimal::try_from(close - 0.1).unwrap(),
                    Decimal::try_from(close + 0.5).unwrap(),
                    Decimal::try_from(close - 0.5).unwrap(),
                    Decimal::try_from(close).unwrap(),
                    dec!(1000),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn rejects_insufficient_bars() {
        let detector = RegimeDetector::new(3, RegimeDetectorConfig::default());
        let candles = trending_candles(10);
        assert!(detector.detect(&candles, Timeframe::OneHour).is_err());
    }

    #[test]
    fn confidence_is_within_unit_interval() {
        let detector = RegimeDetector::new(3, RegimeDetectorConfig::default());
        let candles = trending_candles(200);
        let classification = detector.detect(&candles, Timeframe::OneHour).unwrap();
        assert!(classification.confidence >= 0.0 && classification.confidence <= 1.0);
    }

    #[test]
    fn strong_uptrend_yields_bullish_direction() {
        let detector = RegimeDetector::new(3, RegimeDetectorConfig::default());
        let candles = trending_candles(200);
        let classification = detector.detect(&candles, Timeframe::OneHour).unwrap();
        assert_eq!(classification.direction, Direction::Bullish);
    }

    #[test]
    fn adaptive_thresholds_stay_in_valid_ranges() {
        let detector = RegimeDetector::new(3, RegimeDetectorConfig::default());
        let candles = trending_candles(200);
        let classification = detector.detect(&candles, Timeframe::OneHour).unwrap();
        assert!(classification.thresholds.adx_trending >= 10.0 && classification.thresholds.adx_trending <= 100.0);
        assert!(classification.thresholds.er_trending >= 0.1 && classification.thresholds.er_trending <= 1.0);
        assert!(classification.thresholds.atr_ratio_low > 0.0);
    }
}
