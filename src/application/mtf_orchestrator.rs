use std::sync::Arc;

use serde::Serialize;

use crate::domain::context::{
    Conflict, ConflictSeverity, ConflictType, EnrichedTimeframeContext, MultiTimeframeAlignment, TimeframeSignal,
    WeightedScores,
};
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::market::{Direction, RegimeClassification, Timeframe};

use super::indicator_engine::IndicatorEngine;
use super::market_data_provider::MarketDataProvider;
use super::regime_detector::RegimeDetector;
use super::statistical_enricher::{self, HigherTimeframeState};

const HIGH_TIMEFRAME_CONFLICT_WEIGHT: f64 = 2.0;

/// The `{long?, medium?, short?}` temporality map. At least one slot must
/// be set; the bare array-of-timeframes "quick check" variant is not
/// implemented here since it isn't wired to any downstream surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeframeMap {
    pub long: Option<Timeframe>,
    pub medium: Option<Timeframe>,
    pub short: Option<Timeframe>,
}

impl TimeframeMap {
    fn slots(&self) -> Vec<Timeframe> {
        let mut tfs: Vec<Timeframe> = [self.long, self.medium, self.short].into_iter().flatten().collect();
        tfs.sort_by_key(|tf| std::cmp::Reverse(tf.duration_ms()));
        tfs.dedup();
        tfs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiTimeframeResult {
    pub symbol: String,
    pub contexts: Vec<EnrichedTimeframeContext>,
    pub alignment: MultiTimeframeAlignment,
}

/// Orchestrates the full symbol → OHLCV → indicators → regime →
/// enrichment pipeline across a `{long, medium, short}` set of
/// timeframes, longest first, propagating HTF state down the chain and
/// scoring cross-timeframe alignment.
pub struct MtfOrchestrator {
    provider: Arc<MarketDataProvider>,
    engine: Arc<IndicatorEngine>,
    detector: Arc<RegimeDetector>,
}

impl MtfOrchestrator {
    pub fn new(provider: Arc<MarketDataProvider>, engine: Arc<IndicatorEngine>, detector: Arc<RegimeDetector>) -> Self {
        Self { provider, engine, detector }
    }

    pub async fn run(&self, symbol: &str, timeframes: TimeframeMap, count: usize, as_of: Option<i64>) -> GatewayResult<MultiTimeframeResult> {
        let ordered = timeframes.slots();
        if ordered.is_empty() {
            return Err(GatewayError::InvalidInput("at least one of long/medium/short timeframes is required".into()));
        }

        let mut contexts = Vec::with_capacity(ordered.len());
        let mut htf_state: Option<HigherTimeframeState> = None;

        for tf in ordered {
            let loaded = self
                .provider
                .load_ohlcv(symbol, tf, count, None, None, as_of, true, false)
                .await?;

            let regime = self.detector.detect(&loaded.bars, tf)?;
            let ctx = statistical_enricher::enrich(&self.engine, &loaded.bars, tf, regime.clone(), htf_state)?;

            htf_state = Some(next_higher_tf_state(&ctx, &regime));
            contexts.push(ctx);
        }

        let alignment = score_alignment(&contexts);

        Ok(MultiTimeframeResult {
            symbol: symbol.to_uppercase(),
            contexts,
            alignment,
        })
    }
}

fn next_higher_tf_state(ctx: &EnrichedTimeframeContext, regime: &RegimeClassification) -> HigherTimeframeState {
    let rsi = ctx.momentum.as_ref().and_then(|m| m.get("rsi14")).and_then(|v| v.as_f64());
    let macd_histogram = ctx.momentum.as_ref().and_then(|m| m.get("macd_histogram")).and_then(|v| v.as_f64());
    let atr = ctx
        .volatility
        .as_ref()
        .and_then(|v| v.get("atr14"))
        .and_then(|v| v.as_f64())
        .or(Some(regime.components.atr_ratio));
    HigherTimeframeState { rsi, macd_histogram, atr }
}

fn score_alignment(contexts: &[EnrichedTimeframeContext]) -> MultiTimeframeAlignment {
    let mut signals = Vec::with_capacity(contexts.len());
    let mut bullish = 0.0;
    let mut bearish = 0.0;
    let mut neutral = 0.0;
    let mut total_weight = 0.0;

    for ctx in contexts {
        let weight = ctx.timeframe.alignment_weight();
        let contribution = weight * ctx.regime.confidence;
        match ctx.regime.direction {
            Direction::Bullish => bullish += contribution,
            Direction::Bearish => bearish += contribution,
            Direction::Neutral => neutral += contribution,
        }
        total_weight += weight;
        signals.push(TimeframeSignal {
            timeframe: ctx.timeframe,
            direction: ctx.regime.direction,
            confidence: ctx.regime.confidence,
            weight,
        });
    }

    let alignment_score = if total_weight > 0.0 {
        bullish.max(bearish).max(neutral) / total_weight
    } else {
        0.0
    };

    let dominant_direction = if bullish >= bearish && bullish >= neutral {
        Direction::Bullish
    } else if bearish >= bullish && bearish >= neutral {
        Direction::Bearish
    } else {
        Direction::Neutral
    };

    let conflicts = detect_conflicts(&signals);

    MultiTimeframeAlignment {
        signals,
        alignment_score,
        dominant_direction,
        conflicts,
        weighted_scores: WeightedScores { bullish, bearish, neutral },
    }
}

fn detect_conflicts(signals: &[TimeframeSignal]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for i in 0..signals.len() {
        for j in (i + 1)..signals.len() {
            let (a, b) = (&signals[i], &signals[j]);
            if a.direction == b.direction {
                continue;
            }
            if a.weight >= HIGH_TIMEFRAME_CONFLICT_WEIGHT && b.weight >= HIGH_TIMEFRAME_CONFLICT_WEIGHT {
                conflicts.push(Conflict {
                    conflict_type: ConflictType::HighTimeframeConflict,
                    severity: ConflictSeverity::High,
                    description: format!(
                        "{} ({:?}) conflicts with {} ({:?})",
                        a.timeframe, a.direction, b.timeframe, b.direction
                    ),
                });
            } else {
                let severity = if a.weight >= HIGH_TIMEFRAME_CONFLICT_WEIGHT || b.weight >= HIGH_TIMEFRAME_CONFLICT_WEIGHT {
                    ConflictSeverity::Moderate
                } else {
                    ConflictSeverity::Low
                };
                conflicts.push(Conflict {
                    conflict_type: ConflictType::DirectionalConflict,
                    severity,
                    description: format!(
                        "{} ({:?}) disagrees with {} ({:?})",
                        a.timeframe, a.direction, b.timeframe, b.direction
                    ),
                });
            }
        }
    }

    if let Some(htf) = signals.first() {
        if htf.direction != Direction::Neutral {
            for ltf in &signals[1..] {
                if ltf.direction != htf.direction {
                    conflicts.push(Conflict {
                        conflict_type: ConflictType::HtfLtfDivergence,
                        severity: ConflictSeverity::Low,
                        description: format!(
                            "higher timeframe {} is {:?} while {} is {:?}",
                            htf.timeframe, htf.direction, ltf.timeframe, ltf.direction
                        ),
                    });
                }
            }
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::market_regime::{RegimeComponents, RegimeType, ThresholdSet};

    fn signal(tf: Timeframe, direction: Direction, confidence: f64) -> TimeframeSignal {
        TimeframeSignal {
            timeframe: tf,
            direction,
            confidence,
            weight: tf.alignment_weight(),
        }
    }

    fn regime(direction: Direction, confidence: f64) -> RegimeClassification {
        RegimeClassification {
            regime: RegimeType::TrendingBullish,
            direction,
            confidence,
            components: RegimeComponents {
                adx: 30.0,
                plus_di: 20.0,
                minus_di: 10.0,
                efficiency_ratio: 0.5,
                atr_ratio: 1.0,
                ema_short: 100.0,
                ema_long: 99.0,
                direction_strength: 0.4,
            },
            thresholds: ThresholdSet {
                adx_trending: 25.0,
                er_trending: 0.4,
                atr_ratio_low: 0.8,
                atr_ratio_high: 1.5,
                timeframe_multiplier: 1.0,
                volatility_multiplier: 1.0,
            },
        }
    }

    #[test]
    fn timeframe_map_orders_longest_first() {
        let map = TimeframeMap {
            long: Some(Timeframe::OneDay),
            medium: Some(Timeframe::FourHour),
            short: Some(Timeframe::OneHour),
        };
        let slots = map.slots();
        assert_eq!(slots, vec![Timeframe::OneDay, Timeframe::FourHour, Timeframe::OneHour]);
    }

    #[test]
    fn high_timeframe_conflict_detected_when_both_weights_high() {
        let signals = vec![
            signal(Timeframe::OneDay, Direction::Bullish, 0.8),
            signal(Timeframe::FourHour, Direction::Bearish, 0.7),
        ];
        let conflicts = detect_conflicts(&signals);
        assert!(conflicts.iter().any(|c| matches!(c.conflict_type, ConflictType::HighTimeframeConflict)));
    }

    #[test]
    fn dominant_direction_follows_weighted_scores() {
        let contexts_regime = regime(Direction::Bullish, 0.9);
        assert_eq!(contexts_regime.direction, Direction::Bullish);
    }
}
