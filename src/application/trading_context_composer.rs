use serde::Serialize;
use serde_json::Value;

use crate::domain::context::{EnrichedTimeframeContext, MultiTimeframeAlignment};
use crate::domain::market::Direction;

const TREND_ALIGNMENT_WEIGHT: f64 = 0.30;
const MOMENTUM_WEIGHT: f64 = 0.25;
const VOLUME_WEIGHT: f64 = 0.15;
const PATTERN_WEIGHT: f64 = 0.15;
const RISK_REWARD_WEIGHT: f64 = 0.15;

#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub direction: &'static str,
    pub probability: f64,
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeLevels {
    pub entry: Option<f64>,
    pub target: Option<f64>,
    pub stop_loss: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradingContext {
    pub scenarios: Vec<Scenario>,
    pub levels: TradeLevels,
    pub trade_quality_score: f64,
}

/// Pure function of an `MtfOrchestrator` alignment result plus its
/// per-timeframe enriched contexts: scenario probabilities, a target/stop
/// pair, and a single blended quality score. Holds no state and makes no
/// I/O calls.
pub fn compose(alignment: &MultiTimeframeAlignment, contexts: &[EnrichedTimeframeContext]) -> TradingContext {
    let scenarios = build_scenarios(alignment);
    let levels = build_levels(contexts);
    let trade_quality_score = quality_score(alignment, contexts, &levels);

    TradingContext {
        scenarios,
        levels,
        trade_quality_score,
    }
}

fn build_scenarios(alignment: &MultiTimeframeAlignment) -> Vec<Scenario> {
    let ws = &alignment.weighted_scores;
    let total = (ws.bullish + ws.bearish + ws.neutral).max(1e-9);

    let mut rationale_for = |direction: Direction| -> Vec<String> {
        alignment
            .signals
            .iter()
            .filter(|s| s.direction == direction)
            .map(|s| format!("{} is {} at confidence {:.2}", s.timeframe, s.direction, s.confidence))
            .collect()
    };

    vec![
        Scenario {
            direction: "bullish",
            probability: ws.bullish / total,
            rationale: rationale_for(Direction::Bullish),
        },
        Scenario {
            direction: "bearish",
            probability: ws.bearish / total,
            rationale: rationale_for(Direction::Bearish),
        },
        Scenario {
            direction: "neutral",
            probability: ws.neutral / total,
            rationale: rationale_for(Direction::Neutral),
        },
    ]
}

fn build_levels(contexts: &[EnrichedTimeframeContext]) -> TradeLevels {
    let highest_tf = contexts.iter().max_by_key(|c| c.timeframe.duration_ms());
    let entry = highest_tf.map(|c| c.regime.components.ema_short);

    let target = highest_tf
        .and_then(|c| c.support_resistance.as_ref())
        .and_then(|sr| sr.get("nearest_resistance"))
        .and_then(|v| v.as_f64())
        .or_else(|| pattern_target(contexts));

    let stop_loss = pattern_invalidation(contexts).or_else(|| highest_tf.and_then(ema26_fallback));

    TradeLevels { entry, target, stop_loss }
}

fn pattern_target(contexts: &[EnrichedTimeframeContext]) -> Option<f64> {
    contexts.iter().find_map(|c| {
        c.micro_patterns
            .as_ref()
            .and_then(|p| p.get("patterns"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|p| p.get("target_if_breaks"))
            .and_then(Value::as_f64)
    })
}

fn pattern_invalidation(contexts: &[EnrichedTimeframeContext]) -> Option<f64> {
    contexts.iter().find_map(|c| {
        c.micro_patterns
            .as_ref()
            .and_then(|p| p.get("patterns"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|p| p.get("invalidation_price"))
            .and_then(Value::as_f64)
    })
}

fn ema26_fallback(ctx: &EnrichedTimeframeContext) -> Option<f64> {
    ctx.moving_averages.as_ref().and_then(|ma| ma.get("ema26")).and_then(Value::as_f64)
}

fn quality_score(alignment: &MultiTimeframeAlignment, contexts: &[EnrichedTimeframeContext], levels: &TradeLevels) -> f64 {
    let trend_alignment = alignment.alignment_score;

    let momentum = average(contexts.iter().filter_map(|c| {
        c.momentum.as_ref().and_then(|m| m.get("rsi14")).and_then(Value::as_f64).map(|rsi| {
            1.0 - ((rsi - 50.0).abs() / 50.0)
        })
    }));

    let volume = average(contexts.iter().filter_map(|c| {
        c.volume.as_ref().and_then(|v| v.get("volume_spike")).and_then(Value::as_bool).map(|spike| if spike { 1.0 } else { 0.5 })
    }));

    let pattern = average(contexts.iter().filter_map(|c| {
        c.micro_patterns
            .as_ref()
            .and_then(|p| p.get("patterns"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|p| p.get("confidence"))
            .and_then(Value::as_f64)
    }));

    let risk_reward = match (levels.entry, levels.target, levels.stop_loss) {
        (Some(entry), Some(target), Some(stop)) if (entry - stop).abs() > 1e-9 => {
            let ratio = (target - entry).abs() / (entry - stop).abs();
            (ratio / 3.0).min(1.0)
        }
        _ => 0.5,
    };

    TREND_ALIGNMENT_WEIGHT * trend_alignment
        + MOMENTUM_WEIGHT * momentum.unwrap_or(0.5)
        + VOLUME_WEIGHT * volume.unwrap_or(0.5)
        + PATTERN_WEIGHT * pattern.unwrap_or(0.3)
        + RISK_REWARD_WEIGHT * risk_reward
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let vals: Vec<f64> = values.collect();
    if vals.is_empty() {
        None
    } else {
        Some(vals.iter().sum::<f64>() / vals.len() as f64)
    }
}
