mod momentum;
mod moving_averages;
mod patterns;
mod price_action;
mod volatility;
mod volume;

use serde_json::json;

use crate::domain::candle::Candle;
use crate::domain::context::{ContextDepth, EnrichedTimeframeContext};
use crate::domain::errors::GatewayResult;
use crate::domain::market::{RegimeClassification, Timeframe};

use super::indicator_engine::IndicatorEngine;

/// RSI/MACD/ATR carried forward from a just-processed higher timeframe so
/// the next-smaller timeframe's enrichment can compare against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HigherTimeframeState {
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub atr: Option<f64>,
}

/// Fan-out to the six sub-enrichers, gated by `ContextDepth`, and
/// assembles the result into one `EnrichedTimeframeContext`. Every
/// sub-enricher is self-contained; a failure in one does not take down
/// the others, since each only ever returns `GatewayResult` for genuine
/// input-validation errors (empty candle slices), not missing series.
pub fn enrich(
    engine: &IndicatorEngine,
    candles: &[Candle],
    timeframe: Timeframe,
    regime: RegimeClassification,
    htf_state: Option<HigherTimeframeState>,
) -> GatewayResult<EnrichedTimeframeContext> {
    let depth = ContextDepth::for_timeframe(timeframe);

    let moving_averages = Some(moving_averages::enrich(engine, candles)?);
    let price_action_value = price_action::enrich(candles)?;

    let (momentum, volatility, volume, micro_patterns, support_resistance) = match depth {
        ContextDepth::Light => (None, None, None, None, None),
        ContextDepth::Medium => {
            let momentum = momentum::enrich(engine, candles)?;
            let volatility = volatility::enrich(engine, candles)?;
            let volume = volume::enrich(engine, candles)?;
            (Some(momentum), Some(volatility), Some(volume), None, Some(price_action_value.clone()))
        }
        ContextDepth::Full => {
            let momentum = momentum::enrich(engine, candles)?;
            let volatility = volatility::enrich(engine, candles)?;
            let volume = volume::enrich(engine, candles)?;
            let atr = volatility.get("atr14").and_then(|v| v.as_f64());
            let pat = patterns::enrich(candles, atr)?;
            (Some(momentum), Some(volatility), Some(volume), Some(pat), Some(price_action_value.clone()))
        }
    };

    let trend_value = build_trend_summary(&regime, htf_state);
    let summary = build_summary(&regime, depth);

    Ok(EnrichedTimeframeContext {
        timeframe,
        context_depth: depth,
        regime,
        moving_averages,
        momentum,
        volatility,
        volume,
        trend: trend_value,
        price_action: price_action_value,
        support_resistance,
        micro_patterns,
        summary,
    })
}

fn build_trend_summary(regime: &RegimeClassification, htf_state: Option<HigherTimeframeState>) -> serde_json::Value {
    json!({
        "regime": regime.regime.as_str(),
        "direction": regime.direction.to_string(),
        "confidence": regime.confidence,
        "higher_timeframe_rsi": htf_state.and_then(|s| s.rsi),
        "higher_timeframe_macd_histogram": htf_state.and_then(|s| s.macd_histogram),
        "higher_timeframe_atr": htf_state.and_then(|s| s.atr),
    })
}

fn build_summary(regime: &RegimeClassification, depth: ContextDepth) -> String {
    format!(
        "{:?} regime, {} direction, confidence {:.2} ({:?} context)",
        regime.regime, regime.direction, regime.confidence, depth
    )
}
