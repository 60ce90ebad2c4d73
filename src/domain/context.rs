use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::market::{Direction, RegimeClassification, Timeframe};

/// Determines which enrichment sections a timeframe gets: light timeframes
/// (day and above) skip momentum/volatility/volume/patterns entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextDepth {
    Light,
    Medium,
    Full,
}

impl ContextDepth {
    pub fn for_timeframe(tf: Timeframe) -> Self {
        let day_ms = Timeframe::OneDay.duration_ms();
        let four_hour_ms = Timeframe::FourHour.duration_ms();
        if tf.duration_ms() >= day_ms {
            ContextDepth::Light
        } else if tf.duration_ms() >= four_hour_ms {
            ContextDepth::Medium
        } else {
            ContextDepth::Full
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTimeframeContext {
    pub timeframe: Timeframe,
    pub context_depth: ContextDepth,
    pub regime: RegimeClassification,
    pub moving_averages: Option<Value>,
    pub momentum: Option<Value>,
    pub volatility: Option<Value>,
    pub volume: Option<Value>,
    pub trend: Value,
    pub price_action: Value,
    pub support_resistance: Option<Value>,
    pub micro_patterns: Option<Value>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictType {
    HighTimeframeConflict,
    DirectionalConflict,
    HtfLtfDivergence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictSeverity {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeSignal {
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub confidence: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedScores {
    pub bullish: f64,
    pub bearish: f64,
    pub neutral: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTimeframeAlignment {
    pub signals: Vec<TimeframeSignal>,
    pub alignment_score: f64,
    pub dominant_direction: Direction,
    pub conflicts: Vec<Conflict>,
    pub weighted_scores: WeightedScores,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_depth_boundaries() {
        assert_eq!(ContextDepth::for_timeframe(Timeframe::OneDay), ContextDepth::Light);
        assert_eq!(ContextDepth::for_timeframe(Timeframe::OneWeek), ContextDepth::Light);
        assert_eq!(ContextDepth::for_timeframe(Timeframe::FourHour), ContextDepth::Medium);
        assert_eq!(ContextDepth::for_timeframe(Timeframe::SixHour), ContextDepth::Medium);
        assert_eq!(ContextDepth::for_timeframe(Timeframe::OneHour), ContextDepth::Full);
        assert_eq!(ContextDepth::for_timeframe(Timeframe::OneMin), ContextDepth::Full);
    }
}
