use serde::{Deserialize, Serialize};
use std::fmt;

/// Regime label, one of the nine the detector can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeType {
    TrendingBullish,
    TrendingBearish,
    TrendingNeutral,
    RangeLowVol,
    RangeNormal,
    RangeHighVol,
    RangeDirectional,
    BreakoutBullish,
    BreakoutBearish,
    BreakoutNeutral,
}

impl RegimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeType::TrendingBullish => "trending_bullish",
            RegimeType::TrendingBearish => "trending_bearish",
            RegimeType::TrendingNeutral => "trending_neutral",
            RegimeType::RangeLowVol => "range_low_vol",
            RegimeType::RangeNormal => "range_normal",
            RegimeType::RangeHighVol => "range_high_vol",
            RegimeType::RangeDirectional => "range_directional",
            RegimeType::BreakoutBullish => "breakout_bullish",
            RegimeType::BreakoutBearish => "breakout_bearish",
            RegimeType::BreakoutNeutral => "breakout_neutral",
        }
    }

    pub fn is_trending(&self) -> bool {
        matches!(
            self,
            RegimeType::TrendingBullish | RegimeType::TrendingBearish | RegimeType::TrendingNeutral
        )
    }

    pub fn is_breakout(&self) -> bool {
        matches!(
            self,
            RegimeType::BreakoutBullish | RegimeType::BreakoutBearish | RegimeType::BreakoutNeutral
        )
    }
}

impl fmt::Display for RegimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw indicator readings the regime type/confidence were derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeComponents {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub efficiency_ratio: f64,
    pub atr_ratio: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub direction_strength: f64,
}

/// Adaptive threshold set, after timeframe/volatility adjustment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub adx_trending: f64,
    pub er_trending: f64,
    pub atr_ratio_low: f64,
    pub atr_ratio_high: f64,
    pub timeframe_multiplier: f64,
    pub volatility_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub regime: RegimeType,
    pub direction: Direction,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub components: RegimeComponents,
    pub thresholds: ThresholdSet,
}
