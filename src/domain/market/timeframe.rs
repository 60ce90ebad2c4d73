use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::GatewayError;

/// Approximate month length used only for gap detection on the `1M`
/// bucket; the bucket itself is treated as an opaque calendar-aware
/// interval everywhere else.
const APPROX_MONTH_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// One of the timeframes the gateway understands, in ascending duration
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    SixHour,
    EightHour,
    TwelveHour,
    OneDay,
    ThreeDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    /// Duration of one bucket in milliseconds. `OneMonth` returns the
    /// approximate 30-day figure; callers needing calendar-accurate month
    /// boundaries must not rely on this for anything beyond gap estimation.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Timeframe::OneMin => 60_000,
            Timeframe::ThreeMin => 3 * 60_000,
            Timeframe::FiveMin => 5 * 60_000,
            Timeframe::FifteenMin => 15 * 60_000,
            Timeframe::ThirtyMin => 30 * 60_000,
            Timeframe::OneHour => 60 * 60_000,
            Timeframe::TwoHour => 2 * 60 * 60_000,
            Timeframe::FourHour => 4 * 60 * 60_000,
            Timeframe::SixHour => 6 * 60 * 60_000,
            Timeframe::EightHour => 8 * 60 * 60_000,
            Timeframe::TwelveHour => 12 * 60 * 60_000,
            Timeframe::OneDay => 24 * 60 * 60_000,
            Timeframe::ThreeDay => 3 * 24 * 60 * 60_000,
            Timeframe::OneWeek => 7 * 24 * 60 * 60_000,
            Timeframe::OneMonth => APPROX_MONTH_MS,
        }
    }

    pub fn to_minutes(&self) -> usize {
        (self.duration_ms() / 60_000) as usize
    }

    pub fn to_seconds(&self) -> i64 {
        self.duration_ms() / 1000
    }

    /// Upstream exchange interval string (Binance-style, matches the
    /// closed set named in the spec).
    pub fn to_exchange_string(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::ThreeMin => "3m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHour => "2h",
            Timeframe::FourHour => "4h",
            Timeframe::SixHour => "6h",
            Timeframe::EightHour => "8h",
            Timeframe::TwelveHour => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::ThreeDay => "3d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        }
    }

    /// All supported timeframes, ascending by duration.
    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::ThreeMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::TwoHour,
            Timeframe::FourHour,
            Timeframe::SixHour,
            Timeframe::EightHour,
            Timeframe::TwelveHour,
            Timeframe::OneDay,
            Timeframe::ThreeDay,
            Timeframe::OneWeek,
            Timeframe::OneMonth,
        ]
    }

    /// `true` if `timestamp_ms` aligns with the start of a bucket boundary.
    /// Day-and-above buckets align to UTC midnight; sub-day buckets align
    /// to a fixed-size divisor of the day.
    pub fn is_period_start(&self, timestamp_ms: i64) -> bool {
        let timestamp_sec = timestamp_ms / 1000;
        match self {
            Timeframe::OneDay => timestamp_sec % 86_400 == 0,
            Timeframe::ThreeDay | Timeframe::OneWeek | Timeframe::OneMonth => {
                timestamp_sec % 86_400 == 0
            }
            _ => timestamp_sec % self.to_seconds() == 0,
        }
    }

    /// Start timestamp (ms) of the bucket containing `timestamp_ms`.
    pub fn period_start(&self, timestamp_ms: i64) -> i64 {
        let timestamp_sec = timestamp_ms / 1000;
        let period_start_sec = match self {
            Timeframe::OneDay | Timeframe::ThreeDay | Timeframe::OneWeek | Timeframe::OneMonth => {
                timestamp_sec - (timestamp_sec % 86_400)
            }
            _ => timestamp_sec - (timestamp_sec % self.to_seconds()),
        };
        period_start_sec * 1000
    }

    /// 1-minute-candle count needed to produce `indicator_period` candles
    /// of this timeframe, with a 10% buffer.
    pub fn warmup_candles(&self, indicator_period: usize) -> usize {
        let required = indicator_period * self.to_minutes().max(1);
        (required as f64 * 1.1).ceil() as usize
    }

    /// Fixed-table multiplier used by the adaptive-threshold regime
    /// calculation: shorter timeframes get noisier, so thresholds widen.
    pub fn adaptive_multiplier(&self) -> f64 {
        match self {
            Timeframe::OneMin => 1.3,
            Timeframe::ThreeMin => 1.25,
            Timeframe::FiveMin => 1.2,
            Timeframe::FifteenMin => 1.15,
            Timeframe::ThirtyMin => 1.1,
            Timeframe::OneHour => 1.0,
            Timeframe::TwoHour => 0.97,
            Timeframe::FourHour => 0.93,
            Timeframe::SixHour => 0.9,
            Timeframe::EightHour => 0.88,
            Timeframe::TwelveHour => 0.86,
            Timeframe::OneDay => 0.85,
            Timeframe::ThreeDay => 0.82,
            Timeframe::OneWeek => 0.8,
            Timeframe::OneMonth => 0.78,
        }
    }

    /// Alignment-scoring weight table (§4.8): LTF-heavy at both very short
    /// and very long ends.
    pub fn alignment_weight(&self) -> f64 {
        match self {
            Timeframe::OneMin => 0.5,
            Timeframe::ThreeMin => 0.6,
            Timeframe::FiveMin => 0.7,
            Timeframe::FifteenMin => 0.9,
            Timeframe::ThirtyMin => 1.1,
            Timeframe::OneHour => 1.5,
            Timeframe::TwoHour => 1.7,
            Timeframe::FourHour => 2.0,
            Timeframe::SixHour => 2.2,
            Timeframe::EightHour => 2.4,
            Timeframe::TwelveHour => 2.7,
            Timeframe::OneDay => 3.0,
            Timeframe::ThreeDay => 2.5,
            Timeframe::OneWeek => 2.0,
            Timeframe::OneMonth => 1.5,
        }
    }
}

impl FromStr for Timeframe {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::OneMin),
            "3m" => Ok(Timeframe::ThreeMin),
            "5m" => Ok(Timeframe::FiveMin),
            "15m" => Ok(Timeframe::FifteenMin),
            "30m" => Ok(Timeframe::ThirtyMin),
            "1h" => Ok(Timeframe::OneHour),
            "2h" => Ok(Timeframe::TwoHour),
            "4h" => Ok(Timeframe::FourHour),
            "6h" => Ok(Timeframe::SixHour),
            "8h" => Ok(Timeframe::EightHour),
            "12h" => Ok(Timeframe::TwelveHour),
            "1d" => Ok(Timeframe::OneDay),
            "3d" => Ok(Timeframe::ThreeDay),
            "1w" => Ok(Timeframe::OneWeek),
            "1M" => Ok(Timeframe::OneMonth),
            other => Err(GatewayError::InvalidInput(format!(
                "unsupported timeframe '{other}'; expected one of 1m,3m,5m,15m,30m,1h,2h,4h,6h,8h,12h,1d,3d,1w,1M"
            ))),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_exchange_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_ms_covers_full_set() {
        assert_eq!(Timeframe::OneMin.duration_ms(), 60_000);
        assert_eq!(Timeframe::OneHour.duration_ms(), 3_600_000);
        assert_eq!(Timeframe::OneDay.duration_ms(), 86_400_000);
        assert_eq!(Timeframe::OneWeek.duration_ms(), 7 * 86_400_000);
    }

    #[test]
    fn from_str_round_trips_through_display() {
        for tf in Timeframe::all() {
            let s = tf.to_string();
            assert_eq!(Timeframe::from_str(&s).unwrap(), tf);
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert!(Timeframe::from_str("7m").is_err());
    }

    #[test]
    fn period_start_aligns_five_minute() {
        let tf = Timeframe::FiveMin;
        let base = 1_704_067_200_000i64; // 2024-01-01 00:00:00 UTC
        assert_eq!(tf.period_start(base), base);
        assert_eq!(tf.period_start(base + 3 * 60 * 1000), base);
        assert_eq!(tf.period_start(base + 7 * 60 * 1000), base + 5 * 60 * 1000);
    }

    #[test]
    fn warmup_candles_applies_ten_percent_buffer() {
        let tf = Timeframe::FifteenMin;
        assert_eq!(tf.warmup_candles(50), 825);
    }

    #[test]
    fn all_is_ascending_by_duration() {
        let all = Timeframe::all();
        for pair in all.windows(2) {
            assert!(pair[0].duration_ms() < pair[1].duration_ms());
        }
    }

    #[test]
    fn adaptive_multiplier_decreases_with_duration() {
        assert!(Timeframe::OneMin.adaptive_multiplier() > Timeframe::OneHour.adaptive_multiplier());
        assert!(Timeframe::OneHour.adaptive_multiplier() > Timeframe::OneDay.adaptive_multiplier());
    }
}
