use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::GatewayError;

/// One OHLCV bar. Immutable once constructed; `timestamp` is the open-time
/// of the bucket, in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, GatewayError> {
        let candle = Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// `low <= min(open,close) <= max(open,close) <= high`, volume non-negative.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);

        if self.low > body_low || body_high > self.high || self.low > self.high {
            return Err(GatewayError::InvalidOhlc {
                timestamp: self.timestamp,
                reason: format!(
                    "open={} high={} low={} close={} violates low<=min(o,c)<=max(o,c)<=high",
                    self.open, self.high, self.low, self.close
                ),
            });
        }
        if self.volume.is_sign_negative() {
            return Err(GatewayError::InvalidOhlc {
                timestamp: self.timestamp,
                reason: format!("negative volume {}", self.volume),
            });
        }
        Ok(())
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(f64::NAN)
    }

    pub fn open_f64(&self) -> f64 {
        self.open.to_f64().unwrap_or(f64::NAN)
    }

    pub fn high_f64(&self) -> f64 {
        self.high.to_f64().unwrap_or(f64::NAN)
    }

    pub fn low_f64(&self) -> f64 {
        self.low.to_f64().unwrap_or(f64::NAN)
    }

    pub fn volume_f64(&self) -> f64 {
        self.volume.to_f64().unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_candle() -> Candle {
        Candle::new("BTCUSDT", 1_000, dec!(100), dec!(110), dec!(95), dec!(105), dec!(10)).unwrap()
    }

    #[test]
    fn accepts_valid_ohlc() {
        assert!(valid_candle().validate().is_ok());
    }

    #[test]
    fn rejects_high_below_body() {
        let err = Candle::new("BTCUSDT", 1_000, dec!(100), dec!(101), dec!(95), dec!(105), dec!(10));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_low_above_body() {
        let err = Candle::new("BTCUSDT", 1_000, dec!(100), dec!(110), dec!(99), dec!(98), dec!(10));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_negative_volume() {
        let err = Candle::new("BTCUSDT", 1_000, dec!(100), dec!(110), dec!(95), dec!(105), dec!(-1));
        assert!(err.is_err());
    }

    #[test]
    fn float_accessors_round_trip() {
        let c = valid_candle();
        assert_eq!(c.close_f64(), 105.0);
        assert_eq!(c.open_f64(), 100.0);
    }
}
