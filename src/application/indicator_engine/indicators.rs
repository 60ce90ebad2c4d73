use std::collections::HashMap;

use ta::indicators::{
    AverageTrueRange, BollingerBands, EfficiencyRatio, ExponentialMovingAverage, FastStochastic,
    MovingAverageConvergenceDivergence, OnBalanceVolume, RateOfChange, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::{DataItem, Next};

use crate::domain::candle::Candle;

/// What fields of a candle feed a given indicator's `update` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Close,
    HighLow,
    HighLowClose,
    Ohlc,
    CloseVolume,
}

/// A single streaming calculator over one or more named output
/// sub-series. `update` always succeeds; a calculator unable to produce
/// a value yet (warm-up) returns `None` for every key, never an error,
/// so the engine can keep feeding the stream without special-casing.
pub trait StreamingIndicator: Send {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>>;
    fn output_keys(&self) -> &'static [&'static str];
    fn input_kind(&self) -> InputKind;
}

fn data_item(candle: &Candle) -> Option<DataItem> {
    DataItem::builder()
        .high(candle.high_f64())
        .low(candle.low_f64())
        .close(candle.close_f64())
        .open(candle.open_f64())
        .volume(candle.volume_f64())
        .build()
        .ok()
}

pub struct SmaIndicator {
    inner: SimpleMovingAverage,
    seen: usize,
    period: usize,
}
impl SmaIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            inner: SimpleMovingAverage::new(period).expect("sma period must be >= 1"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for SmaIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let v = self.inner.next(candle.close_f64());
        let value = if self.seen >= self.period { Some(v) } else { None };
        HashMap::from([("sma", value)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["sma"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::Close
    }
}

pub struct EmaIndicator {
    inner: ExponentialMovingAverage,
    seen: usize,
    period: usize,
}
impl EmaIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            inner: ExponentialMovingAverage::new(period).expect("ema period must be >= 1"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for EmaIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let v = self.inner.next(candle.close_f64());
        let value = if self.seen >= self.period { Some(v) } else { None };
        HashMap::from([("ema", value)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["ema"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::Close
    }
}

pub struct RsiIndicator {
    inner: RelativeStrengthIndex,
    seen: usize,
    period: usize,
}
impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            inner: RelativeStrengthIndex::new(period).expect("rsi period must be >= 1"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for RsiIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let v = self.inner.next(candle.close_f64());
        let value = if self.seen > self.period { Some(v) } else { None };
        HashMap::from([("rsi", value)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["rsi"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::Close
    }
}

pub struct MacdIndicator {
    inner: MovingAverageConvergenceDivergence,
    seen: usize,
    warmup: usize,
}
impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            inner: MovingAverageConvergenceDivergence::new(fast, slow, signal)
                .expect("macd periods must be valid"),
            seen: 0,
            warmup: slow + signal,
        }
    }
}
impl StreamingIndicator for MacdIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let out = self.inner.next(candle.close_f64());
        if self.seen > self.warmup {
            HashMap::from([
                ("macd", Some(out.macd)),
                ("macd_signal", Some(out.signal)),
                ("macd_histogram", Some(out.histogram)),
            ])
        } else {
            HashMap::from([("macd", None), ("macd_signal", None), ("macd_histogram", None)])
        }
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["macd", "macd_signal", "macd_histogram"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::Close
    }
}

pub struct BollingerIndicator {
    inner: BollingerBands,
    seen: usize,
    period: usize,
}
impl BollingerIndicator {
    pub fn new(period: usize, std_dev: f64) -> Self {
        Self {
            inner: BollingerBands::new(period, std_dev).expect("bollinger params must be valid"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for BollingerIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let out = self.inner.next(candle.close_f64());
        if self.seen >= self.period {
            HashMap::from([
                ("bb_upper", Some(out.upper)),
                ("bb_middle", Some(out.average)),
                ("bb_lower", Some(out.lower)),
            ])
        } else {
            HashMap::from([("bb_upper", None), ("bb_middle", None), ("bb_lower", None)])
        }
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["bb_upper", "bb_middle", "bb_lower"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::Close
    }
}

pub struct AtrIndicator {
    inner: AverageTrueRange,
    seen: usize,
    period: usize,
}
impl AtrIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            inner: AverageTrueRange::new(period).expect("atr period must be >= 1"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for AtrIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let value = match data_item(candle) {
            Some(item) => self.inner.next(&item),
            None => return HashMap::from([("atr", None)]),
        };
        let out = if self.seen >= self.period { Some(value) } else { None };
        HashMap::from([("atr", out)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["atr"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::HighLowClose
    }
}

pub struct StochasticIndicator {
    inner: FastStochastic,
    seen: usize,
    period: usize,
}
impl StochasticIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            inner: FastStochastic::new(period).expect("stochastic period must be >= 1"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for StochasticIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let value = match data_item(candle) {
            Some(item) => self.inner.next(&item),
            None => return HashMap::from([("stochastic_k", None)]),
        };
        let out = if self.seen >= self.period { Some(value) } else { None };
        HashMap::from([("stochastic_k", out)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["stochastic_k"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::HighLowClose
    }
}

pub struct RocIndicator {
    inner: RateOfChange,
    seen: usize,
    period: usize,
}
impl RocIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            inner: RateOfChange::new(period).expect("roc period must be >= 1"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for RocIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let v = self.inner.next(candle.close_f64());
        let out = if self.seen > self.period { Some(v) } else { None };
        HashMap::from([("roc", out)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["roc"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::Close
    }
}

pub struct ObvIndicator(OnBalanceVolume);
impl ObvIndicator {
    pub fn new() -> Self {
        Self(OnBalanceVolume::new())
    }
}
impl StreamingIndicator for ObvIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        let value = match data_item(candle) {
            Some(item) => self.0.next(&item),
            None => return HashMap::from([("obv", None)]),
        };
        HashMap::from([("obv", Some(value))])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["obv"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::CloseVolume
    }
}

pub struct EfficiencyRatioIndicator {
    inner: EfficiencyRatio,
    seen: usize,
    period: usize,
}
impl EfficiencyRatioIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            inner: EfficiencyRatio::new(period).expect("efficiency ratio period must be >= 1"),
            seen: 0,
            period,
        }
    }
}
impl StreamingIndicator for EfficiencyRatioIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let v = self.inner.next(candle.close_f64());
        let out = if self.seen > self.period { Some(v) } else { None };
        HashMap::from([("efficiency_ratio", out)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["efficiency_ratio"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::Close
    }
}

/// Wilder-smoothed ADX with +DI/-DI. Not present in the `ta` crate;
/// hand-rolled in the same `Next`-style stateful-struct idiom the crate's
/// own indicators use.
pub struct AdxIndicator {
    period: usize,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    prev_close: Option<f64>,
    smoothed_tr: f64,
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,
    dx_values: Vec<f64>,
    adx: Option<f64>,
    seen: usize,
}
impl AdxIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_high: None,
            prev_low: None,
            prev_close: None,
            smoothed_tr: 0.0,
            smoothed_plus_dm: 0.0,
            smoothed_minus_dm: 0.0,
            dx_values: Vec::new(),
            adx: None,
            seen: 0,
        }
    }
}
impl StreamingIndicator for AdxIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        self.seen += 1;
        let (high, low, close) = (candle.high_f64(), candle.low_f64(), candle.close_f64());

        let (Some(prev_high), Some(prev_low), Some(prev_close)) =
            (self.prev_high, self.prev_low, self.prev_close)
        else {
            self.prev_high = Some(high);
            self.prev_low = Some(low);
            self.prev_close = Some(close);
            return HashMap::from([("adx", None), ("plus_di", None), ("minus_di", None)]);
        };

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        let minus_dm = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
        let tr = (high - low).max((high - prev_close).abs()).max((low - prev_close).abs());

        let n = self.period as f64;
        if self.seen <= self.period {
            self.smoothed_tr += tr;
            self.smoothed_plus_dm += plus_dm;
            self.smoothed_minus_dm += minus_dm;
        } else {
            self.smoothed_tr = self.smoothed_tr - (self.smoothed_tr / n) + tr;
            self.smoothed_plus_dm = self.smoothed_plus_dm - (self.smoothed_plus_dm / n) + plus_dm;
            self.smoothed_minus_dm = self.smoothed_minus_dm - (self.smoothed_minus_dm / n) + minus_dm;
        }

        self.prev_high = Some(high);
        self.prev_low = Some(low);
        self.prev_close = Some(close);

        if self.seen <= self.period {
            return HashMap::from([("adx", None), ("plus_di", None), ("minus_di", None)]);
        }

        let plus_di = 100.0 * (self.smoothed_plus_dm / self.smoothed_tr.max(1e-12));
        let minus_di = 100.0 * (self.smoothed_minus_dm / self.smoothed_tr.max(1e-12));
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 { 100.0 * (plus_di - minus_di).abs() / di_sum } else { 0.0 };

        self.dx_values.push(dx);
        if self.dx_values.len() > self.period {
            self.dx_values.remove(0);
        }

        let adx = if self.dx_values.len() >= self.period {
            match self.adx {
                None => Some(self.dx_values.iter().sum::<f64>() / self.dx_values.len() as f64),
                Some(prev_adx) => Some((prev_adx * (n - 1.0) + dx) / n),
            }
        } else {
            None
        };
        self.adx = adx;

        HashMap::from([("adx", adx), ("plus_di", Some(plus_di)), ("minus_di", Some(minus_di))])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["adx", "plus_di", "minus_di"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::HighLowClose
    }
}

/// Rolling VWAP over `period` bars. Not present in the `ta` crate;
/// hand-rolled, same idiom as `AdxIndicator`.
pub struct VwapIndicator {
    period: usize,
    typical_prices: Vec<f64>,
    volumes: Vec<f64>,
}
impl VwapIndicator {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            typical_prices: Vec::with_capacity(period),
            volumes: Vec::with_capacity(period),
        }
    }
}
impl StreamingIndicator for VwapIndicator {
    fn update(&mut self, candle: &Candle) -> HashMap<&'static str, Option<f64>> {
        let typical = (candle.high_f64() + candle.low_f64() + candle.close_f64()) / 3.0;
        self.typical_prices.push(typical);
        self.volumes.push(candle.volume_f64());
        if self.typical_prices.len() > self.period {
            self.typical_prices.remove(0);
            self.volumes.remove(0);
        }

        let volume_sum: f64 = self.volumes.iter().sum();
        let value = if volume_sum > 0.0 && self.typical_prices.len() >= self.period {
            let weighted_sum: f64 = self
                .typical_prices
                .iter()
                .zip(self.volumes.iter())
                .map(|(p, v)| p * v)
                .sum();
            Some(weighted_sum / volume_sum)
        } else {
            None
        };
        HashMap::from([("vwap", value)])
    }
    fn output_keys(&self) -> &'static [&'static str] {
        &["vwap"]
    }
    fn input_kind(&self) -> InputKind {
        InputKind::CloseVolume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle::new(
            "BTCUSDT",
            ts,
            rust_decimal::Decimal::try_from(close).unwrap(),
            rust_decimal::Decimal::try_from(close + 1.0).unwrap(),
            rust_decimal::Decimal::try_from(close - 1.0).unwrap(),
            rust_decimal::Decimal::try_from(close).unwrap(),
            dec!(10),
        )
        .unwrap()
    }

    #[test]
    fn sma_is_none_until_period_elapsed() {
        let mut sma = SmaIndicator::new(3);
        assert!(sma.update(&candle(0, 100.0))["sma"].is_none());
        assert!(sma.update(&candle(1, 100.0))["sma"].is_none());
        assert!(sma.update(&candle(2, 100.0))["sma"].is_some());
    }

    #[test]
    fn adx_is_none_until_period_elapsed() {
        let mut adx = AdxIndicator::new(14);
        let mut last = None;
        for i in 0..20 {
            let out = adx.update(&candle(i, 100.0 + i as f64));
            last = out["adx"];
        }
        assert!(last.is_some());
    }

    #[test]
    fn adx_stays_none_for_first_bar() {
        let mut adx = AdxIndicator::new(14);
        let out = adx.update(&candle(0, 100.0));
        assert_eq!(out["adx"], None);
    }

    #[test]
    fn vwap_requires_full_period_before_emitting() {
        let mut vwap = VwapIndicator::new(5);
        for i in 0..4 {
            let out = vwap.update(&candle(i, 100.0));
            assert_eq!(out["vwap"], None);
        }
        let out = vwap.update(&candle(4, 100.0));
        assert!(out["vwap"].is_some());
    }
}
