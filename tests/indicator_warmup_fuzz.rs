use midas_gateway::application::indicator_engine::{warmup_bars, IndicatorEngine, IndicatorKind, IndicatorRequest};
use midas_gateway::domain::candle::Candle;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;

fn candle(ts: i64, close: f64) -> Candle {
    Candle::new(
        "BTCUSDT",
        ts,
        Decimal::try_from(close - 0.5).unwrap(),
        Decimal::try_from(close + 1.0).unwrap(),
        Decimal::try_from(close - 1.0).unwrap(),
        Decimal::try_from(close).unwrap(),
        Decimal::from(10),
    )
    .unwrap()
}

fn kind_from_tag(tag: u8) -> IndicatorKind {
    match tag % 9 {
        0 => IndicatorKind::Sma,
        1 => IndicatorKind::Ema,
        2 => IndicatorKind::Rsi,
        3 => IndicatorKind::Atr,
        4 => IndicatorKind::Stochastic,
        5 => IndicatorKind::Roc,
        6 => IndicatorKind::EfficiencyRatio,
        7 => IndicatorKind::Adx,
        _ => IndicatorKind::Vwap,
    }
}

proptest! {
    #[test]
    fn no_non_null_output_before_warmup(
        kind_tag in 0u8..9,
        period in 2usize..50,
        n in 60usize..150,
    ) {
        let kind = kind_from_tag(kind_tag);
        let request = IndicatorRequest::with(kind, HashMap::from([("period".to_string(), period as f64)]));
        let warmup = warmup_bars(&request);

        let candles: Vec<Candle> = (0..n as i64).map(|i| candle(i, 100.0 + i as f64 * 0.1)).collect();
        let engine = IndicatorEngine::new(4);
        let result = engine.compute_series(&candles, &[request], None).unwrap();

        for series in result.series.values() {
            for (i, value) in series.iter().enumerate() {
                if i + 1 < warmup {
                    prop_assert!(value.is_none(), "expected None before warmup at index {}", i);
                }
            }
        }
    }
}
