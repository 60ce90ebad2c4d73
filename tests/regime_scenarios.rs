use midas_gateway::application::regime_detector::RegimeDetectorConfig;
use midas_gateway::application::RegimeDetector;
use midas_gateway::domain::candle::Candle;
use midas_gateway::domain::market::market_regime::{Direction, RegimeType};
use midas_gateway::domain::market::Timeframe;
use rust_decimal::Decimal;

fn trending_candles(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = 100.0 * (1.0 + 0.001 * i as f64);
            Candle::new(
                "BTCUSDT",
                i as i64 * Timeframe::OneHour.duration_ms(),
                Decimal::try_from(close - 0.1).unwrap(),
                Decimal::try_from(close + 0.3).unwrap(),
                Decimal::try_from(close - 0.3).unwrap(),
                Decimal::try_from(close).unwrap(),
                Decimal::from(100),
            )
            .unwrap()
        })
        .collect()
}

#[test]
fn synthetic_uptrend_classifies_as_trending_bullish() {
    let detector = RegimeDetector::new(4, RegimeDetectorConfig::default());
    let candles = trending_candles(300);

    let classification = detector.detect(&candles, Timeframe::OneHour).unwrap();

    assert_eq!(classification.regime, RegimeType::TrendingBullish);
    assert_eq!(classification.direction, Direction::Bullish);
    assert!(classification.confidence >= 0.5);
}

#[test]
fn adaptive_thresholds_stay_within_valid_ranges() {
    let detector = RegimeDetector::new(4, RegimeDetectorConfig::default());
    let candles = trending_candles(300);

    let classification = detector.detect(&candles, Timeframe::OneMin).unwrap();
    let t = classification.thresholds;

    assert!(t.adx_trending >= 10.0 && t.adx_trending <= 100.0);
    assert!(t.er_trending >= 0.1 && t.er_trending <= 1.0);
    assert!(t.atr_ratio_low > 0.0 && t.atr_ratio_high > 0.0);
}

#[test]
fn insufficient_bars_returns_error() {
    let detector = RegimeDetector::new(4, RegimeDetectorConfig::default());
    let candles = trending_candles(10);

    let result = detector.detect(&candles, Timeframe::OneHour);
    assert!(result.is_err());
}
