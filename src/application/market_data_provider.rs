use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::candle::Candle;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::market::Timeframe;
use crate::domain::ports::ExchangeClient;
use crate::domain::segment::Coverage;

use super::segment_cache::SegmentCache;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize)]
pub struct Gap {
    pub before: i64,
    pub after: i64,
    pub expected_bars: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OhlcvResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub count: usize,
    pub bars: Vec<Candle>,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
    pub analysis_date: Option<i64>,
    pub gaps: Vec<Gap>,
    pub gap_count: usize,
    pub from_cache: bool,
    pub load_duration_ms: u64,
    pub loaded_at: i64,
}

/// Composes `ExchangeClient` and `SegmentCache`: the only place that
/// decides when to hit the cache, when to batch-refetch from upstream,
/// and how to clip a result to a point-in-time `as_of`.
pub struct MarketDataProvider {
    exchange: Arc<dyn ExchangeClient>,
    cache: Option<Arc<SegmentCache>>,
    max_data_points: usize,
}

impl MarketDataProvider {
    pub fn new(exchange: Arc<dyn ExchangeClient>, cache: Option<Arc<SegmentCache>>, max_data_points: usize) -> Self {
        Self {
            exchange,
            cache,
            max_data_points,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn load_ohlcv(
        &self,
        symbol: &str,
        tf: Timeframe,
        count: usize,
        from: Option<i64>,
        to: Option<i64>,
        as_of: Option<i64>,
        use_cache: bool,
        detect_gaps: bool,
    ) -> GatewayResult<OhlcvResult> {
        if count == 0 {
            return Err(GatewayError::InvalidInput("count must be at least 1".into()));
        }
        if symbol.is_empty() {
            return Err(GatewayError::InvalidInput("symbol must not be empty".into()));
        }

        let start_ts = now_ms();
        let effective_to = as_of.or(to);

        let mut from_cache = false;
        let mut bars: Vec<Candle> = Vec::new();

        if use_cache {
            if let Some(cache) = &self.cache {
                let result = cache.get(symbol, tf, count, effective_to).await?;
                if result.coverage == Coverage::Full {
                    bars = result.bars;
                    from_cache = true;
                } else if result.coverage == Coverage::Partial {
                    debug!(symbol, timeframe = %tf, "partial cache hit, falling through to full refetch");
                }
            }
        }

        if !from_cache {
            bars = self.fetch_from_upstream(symbol, tf, count, from, effective_to).await?;
            bars = Self::clean(bars);

            if let Some(cache) = &self.cache {
                cache.set(symbol, tf, bars.clone()).await?;
            }
        }

        if let Some(as_of) = as_of {
            bars.retain(|c| c.timestamp <= as_of);
            if bars.len() > count {
                let drop = bars.len() - count;
                bars.drain(0..drop);
            }
            if bars.len() < count {
                return Err(GatewayError::InsufficientHistory {
                    requested: count,
                    available: bars.len(),
                });
            }
        } else if bars.len() > count {
            let drop = bars.len() - count;
            bars.drain(0..drop);
        }

        let gaps = if detect_gaps { Self::detect_gaps(&bars, tf) } else { vec![] };

        let first_timestamp = bars.first().map(|c| c.timestamp);
        let last_timestamp = bars.last().map(|c| c.timestamp);
        let load_duration_ms = (now_ms() - start_ts).max(0) as u64;

        info!(
            symbol,
            timeframe = %tf,
            returned = bars.len(),
            from_cache,
            gap_count = gaps.len(),
            "ohlcv load complete"
        );

        Ok(OhlcvResult {
            symbol: symbol.to_uppercase(),
            timeframe: tf,
            count: bars.len(),
            gap_count: gaps.len(),
            bars,
            first_timestamp,
            last_timestamp,
            analysis_date: as_of,
            gaps,
            from_cache,
            load_duration_ms,
            loaded_at: now_ms(),
        })
    }

    async fn fetch_from_upstream(
        &self,
        symbol: &str,
        tf: Timeframe,
        count: usize,
        from: Option<i64>,
        to: Option<i64>,
    ) -> GatewayResult<Vec<Candle>> {
        let batch_limit = self.exchange.max_limit().min(self.max_data_points);

        if count <= batch_limit {
            return self.exchange.fetch_candles(symbol, tf, count, from, to).await;
        }

        let mut accumulated: Vec<Candle> = Vec::with_capacity(count);
        let mut remaining = count;
        let mut current_end = to;
        let tf_ms = tf.duration_ms();

        loop {
            if remaining == 0 {
                break;
            }
            let page = remaining.min(batch_limit);
            let fetched = self
                .exchange
                .fetch_candles(symbol, tf, page, from, current_end)
                .await?;

            if fetched.is_empty() {
                break;
            }

            let page_len = fetched.len();
            let earliest = fetched.iter().map(|c| c.timestamp).min().unwrap_or(0);

            accumulated.splice(0..0, fetched);
            remaining = remaining.saturating_sub(page_len);
            current_end = Some(earliest - tf_ms);

            if page_len < page {
                break;
            }
            if let Some(from) = from {
                if earliest <= from {
                    break;
                }
            }
        }

        Ok(accumulated)
    }

    fn clean(mut bars: Vec<Candle>) -> Vec<Candle> {
        bars.sort_by_key(|c| c.timestamp);
        // `dedup_by_key` keeps the first of each run; reverse around it so the
        // later-in-input (and therefore last-merged) candle wins instead.
        bars.reverse();
        bars.dedup_by_key(|c| c.timestamp);
        bars.reverse();
        bars
    }

    fn detect_gaps(bars: &[Candle], tf: Timeframe) -> Vec<Gap> {
        let tf_ms = tf.duration_ms();
        let mut gaps = Vec::new();
        for pair in bars.windows(2) {
            let expected_next = pair[0].timestamp + tf_ms;
            if pair[1].timestamp > expected_next {
                let expected_bars = (pair[1].timestamp - pair[0].timestamp) / tf_ms - 1;
                gaps.push(Gap {
                    before: pair[0].timestamp,
                    after: pair[1].timestamp,
                    expected_bars,
                });
            }
        }
        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{PairFilter, PairInfo};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct FakeExchange {
        bars_by_call: StdMutex<Vec<Vec<Candle>>>,
        max_limit: usize,
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn fetch_candles(
            &self,
            _symbol: &str,
            _tf: Timeframe,
            _count: usize,
            _from: Option<i64>,
            _to: Option<i64>,
        ) -> GatewayResult<Vec<Candle>> {
            let mut calls = self.bars_by_call.lock().unwrap();
            Ok(calls.pop().unwrap_or_default())
        }
        async fn get_price(&self, _symbol: &str) -> GatewayResult<Decimal> {
            Ok(dec!(100))
        }
        async fn list_pairs(&self, _filter: PairFilter) -> GatewayResult<Vec<PairInfo>> {
            Ok(vec![])
        }
        fn max_limit(&self) -> usize {
            self.max_limit
        }
    }

    fn candle(ts: i64) -> Candle {
        Candle::new("BTCUSDT", ts, dec!(100), dec!(101), dec!(99), dec!(100), dec!(5)).unwrap()
    }

    #[tokio::test]
    async fn single_page_fetch_when_count_fits() {
        let tf = Timeframe::OneHour;
        let bars: Vec<Candle> = (0..10).map(|i| candle(i * tf.duration_ms())).collect();
        let exchange = Arc::new(FakeExchange {
            bars_by_call: StdMutex::new(vec![bars.clone()]),
            max_limit: 1000,
        });
        let provider = MarketDataProvider::new(exchange, None, 5000);
        let result = provider.load_ohlcv("BTCUSDT", tf, 10, None, None, None, false, false).await.unwrap();
        assert_eq!(result.bars.len(), 10);
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn as_of_clip_fails_with_insufficient_history() {
        let tf = Timeframe::OneHour;
        let bars: Vec<Candle> = (0..5).map(|i| candle(i * tf.duration_ms())).collect();
        let exchange = Arc::new(FakeExchange {
            bars_by_call: StdMutex::new(vec![bars]),
            max_limit: 1000,
        });
        let provider = MarketDataProvider::new(exchange, None, 5000);
        let as_of = 2 * tf.duration_ms();
        let err = provider.load_ohlcv("BTCUSDT", tf, 10, None, None, Some(as_of), false, false).await;
        assert!(matches!(err, Err(GatewayError::InsufficientHistory { .. })));
    }

    #[tokio::test]
    async fn detect_gaps_flags_missing_bars() {
        let tf = Timeframe::OneHour;
        let bars = vec![candle(0), candle(3 * tf.duration_ms())];
        let gaps = MarketDataProvider::detect_gaps(&bars, tf);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].expected_bars, 2);
    }

    #[tokio::test]
    async fn clean_dedupes_and_sorts() {
        let bars = vec![candle(200), candle(100), candle(100)];
        let cleaned = MarketDataProvider::clean(bars);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].timestamp, 100);
    }

    #[tokio::test]
    async fn clean_keeps_last_value_on_duplicate_timestamp() {
        let stale = Candle::new("BTCUSDT", 100, dec!(100), dec!(101), dec!(99), dec!(100), dec!(5)).unwrap();
        let fresh = Candle::new("BTCUSDT", 100, dec!(110), dec!(112), dec!(108), dec!(111), dec!(9)).unwrap();
        let bars = vec![stale, fresh.clone()];
        let cleaned = MarketDataProvider::clean(bars);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].close, fresh.close);
        assert_eq!(cleaned[0].volume, fresh.volume);
    }
}
