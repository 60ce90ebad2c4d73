use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::candle::Candle;

/// Continuous time-range cache entry for one (symbol, timeframe). Backed by
/// a `BTreeMap` keyed by timestamp so range extraction stays O(log n + k)
/// instead of the O(n log n) a hash map + sort would need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start: i64,
    pub end: i64,
    pub bars: BTreeMap<i64, Candle>,
    pub created_at: i64,
}

impl Segment {
    pub fn new(bars: Vec<Candle>, created_at: i64) -> Self {
        let map: BTreeMap<i64, Candle> = bars.into_iter().map(|c| (c.timestamp, c)).collect();
        let start = *map.keys().next().unwrap_or(&created_at);
        let end = *map.keys().next_back().unwrap_or(&created_at);
        Self {
            start,
            end,
            bars: map,
            created_at,
        }
    }

    pub fn count(&self) -> usize {
        self.bars.len()
    }

    /// Merge new bars into this segment. Returns the number of genuinely
    /// new timestamps inserted (0 means the segment was not mutated and a
    /// caller should not renew its TTL).
    pub fn merge(&mut self, bars: Vec<Candle>) -> usize {
        let mut inserted = 0usize;
        for bar in bars {
            if self.bars.insert(bar.timestamp, bar).is_none() {
                inserted += 1;
            }
        }
        if let (Some(&min), Some(&max)) = (self.bars.keys().next(), self.bars.keys().next_back()) {
            self.start = min;
            self.end = max;
        }
        inserted
    }

    /// Evict the oldest bars until `count() <= max_entries`. Returns the
    /// number of bars evicted.
    pub fn evict_to(&mut self, max_entries: usize) -> usize {
        if self.bars.len() <= max_entries {
            return 0;
        }
        let excess = self.bars.len() - max_entries;
        let victims: Vec<i64> = self.bars.keys().take(excess).copied().collect();
        for k in victims {
            self.bars.remove(&k);
        }
        if let Some(&min) = self.bars.keys().next() {
            self.start = min;
        }
        excess
    }

    /// Bars within `[from, to]` inclusive, ascending, last `count` of them.
    pub fn window(&self, from: i64, to: i64, count: usize) -> Vec<Candle> {
        let mut bars: Vec<Candle> = self
            .bars
            .range(from..=to)
            .map(|(_, c)| c.clone())
            .collect();
        if bars.len() > count {
            let drop = bars.len() - count;
            bars.drain(0..drop);
        }
        bars
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coverage {
    Full,
    Partial,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeGap {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissingRange {
    pub before: Option<RangeGap>,
    pub after: Option<RangeGap>,
    /// Populated only for a full miss: how many bars were requested and
    /// the end timestamp of the request.
    pub count: Option<usize>,
    pub end_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageResult {
    pub coverage: Coverage,
    pub bars: Vec<Candle>,
    pub missing: Option<MissingRange>,
}

/// Process-wide cache counters, persisted best-effort to the backing
/// store and discarded on load if stale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub partial_hits: u64,
    pub extensions: u64,
    pub merges: u64,
    pub evictions: u64,
    pub last_activity: i64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.partial_hits;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDiagnostics {
    pub key: String,
    pub count: usize,
    pub start: i64,
    pub end: i64,
    pub age_ms: i64,
    pub ttl_remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64) -> Candle {
        Candle::new("BTCUSDT", ts, dec!(100), dec!(101), dec!(99), dec!(100), dec!(5)).unwrap()
    }

    #[test]
    fn new_computes_start_end_count() {
        let seg = Segment::new(vec![candle(300), candle(100), candle(200)], 1000);
        assert_eq!(seg.start, 100);
        assert_eq!(seg.end, 300);
        assert_eq!(seg.count(), 3);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut seg = Segment::new(vec![candle(100), candle(200)], 0);
        let inserted_first = seg.merge(vec![candle(300)]);
        assert_eq!(inserted_first, 1);
        let inserted_again = seg.merge(vec![candle(300)]);
        assert_eq!(inserted_again, 0);
        assert_eq!(seg.count(), 3);
        assert_eq!(seg.end, 300);
    }

    #[test]
    fn evict_to_drops_oldest_and_adjusts_start() {
        let mut seg = Segment::new(vec![candle(100), candle(200), candle(300), candle(400)], 0);
        let evicted = seg.evict_to(2);
        assert_eq!(evicted, 2);
        assert_eq!(seg.count(), 2);
        assert_eq!(seg.start, 300);
    }

    #[test]
    fn window_returns_last_count_within_range() {
        let seg = Segment::new((0..10).map(|i| candle(i * 100)).collect(), 0);
        let bars = seg.window(0, 900, 3);
        assert_eq!(bars.len(), 3);
        assert_eq!(bars.last().unwrap().timestamp, 900);
    }

    #[test]
    fn hit_rate_is_zero_with_no_activity() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
