use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::domain::candle::Candle;
use crate::domain::errors::GatewayResult;
use crate::domain::market::Timeframe;
use crate::domain::ports::CacheStore;
use crate::domain::segment::{CacheStats, Coverage, CoverageResult, MissingRange, RangeGap, Segment, SegmentDiagnostics};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The central OHLCV cache engine: per-(symbol,timeframe) continuous
/// segments over an abstract `CacheStore`, with coverage queries, LRU
/// eviction by timestamp, and process-wide hit/miss counters.
pub struct SegmentCache {
    store: Arc<dyn CacheStore>,
    key_prefix: String,
    max_entries_per_key: usize,
    ttl_seconds: u64,
    /// Per-key serialization so a read-then-merge-then-write sequence on
    /// one (symbol,timeframe) doesn't race against a concurrent writer,
    /// generalized from the single `RwLock<HashMap<..>>` the rest of this
    /// codebase guards simple caches with into a sharded per-key lock.
    locks: RwLock<HashMap<String, Arc<AsyncMutex<()>>>>,
    stats: AsyncMutex<CacheStats>,
}

impl SegmentCache {
    pub fn new(store: Arc<dyn CacheStore>, key_prefix: impl Into<String>, max_entries_per_key: usize, ttl_seconds: u64) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            max_entries_per_key,
            ttl_seconds,
            locks: RwLock::new(HashMap::new()),
            stats: AsyncMutex::new(CacheStats::default()),
        }
    }

    fn segment_key(&self, symbol: &str, tf: Timeframe) -> String {
        format!("{}{}:{}", self.key_prefix, symbol.to_uppercase(), tf)
    }

    fn stats_key(&self) -> String {
        format!("{}__stats", self.key_prefix)
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = match self.locks.read() {
            Ok(g) => g.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        } {
            return lock;
        }
        let mut guard = match self.locks.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn load_segment(&self, key: &str) -> GatewayResult<Option<Segment>> {
        match self.store.get_bytes(key).await {
            Ok(Some(bytes)) => Ok(serde_json::from_slice(&bytes).ok()),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "cache store unavailable on read, degrading to miss");
                Ok(None)
            }
        }
    }

    async fn save_segment(&self, key: &str, segment: &Segment) -> GatewayResult<()> {
        let bytes = serde_json::to_vec(segment).map_err(|e| {
            crate::domain::errors::GatewayError::Internal(format!("segment serialization failed: {e}"))
        })?;
        self.store.set_bytes(key, bytes, Some(self.ttl_seconds)).await
    }

    /// Query cached coverage for `count` bars of `(symbol, tf)` ending at
    /// `end` (defaults to the segment's own end when omitted).
    pub async fn get(&self, symbol: &str, tf: Timeframe, count: usize, end: Option<i64>) -> GatewayResult<CoverageResult> {
        let key = self.segment_key(symbol, tf);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let segment = self.load_segment(&key).await?;
        let tf_ms = tf.duration_ms();

        let Some(segment) = segment else {
            self.record_miss().await;
            return Ok(CoverageResult {
                coverage: Coverage::None,
                bars: vec![],
                missing: Some(MissingRange {
                    count: Some(count),
                    end_timestamp: Some(end.unwrap_or_else(now_ms)),
                    ..Default::default()
                }),
            });
        };

        let requested_end = end.unwrap_or(segment.end);
        let requested_start = requested_end - (count.saturating_sub(1) as i64) * tf_ms;

        if requested_end < segment.start || requested_start > segment.end {
            self.record_miss().await;
            return Ok(CoverageResult {
                coverage: Coverage::None,
                bars: vec![],
                missing: Some(MissingRange {
                    count: Some(count),
                    end_timestamp: Some(requested_end),
                    ..Default::default()
                }),
            });
        }

        let intersect_start = requested_start.max(segment.start);
        let intersect_end = requested_end.min(segment.end);
        let bars = segment.window(intersect_start, intersect_end, count);

        let fully_covered = requested_start >= segment.start && requested_end <= segment.end && bars.len() == count;

        if fully_covered {
            self.record_hit().await;
            Ok(CoverageResult {
                coverage: Coverage::Full,
                bars,
                missing: None,
            })
        } else {
            let before = if requested_start < segment.start {
                Some(RangeGap { start: requested_start, end: segment.start - tf_ms })
            } else {
                None
            };
            let after = if requested_end > segment.end {
                Some(RangeGap { start: segment.end + tf_ms, end: requested_end })
            } else {
                None
            };
            self.record_partial().await;
            Ok(CoverageResult {
                coverage: Coverage::Partial,
                bars,
                missing: Some(MissingRange { before, after, count: None, end_timestamp: None }),
            })
        }
    }

    /// Merge `bars` into the segment for `(symbol, tf)`, creating it if
    /// absent. TTL is renewed only if the merge actually changed the
    /// segment.
    pub async fn set(&self, symbol: &str, tf: Timeframe, mut bars: Vec<Candle>) -> GatewayResult<()> {
        if bars.is_empty() {
            return Ok(());
        }
        bars.sort_by_key(|c| c.timestamp);

        let key = self.segment_key(symbol, tf);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let existing = self.load_segment(&key).await?;

        let (mut segment, is_new, inserted) = match existing {
            Some(mut seg) => {
                let before_start = seg.start;
                let before_end = seg.end;
                let inserted = seg.merge(bars);
                if inserted > 0 && (seg.start < before_start || seg.end > before_end) {
                    self.record_extension().await;
                }
                (seg, false, inserted)
            }
            None => (Segment::new(bars, now_ms()), true, usize::MAX),
        };

        if !is_new && inserted == 0 {
            debug!(symbol, timeframe = %tf, "merge produced no new bars, skipping TTL renewal");
            return Ok(());
        }

        let evicted = segment.evict_to(self.max_entries_per_key);
        if evicted > 0 {
            self.record_eviction(evicted as u64).await;
        }
        if inserted > 0 && inserted != usize::MAX {
            self.record_merge().await;
        }

        self.save_segment(&key, &segment).await
    }

    pub async fn clear(&self, symbol: Option<&str>, tf: Option<Timeframe>) -> GatewayResult<u64> {
        match (symbol, tf) {
            (Some(symbol), Some(tf)) => {
                let key = self.segment_key(symbol, tf);
                self.store.delete(&key).await?;
                Ok(1)
            }
            _ => self.store.clear_prefix(&self.key_prefix).await,
        }
    }

    pub async fn stats(&self) -> GatewayResult<(CacheStats, Vec<SegmentDiagnostics>)> {
        let keys = self.store.keys(&self.key_prefix).await.unwrap_or_default();
        let mut diagnostics = Vec::new();
        for key in keys {
            if key == self.stats_key() {
                continue;
            }
            if let Ok(Some(segment)) = self.load_segment(&key).await {
                let ttl = self.store.ttl(&key).await.unwrap_or(-2);
                diagnostics.push(SegmentDiagnostics {
                    key: key.clone(),
                    count: segment.count(),
                    start: segment.start,
                    end: segment.end,
                    age_ms: now_ms() - segment.created_at,
                    ttl_remaining: ttl,
                });
            }
        }
        let stats = self.stats.lock().await.clone();
        Ok((stats, diagnostics))
    }

    async fn record_hit(&self) {
        let mut s = self.stats.lock().await;
        s.hits += 1;
        s.last_activity = now_ms();
    }
    async fn record_miss(&self) {
        let mut s = self.stats.lock().await;
        s.misses += 1;
        s.last_activity = now_ms();
    }
    async fn record_partial(&self) {
        let mut s = self.stats.lock().await;
        s.partial_hits += 1;
        s.last_activity = now_ms();
    }
    async fn record_extension(&self) {
        let mut s = self.stats.lock().await;
        s.extensions += 1;
    }
    async fn record_merge(&self) {
        let mut s = self.stats.lock().await;
        s.merges += 1;
    }
    async fn record_eviction(&self, n: u64) {
        let mut s = self.stats.lock().await;
        s.evictions += n;
    }
}
