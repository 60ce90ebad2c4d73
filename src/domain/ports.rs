use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::candle::Candle;
use super::errors::GatewayResult;
use super::market::Timeframe;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairFilter {
    pub quote_asset: Option<String>,
    pub base_asset: Option<String>,
    pub status: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    pub permissions: Vec<String>,
    pub base_asset_precision: u32,
    pub quote_asset_precision: u32,
    pub is_spot_trading_allowed: bool,
    pub is_margin_trading_allowed: bool,
}

/// Stateless adapter to the upstream spot-exchange REST API. Implementors
/// own retry/backoff and timeout policy; callers see only the abstract
/// operation and its typed outcome.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetch up to `count` candles (clamped to the implementation's max
    /// page size) ending at `to` (or now), optionally bounded below by
    /// `from`. Returned candles are sorted ascending and OHLC-valid.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
        from: Option<i64>,
        to: Option<i64>,
    ) -> GatewayResult<Vec<Candle>>;

    async fn get_price(&self, symbol: &str) -> GatewayResult<Decimal>;

    async fn list_pairs(&self, filter: PairFilter) -> GatewayResult<Vec<PairInfo>>;

    /// Upper bound on bars returned by a single `fetch_candles` call.
    fn max_limit(&self) -> usize;
}

/// Abstract key/value store with native TTL, the backing substrate for
/// `SegmentCache`. A remote store is a drop-in implementor; the shipped
/// implementation is an in-process, lock-guarded store (see
/// infrastructure::cache_store).
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_bytes(&self, key: &str) -> GatewayResult<Option<Vec<u8>>>;

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_seconds: Option<u64>) -> GatewayResult<()>;

    async fn delete(&self, key: &str) -> GatewayResult<()>;

    async fn clear_prefix(&self, prefix: &str) -> GatewayResult<u64>;

    async fn keys(&self, prefix: &str) -> GatewayResult<Vec<String>>;

    /// Seconds remaining, `-1` if no expiry is set, `-2` if missing.
    async fn ttl(&self, key: &str) -> GatewayResult<i64>;
}
