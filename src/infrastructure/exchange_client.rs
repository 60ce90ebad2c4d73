use std::str::FromStr;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::candle::Candle;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::market::Timeframe;
use crate::domain::ports::{ExchangeClient, PairFilter, PairInfo};

use super::core::http_client_factory::build_url_with_query;

const DEFAULT_MAX_LIMIT: usize = 1500;

/// Adapter to a Binance-shaped spot REST API: `/api/v3/klines`,
/// `/api/v3/ticker/price`, `/api/v3/exchangeInfo`. Retry/backoff is
/// handled transparently by the `ClientWithMiddleware` the caller
/// constructs via `HttpClientFactory`.
pub struct BinanceExchangeClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
    max_limit: usize,
}

impl BinanceExchangeClient {
    pub fn new(client: ClientWithMiddleware, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: None,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit;
        self
    }

    fn request(&self, url: &str) -> reqwest_middleware::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("X-MBX-APIKEY", key);
        }
        req
    }

    fn parse_klines(symbol: &str, body: &serde_json::Value) -> GatewayResult<Vec<Candle>> {
        let rows = body.as_array().ok_or_else(|| {
            GatewayError::Upstream {
                status: 200,
                body: "klines response was not a JSON array".into(),
            }
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row.as_array().ok_or_else(|| GatewayError::Upstream {
                status: 200,
                body: "kline row was not an array".into(),
            })?;
            if fields.len() < 6 {
                return Err(GatewayError::Upstream {
                    status: 200,
                    body: "kline row had fewer than 6 fields".into(),
                });
            }
            let timestamp = fields[0].as_i64().ok_or_else(|| GatewayError::Upstream {
                status: 200,
                body: "kline open_time was not an integer".into(),
            })?;
            let parse_decimal = |idx: usize| -> GatewayResult<Decimal> {
                fields[idx]
                    .as_str()
                    .and_then(|s| Decimal::from_str(s).ok())
                    .ok_or_else(|| GatewayError::Upstream {
                        status: 200,
                        body: format!("kline field {idx} was not a decimal string"),
                    })
            };
            let open = parse_decimal(1)?;
            let high = parse_decimal(2)?;
            let low = parse_decimal(3)?;
            let close = parse_decimal(4)?;
            let volume = parse_decimal(5)?;

            candles.push(Candle::new(symbol, timestamp, open, high, low, close, volume)?);
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

#[async_trait]
impl ExchangeClient for BinanceExchangeClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
        from: Option<i64>,
        to: Option<i64>,
    ) -> GatewayResult<Vec<Candle>> {
        if symbol.is_empty() {
            return Err(GatewayError::InvalidInput("symbol must not be empty".into()));
        }
        if count == 0 {
            return Err(GatewayError::InvalidInput("count must be at least 1".into()));
        }
        let symbol = symbol.to_uppercase();
        let limit = count.min(self.max_limit);

        let mut params: Vec<(String, String)> = vec![
            ("symbol".to_string(), symbol.clone()),
            ("interval".to_string(), timeframe.to_exchange_string().to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(from) = from {
            params.push(("startTime".to_string(), from.to_string()));
        }
        if let Some(to) = to {
            params.push(("endTime".to_string(), to.to_string()));
        }

        let url = build_url_with_query(&format!("{}/api/v3/klines", self.base_url), &params);

        debug!(symbol = %symbol, timeframe = %timeframe, limit, "fetching candles from exchange");

        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(symbol = %symbol, %status, "exchange returned non-success status");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| GatewayError::Upstream {
            status: status.as_u16(),
            body: e.to_string(),
        })?;

        Self::parse_klines(&symbol, &body)
    }

    async fn get_price(&self, symbol: &str) -> GatewayResult<Decimal> {
        if symbol.is_empty() {
            return Err(GatewayError::InvalidInput("symbol must not be empty".into()));
        }
        let symbol = symbol.to_uppercase();
        let url = build_url_with_query(
            &format!("{}/api/v3/ticker/price", self.base_url),
            &[("symbol", symbol.as_str())],
        );

        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status: status.as_u16(), body });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| GatewayError::Upstream {
            status: status.as_u16(),
            body: e.to_string(),
        })?;

        payload
            .get("price")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .ok_or_else(|| GatewayError::Upstream {
                status: status.as_u16(),
                body: "ticker response missing price field".into(),
            })
    }

    async fn list_pairs(&self, filter: PairFilter) -> GatewayResult<Vec<PairInfo>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status: status.as_u16(), body });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| GatewayError::Upstream {
            status: status.as_u16(),
            body: e.to_string(),
        })?;

        let symbols = payload
            .get("symbols")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut pairs = Vec::new();
        for entry in symbols {
            let symbol = entry.get("symbol").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let base_asset = entry.get("baseAsset").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let quote_asset = entry.get("quoteAsset").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let status_str = entry.get("status").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let permissions: Vec<String> = entry
                .get("permissions")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|p| p.as_str().map(String::from)).collect())
                .unwrap_or_default();

            if let Some(q) = &filter.quote_asset {
                if &quote_asset != q {
                    continue;
                }
            }
            if let Some(b) = &filter.base_asset {
                if &base_asset != b {
                    continue;
                }
            }
            if let Some(s) = &filter.status {
                if &status_str != s {
                    continue;
                }
            }
            if let Some(perms) = &filter.permissions {
                if !perms.iter().any(|p| permissions.contains(p)) {
                    continue;
                }
            }

            pairs.push(PairInfo {
                symbol,
                base_asset,
                quote_asset,
                status: status_str,
                permissions,
                base_asset_precision: entry.get("baseAssetPrecision").and_then(|v| v.as_u64()).unwrap_or(8) as u32,
                quote_asset_precision: entry.get("quoteAssetPrecision").and_then(|v| v.as_u64()).unwrap_or(8) as u32,
                is_spot_trading_allowed: entry.get("isSpotTradingAllowed").and_then(|v| v.as_bool()).unwrap_or(false),
                is_margin_trading_allowed: entry.get("isMarginTradingAllowed").and_then(|v| v.as_bool()).unwrap_or(false),
            });
        }
        Ok(pairs)
    }

    fn max_limit(&self) -> usize {
        self.max_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_klines_reads_first_six_fields() {
        let body = json!([
            [1_700_000_000_000i64, "100.0", "110.0", "95.0", "105.0", "12.5", 1_700_000_059_999i64]
        ]);
        let candles = BinanceExchangeClient::parse_klines("BTCUSDT", &body).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
        assert_eq!(candles[0].close.to_string(), "105.0");
    }

    #[test]
    fn parse_klines_rejects_short_rows() {
        let body = json!([[1_700_000_000_000i64, "100.0", "110.0"]]);
        assert!(BinanceExchangeClient::parse_klines("BTCUSDT", &body).is_err());
    }

    #[test]
    fn parse_klines_sorts_ascending() {
        let body = json!([
            [2_000i64, "100.0", "100.0", "100.0", "100.0", "1.0"],
            [1_000i64, "100.0", "100.0", "100.0", "100.0", "1.0"],
        ]);
        let candles = BinanceExchangeClient::parse_klines("BTCUSDT", &body).unwrap();
        assert_eq!(candles[0].timestamp, 1_000);
        assert_eq!(candles[1].timestamp, 2_000);
    }
}
