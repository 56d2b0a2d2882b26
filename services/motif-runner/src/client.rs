//! HTTP collaborators - exchange market data, sentiment feeds, live orders

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ExchangeConfig;
use crate::errors::{ExchangeError, ExchangeResult};
use crate::exchange::{MarketDataSource, OrderGateway, SentimentSource};
use crate::indicators::IndicatorProvider;
use crate::types::{
    Balance, BookLevel, Candle, FearGreedTrend, MarketIntelligence, MarketSnapshot, OrderAck,
    OrderBook, OrderRequest, OrderStatus,
};

const DEPTH_LIMIT: usize = 100;
const API_KEY_HEADER: &str = "X-API-KEY";

fn http_client(timeout_secs: u64) -> ExchangeResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(ExchangeError::Http)
}

/// Send with an explicit timeout and map the status to an `ExchangeError`
async fn send_json<T: DeserializeOwned>(request: RequestBuilder, timeout_secs: u64) -> ExchangeResult<T> {
    let response = match tokio::time::timeout(Duration::from_secs(timeout_secs), request.send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => return Err(ExchangeError::from_reqwest(e, timeout_secs)),
        Err(_) => return Err(ExchangeError::Timeout(timeout_secs)),
    };

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let text = response.text().await.unwrap_or_default();
        return Err(ExchangeError::Permission(format!("{} - {}", status, text)));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(ExchangeError::Unavailable(status.to_string()));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ExchangeError::Rejected(format!("{} - {}", status, text)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ExchangeError::Decode(e.to_string()))
}

// ============================================================================
// Market data
// ============================================================================

/// Candles and depth from a Binance-compatible public REST API
pub struct RestMarketData {
    client: Client,
    base_url: String,
    timeout_secs: u64,
    indicators: Arc<dyn IndicatorProvider>,
}

impl RestMarketData {
    pub fn new(config: &ExchangeConfig, indicators: Arc<dyn IndicatorProvider>) -> ExchangeResult<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: config.market_data_url.trim_end_matches('/').to_string(),
            timeout_secs: config.request_timeout_secs,
            indicators,
        })
    }

    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: usize) -> ExchangeResult<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit = limit.to_string();
        let rows: Vec<Vec<Value>> = send_json(
            self.client
                .get(&url)
                .query(&[("symbol", symbol), ("interval", interval), ("limit", limit.as_str())]),
            self.timeout_secs,
        )
        .await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn fetch_order_book(&self, symbol: &str) -> ExchangeResult<OrderBook> {
        let url = format!("{}/api/v3/depth", self.base_url);
        let limit = DEPTH_LIMIT.to_string();
        let depth: DepthResponse = send_json(
            self.client
                .get(&url)
                .query(&[("symbol", symbol), ("limit", limit.as_str())]),
            self.timeout_secs,
        )
        .await?;
        Ok(OrderBook {
            bids: parse_levels(&depth.bids)?,
            asks: parse_levels(&depth.asks)?,
        })
    }
}

#[async_trait]
impl MarketDataSource for RestMarketData {
    async fn fetch(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Option<MarketSnapshot>> {
        let candles = self.fetch_candles(symbol, interval, limit).await?;
        let Some(last) = candles.last() else {
            debug!("No candles returned for {}", symbol);
            return Ok(None);
        };
        let current_price = last.close;

        // depth is optional context; a missing book does not skip the cycle
        let order_book = match self.fetch_order_book(symbol).await {
            Ok(book) => Some(book),
            Err(e) => {
                warn!("Order book unavailable for {}: {}", symbol, e);
                None
            }
        };

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let indicators = self.indicators.compute(&closes, &highs, &lows);

        Ok(Some(MarketSnapshot {
            symbol: symbol.to_string(),
            current_price,
            closes,
            highs,
            lows,
            volumes,
            indicators,
            order_book,
            fetched_at: Utc::now(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

fn parse_number(value: &Value, field: &str) -> ExchangeResult<f64> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| ExchangeError::Decode(format!("bad {}: {}", field, s))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::Decode(format!("bad {}", field))),
        other => Err(ExchangeError::Decode(format!("bad {}: {}", field, other))),
    }
}

/// `[openTime, open, high, low, close, volume, ...]`
fn parse_kline(row: &[Value]) -> ExchangeResult<Candle> {
    if row.len() < 6 {
        return Err(ExchangeError::Decode(format!("short kline row ({} fields)", row.len())));
    }
    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| ExchangeError::Decode("bad kline open time".to_string()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| ExchangeError::Decode(format!("bad kline open time {}", open_ms)))?;
    Ok(Candle {
        open_time,
        open: parse_number(&row[1], "open")?,
        high: parse_number(&row[2], "high")?,
        low: parse_number(&row[3], "low")?,
        close: parse_number(&row[4], "close")?,
        volume: parse_number(&row[5], "volume")?,
    })
}

fn parse_levels(levels: &[[String; 2]]) -> ExchangeResult<Vec<BookLevel>> {
    levels
        .iter()
        .map(|[price, quantity]| {
            Ok(BookLevel {
                price: price
                    .parse()
                    .map_err(|_| ExchangeError::Decode(format!("bad book price {}", price)))?,
                quantity: quantity
                    .parse()
                    .map_err(|_| ExchangeError::Decode(format!("bad book quantity {}", quantity)))?,
            })
        })
        .collect()
}

// ============================================================================
// Market intelligence
// ============================================================================

/// Fear & greed index plus BTC dominance
pub struct MarketIntelligenceClient {
    client: Client,
    fear_greed_url: String,
    coingecko_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    data: Vec<FearGreedEntry>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEntry {
    value: String,
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    #[serde(default)]
    market_cap_percentage: std::collections::HashMap<String, f64>,
    #[serde(default)]
    total_market_cap: std::collections::HashMap<String, f64>,
}

impl MarketIntelligenceClient {
    pub fn new(config: &ExchangeConfig) -> ExchangeResult<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            fear_greed_url: config.fear_greed_url.clone(),
            coingecko_url: config.coingecko_url.trim_end_matches('/').to_string(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Latest reading and its trend against the previous day
    async fn fear_greed(&self) -> ExchangeResult<(f64, FearGreedTrend)> {
        let response: FearGreedResponse = send_json(
            self.client.get(&self.fear_greed_url).query(&[("limit", "2")]),
            self.timeout_secs,
        )
        .await?;
        let values: Vec<f64> = response
            .data
            .iter()
            .filter_map(|e| e.value.parse::<f64>().ok())
            .collect();
        let current = *values
            .first()
            .ok_or_else(|| ExchangeError::Decode("empty fear & greed response".to_string()))?;
        Ok((current, fear_greed_trend(current, values.get(1).copied())))
    }

    async fn global(&self) -> ExchangeResult<GlobalData> {
        let url = format!("{}/global", self.coingecko_url);
        let response: GlobalResponse = send_json(self.client.get(&url), self.timeout_secs).await?;
        Ok(response.data)
    }
}

fn fear_greed_trend(current: f64, previous: Option<f64>) -> FearGreedTrend {
    match previous {
        Some(prev) if current > prev => FearGreedTrend::Rising,
        Some(prev) if current < prev => FearGreedTrend::Falling,
        _ => FearGreedTrend::Flat,
    }
}

#[async_trait]
impl SentimentSource for MarketIntelligenceClient {
    async fn market_intelligence(&self) -> ExchangeResult<Option<MarketIntelligence>> {
        let (fear_greed_index, fear_greed_trend) = self.fear_greed().await?;

        let defaults = MarketIntelligence::default();
        let (btc_dominance, global_market_cap) = match self.global().await {
            Ok(global) => (
                global
                    .market_cap_percentage
                    .get("btc")
                    .copied()
                    .unwrap_or(defaults.btc_dominance),
                global.total_market_cap.get("usd").copied().unwrap_or(0.0),
            ),
            Err(e) => {
                warn!("CoinGecko global data unavailable: {}", e);
                (defaults.btc_dominance, defaults.global_market_cap)
            }
        };

        let intel = MarketIntelligence {
            fear_greed_index,
            btc_dominance,
            global_market_cap,
            fear_greed_trend,
        };
        debug!(
            "Market intelligence: F&G {} ({:?}), BTC dominance {:.1}%",
            intel.fear_greed_index, intel.fear_greed_trend, intel.btc_dominance
        );
        Ok(Some(intel))
    }
}

// ============================================================================
// Live orders
// ============================================================================

/// Posts orders to an execution service authenticated by API key
pub struct RestOrderGateway {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
    status: OrderStatus,
    #[serde(default)]
    filled_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    symbol: &'a str,
}

impl RestOrderGateway {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> ExchangeResult<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl OrderGateway for RestOrderGateway {
    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderAck> {
        let url = format!("{}/orders", self.base_url);
        let response: OrderResponse = send_json(
            self.client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(request),
            self.timeout_secs,
        )
        .await?;
        if response.status == OrderStatus::Cancelled {
            return Err(ExchangeError::Rejected(format!(
                "order {} cancelled by exchange",
                response.order_id
            )));
        }
        Ok(OrderAck {
            order_id: response.order_id,
            status: response.status,
            filled_price: response.filled_price,
            simulated: false,
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()> {
        let url = format!("{}/orders/{}", self.base_url, order_id);
        let _: Value = send_json(
            self.client
                .delete(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(&CancelRequest { symbol }),
            self.timeout_secs,
        )
        .await?;
        Ok(())
    }

    async fn fetch_balances(&self) -> ExchangeResult<Vec<Balance>> {
        let url = format!("{}/balances", self.base_url);
        send_json(
            self.client.get(&url).header(API_KEY_HEADER, &self.api_key),
            self.timeout_secs,
        )
        .await
    }
}
