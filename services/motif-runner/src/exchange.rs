//! Collaborator seams - market data, orders, sentiment and trade storage
//!
//! The trading core only talks to these traits. HTTP implementations live in
//! [`crate::client`]; the in-process ones (cache, paper fills, demo fallback,
//! memory store) live here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{ExchangeError, ExchangeResult};
use crate::risk::ClosedTrade;
use crate::types::{Balance, MarketIntelligence, MarketSnapshot, OrderAck, OrderRequest, OrderSide, OrderStatus};

/// Source of candles, indicators and order book for one symbol.
///
/// `Ok(None)` and `Err` both mean "skip this cycle".
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Option<MarketSnapshot>>;
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderAck>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()>;

    async fn fetch_balances(&self) -> ExchangeResult<Vec<Balance>>;
}

#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn market_intelligence(&self) -> ExchangeResult<Option<MarketIntelligence>>;
}

/// Persistence sink for closed trades; callers log and ignore failures
#[async_trait]
pub trait TradeSink: Send + Sync {
    async fn insert_trade(&self, trade: &ClosedTrade) -> ExchangeResult<()>;

    async fn get_trades(&self, symbol: Option<&str>, limit: usize) -> ExchangeResult<Vec<ClosedTrade>>;
}

/// Handles a bot needs to run its cycles
#[derive(Clone)]
pub struct Collaborators {
    pub market_data: Arc<dyn MarketDataSource>,
    pub orders: Arc<dyn OrderGateway>,
    pub sentiment: Option<Arc<dyn SentimentSource>>,
    pub trades: Arc<dyn TradeSink>,
}

impl Collaborators {
    /// Latest market intelligence, neutral when unavailable
    pub async fn market_intelligence(&self) -> MarketIntelligence {
        let Some(source) = &self.sentiment else {
            return MarketIntelligence::default();
        };
        match source.market_intelligence().await {
            Ok(Some(intel)) => intel,
            Ok(None) => MarketIntelligence::default(),
            Err(e) => {
                warn!("Market intelligence unavailable, using neutral: {}", e);
                MarketIntelligence::default()
            }
        }
    }

    /// Store a closed trade without letting storage failures escape
    pub async fn store_trade(&self, trade: &ClosedTrade) {
        if let Err(e) = self.trades.insert_trade(trade).await {
            warn!("Failed to store trade for {}: {}", trade.position.symbol, e);
        }
    }
}

/// Build a market-style order with `reference_price` for slippage and paper fills
pub fn order_request(
    symbol: &str,
    side: OrderSide,
    quantity: f64,
    reference_price: f64,
) -> Option<OrderRequest> {
    let quantity = Decimal::from_f64(quantity)?;
    if quantity <= Decimal::ZERO {
        return None;
    }
    Some(OrderRequest {
        client_order_id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        side,
        quantity,
        price: Decimal::from_f64(reference_price),
    })
}

// ============================================================================
// Cached market data
// ============================================================================

/// TTL cache in front of another market-data source
pub struct CachedMarketData {
    inner: Arc<dyn MarketDataSource>,
    ttl: Duration,
    entries: Mutex<HashMap<(String, String, usize), (Instant, MarketSnapshot)>>,
}

impl CachedMarketData {
    pub fn new(inner: Arc<dyn MarketDataSource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MarketDataSource for CachedMarketData {
    async fn fetch(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Option<MarketSnapshot>> {
        let key = (symbol.to_string(), interval.to_string(), limit);
        {
            let entries = self.entries.lock().await;
            if let Some((at, snapshot)) = entries.get(&key) {
                if at.elapsed() < self.ttl {
                    debug!("Market data cache hit: {}", symbol);
                    return Ok(Some(snapshot.clone()));
                }
            }
        }

        let fresh = self.inner.fetch(symbol, interval, limit).await?;
        if let Some(snapshot) = &fresh {
            self.entries
                .lock()
                .await
                .insert(key, (Instant::now(), snapshot.clone()));
        }
        Ok(fresh)
    }
}

// ============================================================================
// Paper gateway
// ============================================================================

/// Simulated fills against the order's reference price
pub struct PaperGateway {
    quote_asset: String,
    slippage_bps: u32,
    balances: Mutex<HashMap<String, Decimal>>,
}

impl PaperGateway {
    pub fn new(quote_asset: &str, starting_quote: Decimal, slippage_bps: u32) -> Self {
        let mut balances = HashMap::new();
        balances.insert(quote_asset.to_string(), starting_quote);
        Self {
            quote_asset: quote_asset.to_string(),
            slippage_bps,
            balances: Mutex::new(balances),
        }
    }

    fn base_asset<'a>(&self, symbol: &'a str) -> &'a str {
        symbol.strip_suffix(self.quote_asset.as_str()).unwrap_or(symbol)
    }

    fn fill_price(&self, side: OrderSide, reference: Decimal) -> Decimal {
        let slip = Decimal::from(self.slippage_bps) / Decimal::from(10_000);
        let adjusted = match side {
            OrderSide::Buy => reference * (Decimal::ONE + slip),
            OrderSide::Sell => reference * (Decimal::ONE - slip),
        };
        adjusted.round_dp_with_strategy(8, RoundingStrategy::MidpointNearestEven)
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderAck> {
        if request.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Rejected("quantity must be positive".to_string()));
        }
        let reference = request
            .price
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ExchangeError::Rejected("paper fill needs a reference price".to_string()))?;

        let fill = self.fill_price(request.side, reference);
        let notional = fill * request.quantity;
        let base = self.base_asset(&request.symbol).to_string();

        let mut balances = self.balances.lock().await;
        let (quote_delta, base_delta) = match request.side {
            OrderSide::Buy => (-notional, request.quantity),
            OrderSide::Sell => (notional, -request.quantity),
        };
        *balances.entry(self.quote_asset.clone()).or_insert(Decimal::ZERO) += quote_delta;
        *balances.entry(base).or_insert(Decimal::ZERO) += base_delta;

        info!(
            "[PAPER] {} {} {} @ {} (ref {})",
            request.side, request.quantity, request.symbol, fill, reference
        );

        Ok(OrderAck {
            order_id: format!("paper-{}", request.client_order_id),
            status: OrderStatus::Filled,
            filled_price: Some(fill),
            simulated: true,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> ExchangeResult<()> {
        // paper orders fill immediately
        debug!("[PAPER] cancel {} ignored", order_id);
        Ok(())
    }

    async fn fetch_balances(&self) -> ExchangeResult<Vec<Balance>> {
        let balances = self.balances.lock().await;
        let mut out: Vec<Balance> = balances
            .iter()
            .map(|(asset, free)| Balance {
                asset: asset.clone(),
                free: *free,
                locked: Decimal::ZERO,
            })
            .collect();
        out.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(out)
    }
}

// ============================================================================
// Demo-mode fallback
// ============================================================================

/// Live gateway that drops to paper fills on the first permission error
pub struct DemoFallbackGateway {
    live: Arc<dyn OrderGateway>,
    paper: PaperGateway,
    demo_mode: AtomicBool,
}

impl DemoFallbackGateway {
    pub fn new(live: Arc<dyn OrderGateway>, paper: PaperGateway) -> Self {
        Self {
            live,
            paper,
            demo_mode: AtomicBool::new(false),
        }
    }

    pub fn demo_mode(&self) -> bool {
        self.demo_mode.load(Ordering::SeqCst)
    }

    fn enter_demo_mode(&self, err: &ExchangeError) {
        if !self.demo_mode.swap(true, Ordering::SeqCst) {
            warn!("Exchange permission error ({}); switching to demo mode", err);
        }
    }
}

#[async_trait]
impl OrderGateway for DemoFallbackGateway {
    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderAck> {
        if self.demo_mode() {
            return self.paper.place_order(request).await;
        }
        match self.live.place_order(request).await {
            Err(e) if e.is_permission() => {
                self.enter_demo_mode(&e);
                self.paper.place_order(request).await
            }
            other => other,
        }
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()> {
        if self.demo_mode() {
            return self.paper.cancel_order(symbol, order_id).await;
        }
        self.live.cancel_order(symbol, order_id).await
    }

    async fn fetch_balances(&self) -> ExchangeResult<Vec<Balance>> {
        if self.demo_mode() {
            return self.paper.fetch_balances().await;
        }
        match self.live.fetch_balances().await {
            Err(e) if e.is_permission() => {
                self.enter_demo_mode(&e);
                self.paper.fetch_balances().await
            }
            other => other,
        }
    }
}

// ============================================================================
// In-memory trade store
// ============================================================================

pub struct MemoryTradeStore {
    trades: RwLock<Vec<ClosedTrade>>,
    capacity: usize,
}

impl MemoryTradeStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            trades: RwLock::new(Vec::new()),
            capacity,
        }
    }
}

impl Default for MemoryTradeStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl TradeSink for MemoryTradeStore {
    async fn insert_trade(&self, trade: &ClosedTrade) -> ExchangeResult<()> {
        let mut trades = self.trades.write().await;
        trades.push(trade.clone());
        if trades.len() > self.capacity {
            let excess = trades.len() - self.capacity;
            trades.drain(..excess);
        }
        Ok(())
    }

    /// Most recent trades first
    async fn get_trades(&self, symbol: Option<&str>, limit: usize) -> ExchangeResult<Vec<ClosedTrade>> {
        let trades = self.trades.read().await;
        Ok(trades
            .iter()
            .rev()
            .filter(|t| symbol.map_or(true, |s| t.position.symbol == s))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Free balance of `asset` as f64
pub fn free_balance(balances: &[Balance], asset: &str) -> Option<f64> {
    balances
        .iter()
        .find(|b| b.asset == asset)
        .and_then(|b| b.free.to_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn request(side: OrderSide) -> OrderRequest {
        order_request("SOLUSDT", side, 2.0, 100.0).unwrap()
    }

    #[tokio::test]
    async fn test_paper_fill_applies_slippage_and_balances() {
        let paper = PaperGateway::new("USDT", Decimal::from(1000), 10);
        let ack = paper.place_order(&request(OrderSide::Buy)).await.unwrap();
        assert!(ack.simulated);
        assert_eq!(ack.status, OrderStatus::Filled);
        // 10 bps over 100
        assert_eq!(ack.filled_price, Some(Decimal::new(1001, 1)));

        let balances = paper.fetch_balances().await.unwrap();
        assert_eq!(free_balance(&balances, "SOL"), Some(2.0));
        assert_eq!(free_balance(&balances, "USDT"), Some(799.8));
    }

    #[tokio::test]
    async fn test_paper_requires_reference_price() {
        let paper = PaperGateway::new("USDT", Decimal::from(1000), 0);
        let mut req = request(OrderSide::Sell);
        req.price = None;
        assert!(matches!(
            paper.place_order(&req).await,
            Err(ExchangeError::Rejected(_))
        ));
    }

    struct DeniedGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderGateway for DeniedGateway {
        async fn place_order(&self, _request: &OrderRequest) -> ExchangeResult<OrderAck> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ExchangeError::Permission("invalid api key".to_string()))
        }

        async fn cancel_order(&self, _symbol: &str, _order_id: &str) -> ExchangeResult<()> {
            Ok(())
        }

        async fn fetch_balances(&self) -> ExchangeResult<Vec<Balance>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_permission_error_flips_demo_mode() {
        let live = Arc::new(DeniedGateway {
            calls: AtomicUsize::new(0),
        });
        let gateway = DemoFallbackGateway::new(
            live.clone(),
            PaperGateway::new("USDT", Decimal::from(1000), 0),
        );
        assert!(!gateway.demo_mode());

        let ack = gateway.place_order(&request(OrderSide::Buy)).await.unwrap();
        assert!(ack.simulated);
        assert!(gateway.demo_mode());

        gateway.place_order(&request(OrderSide::Sell)).await.unwrap();
        // live gateway is not retried once in demo mode
        assert_eq!(live.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memory_store_filters_and_caps() {
        use crate::config::RiskConfig;
        use crate::risk::RiskManager;

        let mut rm = RiskManager::new(RiskConfig::default());
        let store = MemoryTradeStore::new(2);
        for symbol in ["BTCUSDT", "ETHUSDT", "BTCUSDT"] {
            let p = rm.open_position(symbol, 0.7, 100.0, 98.0, 105.0, 1.0).unwrap();
            rm.confirm_position(p.id, "o").unwrap();
            let trade = rm.close_position(p.id, 101.0, None).unwrap();
            store.insert_trade(&trade).await.unwrap();
        }

        let all = store.get_trades(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].position.symbol, "BTCUSDT");
        let eth = store.get_trades(Some("ETHUSDT"), 10).await.unwrap();
        assert_eq!(eth.len(), 1);
    }
}
