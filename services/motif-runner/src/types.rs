//! Core market types
//!
//! These types define the contract between the trading core and its
//! market-data, order and sentiment collaborators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indicators::Indicators;

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Side implied by an ensemble signal: above neutral is long
    pub fn from_signal(signal: f64) -> Side {
        if signal > 0.5 {
            Side::Long
        } else {
            Side::Short
        }
    }

    /// Order side that opens a position in this direction
    pub fn entry_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces a position in this direction
    pub fn exit_order(&self) -> OrderSide {
        self.opposite().entry_order()
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Exchange order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One price level of an order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot, best levels first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn mid_price(&self) -> Option<f64> {
        let bid = self.bids.first()?.price;
        let ask = self.asks.first()?.price;
        Some((bid + ask) / 2.0)
    }
}

/// Everything a trading cycle needs for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub closes: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub volumes: Vec<f64>,
    pub indicators: Indicators,
    pub order_book: Option<OrderBook>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Quote-currency volume over the fetched window
    pub fn quote_volume(&self) -> f64 {
        self.closes
            .iter()
            .zip(self.volumes.iter())
            .map(|(c, v)| c * v)
            .sum()
    }

    /// ATR as a fraction of price, 0 when ATR is not available
    pub fn atr_ratio(&self) -> f64 {
        match self.indicators.atr14 {
            Some(atr) if self.current_price > 0.0 => atr / self.current_price,
            _ => 0.0,
        }
    }
}

/// Direction of the fear & greed index since the previous reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FearGreedTrend {
    Rising,
    Falling,
    #[default]
    Flat,
}

/// Market-wide sentiment context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIntelligence {
    pub fear_greed_index: f64,
    pub btc_dominance: f64,
    pub global_market_cap: f64,
    pub fear_greed_trend: FearGreedTrend,
}

impl Default for MarketIntelligence {
    fn default() -> Self {
        Self {
            fear_greed_index: 50.0,
            btc_dominance: 42.0,
            global_market_cap: 0.0,
            fear_greed_trend: FearGreedTrend::Flat,
        }
    }
}

impl MarketIntelligence {
    /// Fear & greed mapped to [0, 1] for the sentiment motif
    pub fn sentiment_score(&self) -> f64 {
        (self.fear_greed_index / 100.0).clamp(0.0, 1.0)
    }

    /// Position-size multiplier for extreme market moods
    pub fn risk_adjustment(&self) -> f64 {
        if self.fear_greed_index < 25.0 {
            0.7
        } else if self.fear_greed_index > 75.0 {
            0.8
        } else {
            1.0
        }
    }
}

/// Order submitted to the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Limit price; market order when absent
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Filled,
    PartiallyFilled,
    Cancelled,
}

/// Exchange acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_price: Option<Decimal>,
    /// True when the fill was simulated
    pub simulated: bool,
}

/// Free and locked balance of one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}
