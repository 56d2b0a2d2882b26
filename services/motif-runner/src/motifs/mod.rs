//! Motif scorers - heuristic signal generators
//!
//! Each motif maps indicators, price and (optionally) order book and price
//! history to a directional signal in [0, 1] (0.5 is neutral) and a
//! confidence in [0, 1]. Scorers are pure per call; only the sentiment motif
//! carries an externally injected cache.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators::Indicators;
use crate::types::OrderBook;

pub mod momentum;
pub mod sentiment;
pub mod trend;
pub mod volatility;

pub use momentum::MomentumMotif;
pub use sentiment::SentimentMotif;
pub use trend::TrendMotif;
pub use volatility::VolatilityMotif;

/// The four motif families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotifType {
    Trend,
    Momentum,
    Volatility,
    Sentiment,
}

impl MotifType {
    pub const ALL: [MotifType; 4] = [
        MotifType::Trend,
        MotifType::Momentum,
        MotifType::Volatility,
        MotifType::Sentiment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MotifType::Trend => "trend",
            MotifType::Momentum => "momentum",
            MotifType::Volatility => "volatility",
            MotifType::Sentiment => "sentiment",
        }
    }
}

impl std::fmt::Display for MotifType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one motif for one analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotifSignal {
    pub motif_type: MotifType,
    pub signal: f64,
    pub confidence: f64,
    /// Diagnostics for logs and the decision journal
    pub details: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl MotifSignal {
    pub fn new(motif_type: MotifType, signal: f64, confidence: f64) -> Self {
        Self {
            motif_type,
            signal: clamp_unit(signal),
            confidence: clamp_unit(confidence),
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: f64) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// Signed distance from neutral, in [-0.5, 0.5]
    pub fn bias(&self) -> f64 {
        self.signal - 0.5
    }
}

/// Inputs shared by every motif
#[derive(Debug, Clone, Copy)]
pub struct MotifInput<'a> {
    pub indicators: &'a Indicators,
    pub price: f64,
    pub order_book: Option<&'a OrderBook>,
    pub price_history: &'a [f64],
}

/// Core motif trait - all scorers implement this
pub trait Motif: Send + Sync {
    fn motif_type(&self) -> MotifType;

    fn analyze(&self, input: &MotifInput<'_>) -> MotifSignal;
}

/// Clamp to [0, 1], mapping NaN to neutral
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}
