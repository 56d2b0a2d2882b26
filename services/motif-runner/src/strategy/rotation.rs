//! Market rotation: rank the universe by liquidity, trade the top N

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::config::RotationConfig;
use crate::types::MarketSnapshot;

/// Quote volume at which the volume component saturates
const VOLUME_SATURATION: f64 = 1e9;
const VOLUME_WEIGHT: f64 = 0.7;
const VOLATILITY_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSymbol {
    pub symbol: String,
    pub liquidity_score: f64,
    pub quote_volume: f64,
    pub volatility: f64,
}

/// `0.7 * min(volume / 1e9, 1) + 0.3 / (1 + 10 * volatility)`
pub fn liquidity_score(quote_volume: f64, volatility: f64) -> f64 {
    let volume_score = if quote_volume.is_finite() && quote_volume > 0.0 {
        (quote_volume / VOLUME_SATURATION).min(1.0)
    } else {
        0.0
    };
    let volatility = if volatility.is_finite() {
        volatility.max(0.0)
    } else {
        0.0
    };
    VOLUME_WEIGHT * volume_score + VOLATILITY_WEIGHT / (1.0 + 10.0 * volatility)
}

#[derive(Debug, Clone)]
pub struct MarketRotation {
    universe: Vec<String>,
    top_n: usize,
}

impl MarketRotation {
    pub fn new(config: &RotationConfig) -> Self {
        Self {
            universe: config.universe.clone(),
            top_n: config.top_n,
        }
    }

    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    pub fn rank(&self, snapshot: &MarketSnapshot) -> RankedSymbol {
        let quote_volume = snapshot.quote_volume();
        let volatility = snapshot.atr_ratio();
        RankedSymbol {
            symbol: snapshot.symbol.clone(),
            liquidity_score: liquidity_score(quote_volume, volatility),
            quote_volume,
            volatility,
        }
    }

    /// Highest-scoring symbols first, at most `top_n`. Ties keep input order.
    pub fn select(&self, snapshots: &[MarketSnapshot]) -> Vec<RankedSymbol> {
        let mut ranked: Vec<RankedSymbol> = snapshots.iter().map(|s| self.rank(s)).collect();
        ranked.sort_by(|a, b| {
            b.liquidity_score
                .partial_cmp(&a.liquidity_score)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(self.top_n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::Indicators;
    use chrono::Utc;

    fn snapshot(symbol: &str, price: f64, volume: f64, atr: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: symbol.to_string(),
            current_price: price,
            closes: vec![price; 10],
            highs: vec![price; 10],
            lows: vec![price; 10],
            volumes: vec![volume; 10],
            indicators: Indicators {
                atr14: Some(atr),
                ..Indicators::default()
            },
            order_book: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_score_components() {
        assert!((liquidity_score(2e9, 0.0) - 1.0).abs() < 1e-12);
        assert!((liquidity_score(5e8, 0.1) - (0.35 + 0.15)).abs() < 1e-12);
        assert!((liquidity_score(f64::NAN, f64::NAN) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_select_orders_and_truncates() {
        let mut config = RotationConfig::default();
        config.top_n = 2;
        let rotation = MarketRotation::new(&config);

        let snapshots = vec![
            snapshot("THIN", 1.0, 1_000.0, 0.01),
            snapshot("DEEP", 100.0, 2e7, 1.0),
            snapshot("WILD", 100.0, 2e7, 20.0),
        ];
        let picked = rotation.select(&snapshots);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].symbol, "DEEP");
        assert_eq!(picked[1].symbol, "WILD");
        assert!((picked[0].quote_volume - 2e10).abs() < 1.0);
    }
}
