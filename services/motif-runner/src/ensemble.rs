//! Motif ensemble - weighted aggregation of the four motifs
//!
//! The ensemble is the only owner of the motif weights. Weights change only
//! through [`MotifEnsemble::update_weights`], which the learning feedback loop
//! drives; motifs never touch them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::Indicators;
use crate::motifs::{
    clamp_unit, MomentumMotif, Motif, MotifInput, MotifSignal, MotifType, SentimentMotif,
    TrendMotif, VolatilityMotif,
};
use crate::types::OrderBook;

/// Normalised motif weights (always sum to 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotifWeights {
    weights: BTreeMap<MotifType, f64>,
}

impl Default for MotifWeights {
    fn default() -> Self {
        Self::equal()
    }
}

impl MotifWeights {
    pub fn equal() -> Self {
        let share = 1.0 / MotifType::ALL.len() as f64;
        Self {
            weights: MotifType::ALL.iter().map(|m| (*m, share)).collect(),
        }
    }

    /// Build from raw values; missing motifs get zero before normalisation
    pub fn from_raw(raw: &BTreeMap<MotifType, f64>) -> Self {
        let mut weights = Self {
            weights: MotifType::ALL
                .iter()
                .map(|m| (*m, sanitize(raw.get(m).copied().unwrap_or(0.0))))
                .collect(),
        };
        weights.normalize();
        weights
    }

    pub fn get(&self, motif: MotifType) -> f64 {
        self.weights.get(&motif).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MotifType, f64)> + '_ {
        self.weights.iter().map(|(m, w)| (*m, *w))
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<MotifType, f64> {
        &self.weights
    }

    /// Merge a partial update and renormalise
    pub fn merge(&mut self, update: &BTreeMap<MotifType, f64>) {
        for (motif, value) in update {
            self.weights.insert(*motif, sanitize(*value));
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        let total = self.sum();
        if total <= 0.0 || !total.is_finite() {
            *self = Self::equal();
            return;
        }
        for w in self.weights.values_mut() {
            *w /= total;
        }
    }
}

/// Negative and non-finite weights count as zero
fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Aggregated ensemble output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSignal {
    pub signal: f64,
    pub confidence: f64,
    pub motifs: Vec<MotifSignal>,
}

impl EnsembleSignal {
    /// Motif whose vote pulled hardest in the direction of the ensemble
    pub fn dominant_motif(&self) -> Option<MotifType> {
        let direction = if self.signal >= 0.5 { 1.0 } else { -1.0 };
        self.motifs
            .iter()
            .max_by(|a, b| {
                (a.bias() * direction)
                    .partial_cmp(&(b.bias() * direction))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|m| m.motif_type)
    }

    pub fn motif(&self, motif: MotifType) -> Option<&MotifSignal> {
        self.motifs.iter().find(|m| m.motif_type == motif)
    }
}

/// Runs all motifs and combines them with the current weights
pub struct MotifEnsemble {
    trend: TrendMotif,
    momentum: MomentumMotif,
    volatility: VolatilityMotif,
    sentiment: SentimentMotif,
    weights: MotifWeights,
}

impl Default for MotifEnsemble {
    fn default() -> Self {
        Self::new(MotifWeights::equal())
    }
}

impl MotifEnsemble {
    pub fn new(weights: MotifWeights) -> Self {
        Self {
            trend: TrendMotif,
            momentum: MomentumMotif,
            volatility: VolatilityMotif,
            sentiment: SentimentMotif::new(),
            weights,
        }
    }

    pub fn weights(&self) -> &MotifWeights {
        &self.weights
    }

    /// Inject the market-wide sentiment score used by the sentiment motif
    pub fn set_market_sentiment(&mut self, score: f64) {
        self.sentiment.set_external_score(score);
    }

    /// Analyze one symbol with every motif and aggregate
    pub fn analyze(
        &self,
        indicators: &Indicators,
        price: f64,
        symbol: &str,
        order_book: Option<&OrderBook>,
        price_history: &[f64],
    ) -> EnsembleSignal {
        let input = MotifInput {
            indicators,
            price,
            order_book,
            price_history,
        };

        let scorers: [&dyn Motif; 4] = [
            &self.trend,
            &self.momentum,
            &self.volatility,
            &self.sentiment,
        ];
        let motifs: Vec<MotifSignal> = scorers.iter().map(|m| m.analyze(&input)).collect();

        let mut signal = 0.0;
        let mut confidence = 0.0;
        for m in &motifs {
            let w = self.weights.get(m.motif_type);
            signal += m.signal * w;
            confidence += m.confidence * w;
        }

        let out = EnsembleSignal {
            signal: clamp_unit(signal),
            confidence: clamp_unit(confidence),
            motifs,
        };
        debug!(
            "Ensemble {} | signal {:.3} | confidence {:.3}",
            symbol, out.signal, out.confidence
        );
        out
    }

    /// Merge a (partial) weight update and renormalise so weights sum to 1
    pub fn update_weights(&mut self, update: &BTreeMap<MotifType, f64>) {
        self.weights.merge(update);
        debug!("Motif weights updated: {:?}", self.weights.as_map());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_weights_sum_to_one() {
        let w = MotifWeights::equal();
        assert!((w.sum() - 1.0).abs() < 1e-12);
        assert_eq!(w.get(MotifType::Trend), 0.25);
    }

    #[test]
    fn test_partial_update_renormalises() {
        let mut ensemble = MotifEnsemble::default();
        let mut update = BTreeMap::new();
        update.insert(MotifType::Trend, 0.85);
        ensemble.update_weights(&update);

        let w = ensemble.weights();
        // 0.85 + 3 * 0.25 = 1.6
        assert!((w.get(MotifType::Trend) - 0.85 / 1.6).abs() < 1e-12);
        assert!((w.get(MotifType::Momentum) - 0.25 / 1.6).abs() < 1e-12);
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_update_resets_to_equal() {
        let mut ensemble = MotifEnsemble::default();
        let update: BTreeMap<_, _> = MotifType::ALL.iter().map(|m| (*m, -1.0)).collect();
        ensemble.update_weights(&update);
        assert_eq!(ensemble.weights(), &MotifWeights::equal());
    }

    #[test]
    fn test_neutral_inputs_give_neutral_signal() {
        let ensemble = MotifEnsemble::default();
        let out = ensemble.analyze(&Indicators::default(), 100.0, "BTCUSDT", None, &[]);
        assert!((out.signal - 0.5).abs() < 1e-9);
        assert_eq!(out.motifs.len(), 4);
        // (0.5 + 0.3 + 0.4 + 0.3) / 4
        assert!((out.confidence - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_dominant_motif_follows_direction() {
        let ensemble = MotifEnsemble::default();
        let ind = Indicators {
            ema20: Some(105.0),
            ema50: Some(100.0),
            ..Default::default()
        };
        let out = ensemble.analyze(&ind, 110.0, "BTCUSDT", None, &[]);
        assert!(out.signal > 0.5);
        assert_eq!(out.dominant_motif(), Some(MotifType::Trend));
    }
}
