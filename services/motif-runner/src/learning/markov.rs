//! Markov chain over discretised price states

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Discrete market regime derived from the ensemble signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceState {
    UptrendStrong,
    Uptrend,
    Neutral,
    Downtrend,
    DowntrendStrong,
}

impl PriceState {
    pub const ALL: [PriceState; 5] = [
        PriceState::UptrendStrong,
        PriceState::Uptrend,
        PriceState::Neutral,
        PriceState::Downtrend,
        PriceState::DowntrendStrong,
    ];
}

/// Bucket a signal into a price state.
///
/// Volatility only gates the strong-uptrend bucket: a strong signal during
/// high volatility is reported as a plain uptrend. No other bucket reads it.
pub fn get_price_state(signal: f64, volatility: f64) -> PriceState {
    if signal > 0.7 && volatility < 0.6 {
        PriceState::UptrendStrong
    } else if signal > 0.55 {
        PriceState::Uptrend
    } else if signal < 0.3 {
        PriceState::DowntrendStrong
    } else if signal < 0.45 {
        PriceState::Downtrend
    } else {
        PriceState::Neutral
    }
}

/// Sparse transition counts, from-state -> to-state -> count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkovChain {
    transitions: HashMap<PriceState, HashMap<PriceState, u64>>,
}

impl MarkovChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(&mut self, from: PriceState, to: PriceState) {
        *self
            .transitions
            .entry(from)
            .or_default()
            .entry(to)
            .or_insert(0) += 1;
    }

    pub fn count(&self, from: PriceState, to: PriceState) -> u64 {
        self.transitions
            .get(&from)
            .and_then(|row| row.get(&to))
            .copied()
            .unwrap_or(0)
    }

    /// Normalised transition probabilities out of `from`, in state order
    pub fn transition_probabilities(&self, from: PriceState) -> Vec<(PriceState, f64)> {
        let Some(row) = self.transitions.get(&from) else {
            return Vec::new();
        };
        let total: u64 = row.values().sum();
        if total == 0 {
            return Vec::new();
        }
        PriceState::ALL
            .iter()
            .filter_map(|s| row.get(s).map(|c| (*s, *c as f64 / total as f64)))
            .collect()
    }

    /// Sample the next state in proportion to observed frequencies.
    ///
    /// Returns `current` when nothing has been observed from it yet.
    pub fn predict_next_state<R: Rng + ?Sized>(&self, current: PriceState, rng: &mut R) -> PriceState {
        let probs = self.transition_probabilities(current);
        if probs.is_empty() {
            return current;
        }

        let draw: f64 = rng.gen();
        let mut cumulative = 0.0;
        for (state, p) in &probs {
            cumulative += p;
            if draw < cumulative {
                return *state;
            }
        }
        // float residue: fall back to the last observed state
        probs.last().map(|(s, _)| *s).unwrap_or(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_price_state_buckets() {
        assert_eq!(get_price_state(0.8, 0.2), PriceState::UptrendStrong);
        // high volatility demotes the strong bucket only
        assert_eq!(get_price_state(0.8, 0.9), PriceState::Uptrend);
        assert_eq!(get_price_state(0.6, 0.9), PriceState::Uptrend);
        assert_eq!(get_price_state(0.5, 0.0), PriceState::Neutral);
        assert_eq!(get_price_state(0.4, 0.0), PriceState::Downtrend);
        assert_eq!(get_price_state(0.2, 0.9), PriceState::DowntrendStrong);
    }

    #[test]
    fn test_predict_without_history_returns_current() {
        let chain = MarkovChain::new();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            chain.predict_next_state(PriceState::Downtrend, &mut rng),
            PriceState::Downtrend
        );
    }

    #[test]
    fn test_single_transition_is_deterministic() {
        let mut chain = MarkovChain::new();
        chain.record_transition(PriceState::Neutral, PriceState::Uptrend);
        chain.record_transition(PriceState::Neutral, PriceState::Uptrend);
        assert_eq!(chain.count(PriceState::Neutral, PriceState::Uptrend), 2);

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(
                chain.predict_next_state(PriceState::Neutral, &mut rng),
                PriceState::Uptrend
            );
        }
    }

    #[test]
    fn test_probabilities_normalised() {
        let mut chain = MarkovChain::new();
        chain.record_transition(PriceState::Uptrend, PriceState::Uptrend);
        chain.record_transition(PriceState::Uptrend, PriceState::Uptrend);
        chain.record_transition(PriceState::Uptrend, PriceState::Neutral);
        let probs = chain.transition_probabilities(PriceState::Uptrend);
        assert_eq!(probs.len(), 2);
        let total: f64 = probs.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(probs[0], (PriceState::Uptrend, 2.0 / 3.0));
    }

    #[test]
    fn test_same_seed_same_prediction() {
        let mut chain = MarkovChain::new();
        for to in PriceState::ALL {
            chain.record_transition(PriceState::Neutral, to);
        }
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(
                chain.predict_next_state(PriceState::Neutral, &mut a),
                chain.predict_next_state(PriceState::Neutral, &mut b)
            );
        }
    }
}
