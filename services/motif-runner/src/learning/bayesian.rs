//! Beta-Binomial success-rate estimation per motif

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ensemble::MotifWeights;
use crate::motifs::MotifType;

/// Observed outcomes for one motif
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub successes: u64,
    pub failures: u64,
}

/// Uniform Beta(1, 1) prior updated with success/failure counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BayesianUpdater {
    counts: BTreeMap<MotifType, OutcomeCounts>,
}

impl BayesianUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&mut self, motif: MotifType, success: bool) {
        let entry = self.counts.entry(motif).or_default();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    pub fn counts(&self, motif: MotifType) -> OutcomeCounts {
        self.counts.get(&motif).copied().unwrap_or_default()
    }

    /// Posterior mean (1 + s) / (2 + s + f)
    pub fn estimate_success_rate(&self, motif: MotifType) -> f64 {
        let c = self.counts(motif);
        (1.0 + c.successes as f64) / (2.0 + c.successes as f64 + c.failures as f64)
    }

    /// Posterior weights: equal prior scaled by each motif's success rate
    pub fn update_weights(&self) -> MotifWeights {
        let prior = 1.0 / MotifType::ALL.len() as f64;
        let raw: BTreeMap<MotifType, f64> = MotifType::ALL
            .iter()
            .map(|m| (*m, prior * self.estimate_success_rate(*m)))
            .collect();
        MotifWeights::from_raw(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_with_ten_wins() {
        let mut bayes = BayesianUpdater::new();
        for _ in 0..10 {
            bayes.record_outcome(MotifType::Trend, true);
        }
        assert!((bayes.estimate_success_rate(MotifType::Trend) - 11.0 / 12.0).abs() < 1e-12);
        // untouched motif sits at the prior mean
        assert_eq!(bayes.estimate_success_rate(MotifType::Momentum), 0.5);
    }

    #[test]
    fn test_update_weights_favours_winners() {
        let mut bayes = BayesianUpdater::new();
        for _ in 0..10 {
            bayes.record_outcome(MotifType::Trend, true);
            bayes.record_outcome(MotifType::Sentiment, false);
        }
        let w = bayes.update_weights();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w.get(MotifType::Trend) > w.get(MotifType::Momentum));
        assert!(w.get(MotifType::Momentum) > w.get(MotifType::Sentiment));

        // rates 11/12, 1/2, 1/2, 1/12 normalised
        let total = 11.0 / 12.0 + 0.5 + 0.5 + 1.0 / 12.0;
        assert!((w.get(MotifType::Trend) - (11.0 / 12.0) / total).abs() < 1e-12);
    }

    #[test]
    fn test_no_history_gives_equal_weights() {
        let w = BayesianUpdater::new().update_weights();
        for m in MotifType::ALL {
            assert!((w.get(m) - 0.25).abs() < 1e-12);
        }
    }
}
