//! Sentiment motif - recent price change blended with market mood

use super::{clamp_unit, Motif, MotifInput, MotifSignal, MotifType};

/// History length at which confidence stops growing
const FULL_HISTORY: usize = 100;

/// Price-action sentiment plus an injected market-wide score.
///
/// The external score is set by the engine from the sentiment source
/// (fear & greed); the motif never updates it on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentMotif {
    external_score: Option<f64>,
}

impl SentimentMotif {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_external_score(&mut self, score: f64) {
        self.external_score = Some(clamp_unit(score));
    }

    pub fn clear_external_score(&mut self) {
        self.external_score = None;
    }

    /// Cached external score, neutral when unset
    pub fn external_score(&self) -> f64 {
        self.external_score.unwrap_or(0.5)
    }
}

fn price_change(history: &[f64]) -> f64 {
    match (history.first(), history.last()) {
        (Some(&first), Some(&last)) if history.len() >= 2 && first > 0.0 => {
            (last - first) / first
        }
        _ => 0.0,
    }
}

impl Motif for SentimentMotif {
    fn motif_type(&self) -> MotifType {
        MotifType::Sentiment
    }

    fn analyze(&self, input: &MotifInput<'_>) -> MotifSignal {
        let change = price_change(input.price_history);
        let price_sentiment = (change * 10.0).tanh() * 0.3 + 0.5;
        let external = self.external_score();
        let signal = price_sentiment * 0.6 + external * 0.4;

        let coverage = (input.price_history.len() as f64 / FULL_HISTORY as f64).min(1.0);
        let confidence = 0.3 + 0.4 * coverage;

        MotifSignal::new(MotifType::Sentiment, signal, confidence)
            .with_detail("price_change", change)
            .with_detail("external_score", external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::Indicators;

    fn run(motif: &SentimentMotif, history: &[f64]) -> MotifSignal {
        let ind = Indicators::default();
        motif.analyze(&MotifInput {
            indicators: &ind,
            price: history.last().copied().unwrap_or(100.0),
            order_book: None,
            price_history: history,
        })
    }

    #[test]
    fn test_neutral_without_history() {
        let s = run(&SentimentMotif::new(), &[]);
        assert!((s.signal - 0.5).abs() < 1e-12);
        assert!((s.confidence - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_rising_prices_and_external_score() {
        let mut motif = SentimentMotif::new();
        motif.set_external_score(0.8);
        let s = run(&motif, &[100.0, 105.0]);

        let expected = ((0.05f64 * 10.0).tanh() * 0.3 + 0.5) * 0.6 + 0.8 * 0.4;
        assert!((s.signal - expected).abs() < 1e-12);
        assert!((s.confidence - 0.308).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_caps_at_full_history() {
        let history = vec![100.0; 250];
        let s = run(&SentimentMotif::new(), &history);
        assert!((s.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_external_score_clamped() {
        let mut motif = SentimentMotif::new();
        motif.set_external_score(3.0);
        assert_eq!(motif.external_score(), 1.0);
        motif.clear_external_score();
        assert_eq!(motif.external_score(), 0.5);
    }
}
