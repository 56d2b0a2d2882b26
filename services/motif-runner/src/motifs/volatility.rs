//! Volatility motif
//!
//! High volatility carries no directional bias; it only pulls the signal
//! gently off neutral so the ensemble becomes less decisive.

use super::{Motif, MotifInput, MotifSignal, MotifType};
use crate::indicators::{liquidity_density, volatility_score};

const DAMPING: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
pub struct VolatilityMotif;

impl Motif for VolatilityMotif {
    fn motif_type(&self) -> MotifType {
        MotifType::Volatility
    }

    fn analyze(&self, input: &MotifInput<'_>) -> MotifSignal {
        let ind = input.indicators;
        let mut confidence = 0.4;

        let score = match ind.atr14 {
            Some(atr) => {
                confidence += 0.3;
                volatility_score(atr, input.price)
            }
            None => 0.5,
        };
        if ind.has_bollinger() {
            confidence += 0.3;
        }

        let signal = 0.5 + (score - 0.5) * DAMPING;

        let mut out = MotifSignal::new(MotifType::Volatility, signal, confidence)
            .with_detail("volatility_score", score);
        if let (Some(upper), Some(lower)) = (ind.bollinger_upper, ind.bollinger_lower) {
            if input.price > 0.0 {
                out = out.with_detail("band_width", (upper - lower) / input.price);
            }
        }
        if let Some(book) = input.order_book {
            out = out.with_detail("liquidity_density", liquidity_density(book));
        }
        out
    }
}
