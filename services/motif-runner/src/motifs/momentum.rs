//! Momentum motif - RSI buckets blended with the stochastic oscillator

use super::{Motif, MotifInput, MotifSignal, MotifType};

#[derive(Debug, Clone, Copy, Default)]
pub struct MomentumMotif;

/// RSI(14) mapped onto six directional buckets
fn rsi_bucket(rsi: f64) -> f64 {
    if rsi > 70.0 {
        0.7
    } else if rsi > 60.0 {
        0.65
    } else if rsi > 50.0 {
        0.55
    } else if rsi > 40.0 {
        0.45
    } else if rsi > 30.0 {
        0.35
    } else {
        0.3
    }
}

impl Motif for MomentumMotif {
    fn motif_type(&self) -> MotifType {
        MotifType::Momentum
    }

    fn analyze(&self, input: &MotifInput<'_>) -> MotifSignal {
        let ind = input.indicators;
        let mut signal = 0.5;
        let mut confidence = 0.3;

        if let Some(rsi) = ind.rsi14 {
            signal = rsi_bucket(rsi);
            confidence += 0.4;
        }

        if let (Some(k), Some(d)) = (ind.stochastic_k, ind.stochastic_d) {
            let stoch = (k + d) / 200.0;
            signal = signal * 0.7 + stoch * 0.3;
            confidence += 0.2;
        }

        let mut out = MotifSignal::new(MotifType::Momentum, signal, confidence);
        if let Some(rsi) = ind.rsi14 {
            out = out.with_detail("rsi14", rsi);
        }
        if let Some(k) = ind.stochastic_k {
            out = out.with_detail("stochastic_k", k);
        }
        out
    }
}
