//! Trend motif - EMA alignment with MACD confirmation

use super::{Motif, MotifInput, MotifSignal, MotifType};

/// EMA spread (as a fraction of EMA50) that saturates the strong-trend bias
const SPREAD_SATURATION: f64 = 0.05;
const MACD_NUDGE: f64 = 0.05;

#[derive(Debug, Clone, Copy, Default)]
pub struct TrendMotif;

impl Motif for TrendMotif {
    fn motif_type(&self) -> MotifType {
        MotifType::Trend
    }

    fn analyze(&self, input: &MotifInput<'_>) -> MotifSignal {
        let ind = input.indicators;
        let price = input.price;
        let mut signal = 0.5;
        let mut confidence = 0.5;

        if let (Some(ema20), Some(ema50)) = (ind.ema20, ind.ema50) {
            confidence += 0.3;
            let strength = if ema50 > 0.0 {
                ((ema20 - ema50).abs() / ema50 / SPREAD_SATURATION).min(1.0)
            } else {
                0.0
            };

            signal = match (ema20 > ema50, price > ema20) {
                (true, true) => 0.8 + 0.2 * strength,
                (false, false) => 0.2 - 0.2 * strength,
                // Uptrend but price pulled back under the fast EMA
                (true, false) => 0.6,
                (false, true) => 0.4,
            };
        }

        if let Some(hist) = ind.macd_histogram {
            confidence += 0.2;
            if hist > 0.0 && signal > 0.5 {
                signal += MACD_NUDGE;
            } else if hist < 0.0 && signal < 0.5 {
                signal -= MACD_NUDGE;
            }
        }

        let mut out = MotifSignal::new(MotifType::Trend, signal, confidence.min(1.0));
        if let (Some(e20), Some(e50)) = (ind.ema20, ind.ema50) {
            out = out.with_detail("ema20", e20).with_detail("ema50", e50);
        }
        if let Some(hist) = ind.macd_histogram {
            out = out.with_detail("macd_histogram", hist);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::Indicators;

    fn run(ind: Indicators, price: f64) -> MotifSignal {
        TrendMotif.analyze(&MotifInput {
            indicators: &ind,
            price,
            order_book: None,
            price_history: &[],
        })
    }

    #[test]
    fn test_no_indicators_is_neutral() {
        let s = run(Indicators::default(), 100.0);
        assert_eq!(s.signal, 0.5);
        assert_eq!(s.confidence, 0.5);
    }

    #[test]
    fn test_strong_uptrend() {
        let ind = Indicators {
            ema20: Some(105.0),
            ema50: Some(100.0),
            macd_histogram: Some(0.4),
            ..Default::default()
        };
        let s = run(ind, 110.0);
        // spread 5% saturates -> 1.0, MACD nudge clamped
        assert_eq!(s.signal, 1.0);
        assert!((s.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_strong_downtrend_with_macd() {
        let ind = Indicators {
            ema20: Some(99.0),
            ema50: Some(100.0),
            macd_histogram: Some(-0.2),
            ..Default::default()
        };
        let s = run(ind, 98.0);
        // strength = 0.01 / 0.05 = 0.2 -> 0.2 - 0.04 - 0.05
        assert!((s.signal - 0.11).abs() < 1e-9);
    }

    #[test]
    fn test_intermediate_cases() {
        let up_pullback = Indicators {
            ema20: Some(101.0),
            ema50: Some(100.0),
            ..Default::default()
        };
        assert_eq!(run(up_pullback, 100.5).signal, 0.6);
        assert!((run(up_pullback, 100.5).confidence - 0.8).abs() < 1e-12);

        let down_bounce = Indicators {
            ema20: Some(99.0),
            ema50: Some(100.0),
            ..Default::default()
        };
        assert_eq!(run(down_bounce, 99.5).signal, 0.4);
    }

    #[test]
    fn test_macd_disagreement_does_not_nudge() {
        let ind = Indicators {
            ema20: Some(101.0),
            ema50: Some(100.0),
            macd_histogram: Some(-1.0),
            ..Default::default()
        };
        assert_eq!(run(ind, 100.5).signal, 0.6);
    }
}
