//! Technical indicators
//!
//! Pure functions over close/high/low series. No I/O, no state.
//!
//! - EMA (SMA-seeded), Wilder RSI, MACD(12, 26, 9)
//! - Bollinger Bands (20, 2σ), Wilder ATR(14), Stochastic(14, 3)
//! - Volatility score and order-book liquidity density
//!
//! [`TechnicalIndicators`] implements the math here directly. [`TaIndicators`]
//! delegates to the `ta` crate, whose RSI and ATR use EMA smoothing rather
//! than Wilder's.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, FastStochastic,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

use crate::config::IndicatorBackend;
use crate::types::OrderBook;

/// Closes required before any indicator is reported
pub const MIN_HISTORY: usize = 50;

/// ATR/price ratio that maps to a volatility score of 1.0
const MAX_ATR_RATIO: f64 = 0.05;

/// Notional depth (quote currency) that maps to a liquidity density of 1.0
const FULL_DEPTH_NOTIONAL: f64 = 1_000_000.0;

/// Latest value of every indicator the motifs read.
///
/// Each field is `None` when it could not be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub rsi14: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub atr14: Option<f64>,
    pub stochastic_k: Option<f64>,
    pub stochastic_d: Option<f64>,
}

impl Indicators {
    pub fn is_empty(&self) -> bool {
        *self == Indicators::default()
    }

    pub fn has_bollinger(&self) -> bool {
        self.bollinger_upper.is_some() && self.bollinger_lower.is_some()
    }
}

/// Computes indicator values from price series
pub trait IndicatorProvider: Send + Sync {
    fn compute(&self, closes: &[f64], highs: &[f64], lows: &[f64]) -> Indicators;
}

/// Standard indicator set with the usual periods
#[derive(Debug, Clone, Copy, Default)]
pub struct TechnicalIndicators;

impl IndicatorProvider for TechnicalIndicators {
    fn compute(&self, closes: &[f64], highs: &[f64], lows: &[f64]) -> Indicators {
        if closes.len() < MIN_HISTORY {
            return Indicators::default();
        }

        let (macd_line, macd_signal, macd_histogram) = match macd(closes, 12, 26, 9) {
            Some((m, s, h)) => (Some(m), Some(s), Some(h)),
            None => (None, None, None),
        };
        let (bollinger_upper, bollinger_middle, bollinger_lower) =
            match bollinger_bands(closes, 20, 2.0) {
                Some((u, m, l)) => (Some(u), Some(m), Some(l)),
                None => (None, None, None),
            };
        let (stochastic_k, stochastic_d) = match stochastic(closes, highs, lows, 14, 3) {
            Some((k, d)) => (Some(k), Some(d)),
            None => (None, None),
        };

        Indicators {
            ema20: ema(closes, 20).last().copied(),
            ema50: ema(closes, 50).last().copied(),
            macd_line,
            macd_signal,
            macd_histogram,
            rsi14: rsi(closes, 14),
            bollinger_upper,
            bollinger_middle,
            bollinger_lower,
            atr14: atr(highs, lows, closes, 14),
            stochastic_k,
            stochastic_d,
        }
    }
}

/// Indicator set computed by the `ta` crate's streaming indicators.
///
/// High/low columns that contradict the close (high below close, say) leave
/// ATR and the stochastic unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaIndicators;

impl TaIndicators {
    fn last_ema(closes: &[f64], period: usize) -> Option<f64> {
        let mut ema = ExponentialMovingAverage::new(period).ok()?;
        closes.iter().map(|&c| ema.next(c)).last().filter(|v| v.is_finite())
    }

    fn bars(closes: &[f64], highs: &[f64], lows: &[f64]) -> Option<Vec<DataItem>> {
        if highs.len() != closes.len() || lows.len() != closes.len() {
            return None;
        }
        closes
            .iter()
            .zip(highs)
            .zip(lows)
            .map(|((&close, &high), &low)| {
                DataItem::builder()
                    .open(close)
                    .high(high)
                    .low(low)
                    .close(close)
                    .volume(0.0)
                    .build()
                    .ok()
            })
            .collect()
    }
}

impl IndicatorProvider for TaIndicators {
    fn compute(&self, closes: &[f64], highs: &[f64], lows: &[f64]) -> Indicators {
        if closes.len() < MIN_HISTORY {
            return Indicators::default();
        }

        let mut out = Indicators {
            ema20: Self::last_ema(closes, 20),
            ema50: Self::last_ema(closes, 50),
            ..Indicators::default()
        };

        if let Ok(mut macd) = MovingAverageConvergenceDivergence::new(12, 26, 9) {
            if let Some(m) = closes.iter().map(|&c| macd.next(c)).last() {
                out.macd_line = Some(m.macd);
                out.macd_signal = Some(m.signal);
                out.macd_histogram = Some(m.histogram);
            }
        }
        if let Ok(mut rsi) = RelativeStrengthIndex::new(14) {
            out.rsi14 = closes.iter().map(|&c| rsi.next(c)).last().filter(|v| v.is_finite());
        }
        if let Ok(mut bands) = BollingerBands::new(20, 2.0) {
            if let Some(b) = closes.iter().map(|&c| bands.next(c)).last() {
                out.bollinger_upper = Some(b.upper);
                out.bollinger_middle = Some(b.average);
                out.bollinger_lower = Some(b.lower);
            }
        }

        let Some(bars) = Self::bars(closes, highs, lows) else {
            return out;
        };
        if let Ok(mut atr) = AverageTrueRange::new(14) {
            out.atr14 = bars.iter().map(|bar| atr.next(bar)).last();
        }
        if let (Ok(mut fast), Ok(mut smooth)) = (FastStochastic::new(14), SimpleMovingAverage::new(3)) {
            if let Some((k, d)) = bars
                .iter()
                .map(|bar| {
                    let k = fast.next(bar);
                    (k, smooth.next(k))
                })
                .last()
            {
                out.stochastic_k = Some(k);
                out.stochastic_d = Some(d);
            }
        }
        out
    }
}

/// Provider for the configured backend
pub fn provider_for(backend: IndicatorBackend) -> Arc<dyn IndicatorProvider> {
    match backend {
        IndicatorBackend::Wilder => Arc::new(TechnicalIndicators),
        IndicatorBackend::Ta => Arc::new(TaIndicators),
    }
}

/// Exponential moving average series, seeded with the SMA of the first
/// `period` values. Empty when there is not enough data.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev = v * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// Relative Strength Index with Wilder smoothing
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / p;

    for &c in &changes[period..] {
        avg_gain = (avg_gain * (p - 1.0) + c.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-c).max(0.0)) / p;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line, signal line and histogram
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64, f64)> {
    if fast >= slow || closes.len() < slow + signal {
        return None;
    }

    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let offset = slow - fast;
    let line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[i + offset] - s)
        .collect();

    let signal_line = ema(&line, signal);
    let m = *line.last()?;
    let s = *signal_line.last()?;
    Some((m, s, m - s))
}

/// Upper, middle and lower Bollinger bands
pub fn bollinger_bands(closes: &[f64], period: usize, width: f64) -> Option<(f64, f64, f64)> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
    let sd = variance.sqrt();
    Some((mean + width * sd, mean, mean - width * sd))
}

/// Average True Range with Wilder smoothing
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if period == 0 || highs.len() != n || lows.len() != n || n < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = (1..n)
        .map(|i| {
            let hl = highs[i] - lows[i];
            let hc = (highs[i] - closes[i - 1]).abs();
            let lc = (lows[i] - closes[i - 1]).abs();
            hl.max(hc).max(lc)
        })
        .collect();

    let p = period as f64;
    let mut value = true_ranges[..period].iter().sum::<f64>() / p;
    for tr in &true_ranges[period..] {
        value = (value * (p - 1.0) + tr) / p;
    }
    Some(value)
}

/// Stochastic oscillator (%K, %D), both in [0, 100]
pub fn stochastic(
    closes: &[f64],
    highs: &[f64],
    lows: &[f64],
    period: usize,
    smoothing: usize,
) -> Option<(f64, f64)> {
    let n = closes.len();
    if period == 0 || smoothing == 0 || highs.len() != n || lows.len() != n {
        return None;
    }
    if n < period + smoothing - 1 {
        return None;
    }

    let k_values: Vec<f64> = (period - 1..n)
        .map(|i| {
            let start = i + 1 - period;
            let hh = highs[start..=i].iter().cloned().fold(f64::MIN, f64::max);
            let ll = lows[start..=i].iter().cloned().fold(f64::MAX, f64::min);
            if hh - ll > 0.0 {
                (closes[i] - ll) / (hh - ll) * 100.0
            } else {
                50.0
            }
        })
        .collect();

    let k = *k_values.last()?;
    let tail = &k_values[k_values.len() - smoothing..];
    let d = tail.iter().sum::<f64>() / smoothing as f64;
    Some((k, d))
}

/// ATR relative to price, scaled so a 5% ATR is the maximum score of 1.0
pub fn volatility_score(atr: f64, price: f64) -> f64 {
    if price <= 0.0 || !atr.is_finite() || atr <= 0.0 {
        return 0.0;
    }
    ((atr / price) / MAX_ATR_RATIO).min(1.0)
}

/// Notional depth within 1% of mid, normalised to [0, 1]
pub fn liquidity_density(book: &OrderBook) -> f64 {
    let Some(mid) = book.mid_price() else {
        return 0.0;
    };
    let band = mid * 0.01;

    let depth: f64 = book
        .bids
        .iter()
        .chain(book.asks.iter())
        .filter(|lvl| (lvl.price - mid).abs() <= band)
        .map(|lvl| lvl.price * lvl.quantity)
        .sum();

    (depth / FULL_DEPTH_NOTIONAL).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookLevel;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let out = ema(&values, 3);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 2.0).abs() < 1e-12);
        // k = 0.5 -> 4 * 0.5 + 2 * 0.5
        assert!((out[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_insufficient_data() {
        assert!(ema(&[1.0, 2.0], 5).is_empty());
        assert!(ema(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_rsi_all_gains_and_flat() {
        assert_eq!(rsi(&rising(30), 14), Some(100.0));
        assert_eq!(rsi(&[5.0; 30], 14), Some(50.0));
        assert_eq!(rsi(&[1.0, 2.0], 14), None);
    }

    #[test]
    fn test_compute_requires_fifty_closes() {
        let closes = rising(49);
        let ind = TechnicalIndicators.compute(&closes, &closes, &closes);
        assert!(ind.is_empty());
    }

    #[test]
    fn test_compute_uptrend() {
        let closes = rising(120);
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let ind = TechnicalIndicators.compute(&closes, &highs, &lows);

        let (e20, e50) = (ind.ema20.unwrap(), ind.ema50.unwrap());
        assert!(e20 > e50);
        assert_eq!(ind.rsi14, Some(100.0));
        assert!(ind.atr14.unwrap() > 0.0);
        assert!(ind.has_bollinger());
        let k = ind.stochastic_k.unwrap();
        assert!((0.0..=100.0).contains(&k));
    }

    #[test]
    fn test_ta_backend_uptrend() {
        let closes = rising(120);
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let ind = TaIndicators.compute(&closes, &highs, &lows);

        assert!(ind.ema20.unwrap() > ind.ema50.unwrap());
        assert!(ind.macd_line.unwrap() > 0.0);
        assert!(ind.rsi14.unwrap() > 70.0);
        assert!(ind.atr14.unwrap() > 0.0);
        assert!(ind.has_bollinger());
        let (k, d) = (ind.stochastic_k.unwrap(), ind.stochastic_d.unwrap());
        assert!((0.0..=100.0).contains(&k));
        assert!((0.0..=100.0).contains(&d));

        assert!(TaIndicators.compute(&closes[..49], &highs[..49], &lows[..49]).is_empty());
    }

    #[test]
    fn test_ta_backend_rejects_inconsistent_bars() {
        let closes = rising(60);
        // Highs below closes
        let highs: Vec<f64> = closes.iter().map(|c| c - 5.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 10.0).collect();
        let ind = TaIndicators.compute(&closes, &highs, &lows);

        assert!(ind.ema20.is_some());
        assert!(ind.atr14.is_none());
        assert!(ind.stochastic_k.is_none());
    }

    #[test]
    fn test_backends_agree_on_bollinger() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let wilder = provider_for(IndicatorBackend::Wilder).compute(&closes, &closes, &closes);
        let ta = provider_for(IndicatorBackend::Ta).compute(&closes, &closes, &closes);

        assert!((wilder.bollinger_middle.unwrap() - ta.bollinger_middle.unwrap()).abs() < 1e-9);
        assert!((wilder.bollinger_upper.unwrap() - ta.bollinger_upper.unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_flat_prices() {
        let (u, m, l) = bollinger_bands(&[10.0; 25], 20, 2.0).unwrap();
        assert_eq!((u, m, l), (10.0, 10.0, 10.0));
    }

    #[test]
    fn test_volatility_score_caps_at_five_percent() {
        assert!((volatility_score(2.5, 100.0) - 0.5).abs() < 1e-12);
        assert_eq!(volatility_score(10.0, 100.0), 1.0);
        assert_eq!(volatility_score(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_liquidity_density() {
        let book = OrderBook {
            bids: vec![
                BookLevel { price: 99.9, quantity: 1000.0 },
                BookLevel { price: 90.0, quantity: 1_000_000.0 },
            ],
            asks: vec![BookLevel { price: 100.1, quantity: 1000.0 }],
        };
        // Only the two levels inside the 1% band count: ~200k notional
        let density = liquidity_density(&book);
        assert!((density - 0.2).abs() < 1e-3);
        assert_eq!(liquidity_density(&OrderBook::default()), 0.0);
    }
}
