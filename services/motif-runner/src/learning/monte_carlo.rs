//! Monte Carlo price-path simulation
//!
//! Runs independent multiplicative random walks from a base price and
//! summarises the terminal prices. Used for robustness reporting and, in the
//! multi-symbol engine, as a coarse directional vote.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCENARIOS: usize = 1000;
pub const DEFAULT_STEPS: usize = 100;
pub const DEFAULT_DRIFT: f64 = 0.0001;

/// Band around the current price inside which the simulated mean is a HOLD
const BIAS_BAND: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub scenarios: usize,
    pub steps: usize,
    pub drift: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            scenarios: DEFAULT_SCENARIOS,
            steps: DEFAULT_STEPS,
            drift: DEFAULT_DRIFT,
        }
    }
}

/// Distribution of simulated terminal prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p5: f64,
    pub p95: f64,
    #[serde(skip_serializing)]
    pub scenarios: Vec<f64>,
}

/// Directional read of a simulation relative to the current price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimulationBias {
    Buy,
    Sell,
    Hold,
}

impl SimulationSummary {
    fn from_scenarios(mut scenarios: Vec<f64>) -> Option<Self> {
        if scenarios.is_empty() {
            return None;
        }
        let n = scenarios.len();
        let mean = scenarios.iter().sum::<f64>() / n as f64;
        let variance = scenarios.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n as f64;

        let mut sorted = scenarios.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let percentile = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        scenarios.shrink_to_fit();
        Some(Self {
            mean,
            median,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[n - 1],
            p5: percentile(0.05),
            p95: percentile(0.95),
            scenarios,
        })
    }

    /// BUY when the simulated mean clears the price by 1%, SELL below -1%
    pub fn bias(&self, current_price: f64) -> SimulationBias {
        if self.mean > current_price * (1.0 + BIAS_BAND) {
            SimulationBias::Buy
        } else if self.mean < current_price * (1.0 - BIAS_BAND) {
            SimulationBias::Sell
        } else {
            SimulationBias::Hold
        }
    }
}

/// Simulate `params.scenarios` random walks of `params.steps` steps each.
///
/// Each step applies `price *= 1 + drift + (u - 0.5) * volatility` with
/// `u ~ U[0, 1)`. Returns `None` for a non-positive base price or zero
/// scenarios.
pub fn simulate_scenarios<R: Rng + ?Sized>(
    base_price: f64,
    volatility: f64,
    params: SimulationParams,
    rng: &mut R,
) -> Option<SimulationSummary> {
    if base_price <= 0.0 || !base_price.is_finite() || params.scenarios == 0 {
        return None;
    }
    let volatility = if volatility.is_finite() { volatility.max(0.0) } else { 0.0 };

    let scenarios: Vec<f64> = (0..params.scenarios)
        .map(|_| {
            let mut price = base_price;
            for _ in 0..params.steps {
                let shock = (rng.gen::<f64>() - 0.5) * volatility;
                price *= 1.0 + params.drift + shock;
            }
            price
        })
        .collect();

    SimulationSummary::from_scenarios(scenarios)
}
