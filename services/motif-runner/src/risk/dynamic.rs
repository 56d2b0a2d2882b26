//! Volatility-scaled risk parameters for the multi-symbol bot

use serde::{Deserialize, Serialize};

use crate::config::RotationConfig;
use crate::types::Side;

const MIN_RATIO: f64 = 0.5;
const MAX_RATIO: f64 = 3.0;

/// Per-symbol limits derived from current volatility
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicRiskParams {
    pub volatility_ratio: f64,
    pub max_position_fraction: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl DynamicRiskParams {
    /// Stop and target prices for an entry in `side`'s direction
    pub fn levels(&self, entry_price: f64, side: Side) -> (f64, f64) {
        let dir = side.sign();
        let stop = entry_price * (1.0 - dir * self.stop_loss_pct);
        let target = entry_price * (1.0 + dir * self.take_profit_pct);
        (stop, target)
    }
}

#[derive(Debug, Clone)]
pub struct DynamicRiskManager {
    baseline_volatility: f64,
    base_position_fraction: f64,
    base_stop_loss_pct: f64,
    base_take_profit_pct: f64,
    max_stop_loss_pct: f64,
}

impl DynamicRiskManager {
    pub fn new(config: &RotationConfig) -> Self {
        Self {
            baseline_volatility: config.baseline_volatility,
            base_position_fraction: config.base_position_fraction,
            base_stop_loss_pct: config.base_stop_loss_pct,
            base_take_profit_pct: config.base_take_profit_pct,
            max_stop_loss_pct: config.max_stop_loss_pct,
        }
    }

    /// Higher volatility: smaller size, wider (capped) stop, modestly wider target
    pub fn params_for(&self, volatility: f64) -> DynamicRiskParams {
        let ratio = if self.baseline_volatility > 0.0 && volatility.is_finite() {
            (volatility / self.baseline_volatility).clamp(MIN_RATIO, MAX_RATIO)
        } else {
            1.0
        };

        DynamicRiskParams {
            volatility_ratio: ratio,
            max_position_fraction: self.base_position_fraction / ratio,
            stop_loss_pct: (self.base_stop_loss_pct * ratio).min(self.max_stop_loss_pct),
            take_profit_pct: self.base_take_profit_pct * (1.0 + 0.25 * (ratio - 1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DynamicRiskManager {
        DynamicRiskManager::new(&RotationConfig::default())
    }

    #[test]
    fn test_baseline_volatility_keeps_base_params() {
        let p = manager().params_for(0.02);
        assert!((p.volatility_ratio - 1.0).abs() < 1e-12);
        assert!((p.max_position_fraction - 0.05).abs() < 1e-12);
        assert!((p.stop_loss_pct - 0.03).abs() < 1e-12);
        assert!((p.take_profit_pct - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_is_clamped() {
        let calm = manager().params_for(0.0);
        assert_eq!(calm.volatility_ratio, 0.5);
        assert!((calm.max_position_fraction - 0.1).abs() < 1e-12);

        let wild = manager().params_for(1.0);
        assert_eq!(wild.volatility_ratio, 3.0);
        assert!((wild.stop_loss_pct - 0.09).abs() < 1e-12);
        assert!((wild.take_profit_pct - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_stop_capped() {
        let mut config = RotationConfig::default();
        config.base_stop_loss_pct = 0.08;
        let p = DynamicRiskManager::new(&config).params_for(0.06);
        assert_eq!(p.stop_loss_pct, 0.15);
    }

    #[test]
    fn test_levels_follow_side() {
        let p = manager().params_for(0.02);
        let (stop, target) = p.levels(100.0, Side::Long);
        assert!((stop - 97.0).abs() < 1e-9);
        assert!((target - 106.0).abs() < 1e-9);
        let (stop, target) = p.levels(100.0, Side::Short);
        assert!((stop - 103.0).abs() < 1e-9);
        assert!((target - 94.0).abs() < 1e-9);
    }
}
