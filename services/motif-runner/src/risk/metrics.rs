//! Performance metrics over closed trades

use serde::{Deserialize, Serialize};

use super::position::ClosedTrade;

const TRADING_DAYS: f64 = 252.0;

/// Summary statistics over the trade history.
///
/// Max drawdown is not tracked: balance is only realized at close, so there
/// is no equity curve to measure it on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage, 0-100
    pub win_rate: f64,
    /// Gross profit over gross loss; `None` when there are no losses
    pub profit_factor: Option<f64>,
    /// mean(pnl%) / stddev(pnl%) * sqrt(252); 0 when undefined
    pub sharpe_ratio: f64,
    pub total_pnl: f64,
    pub average_pnl_percent: f64,
}

impl PerformanceMetrics {
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        let total = trades.len();
        if total == 0 {
            return Self::default();
        }

        let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
        let losses = trades.iter().filter(|t| t.pnl < 0.0).count();
        let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
        let gross_loss: f64 = trades
            .iter()
            .filter(|t| t.pnl < 0.0)
            .map(|t| t.pnl.abs())
            .sum();

        let profit_factor = if gross_loss > 0.0 {
            Some(gross_profit / gross_loss)
        } else {
            None
        };

        let returns: Vec<f64> = trades.iter().map(|t| t.pnl_percent).collect();
        let mean = returns.iter().sum::<f64>() / total as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / total as f64;
        let std_dev = variance.sqrt();
        let sharpe_ratio = if std_dev > 0.0 && std_dev.is_finite() {
            mean / std_dev * TRADING_DAYS.sqrt()
        } else {
            0.0
        };

        Self {
            total_trades: total,
            winning_trades: wins,
            losing_trades: losses,
            win_rate: wins as f64 / total as f64 * 100.0,
            profit_factor,
            sharpe_ratio,
            total_pnl: trades.iter().map(|t| t.pnl).sum(),
            average_pnl_percent: mean,
        }
    }
}
