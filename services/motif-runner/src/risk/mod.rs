//! Risk manager - position sizing, validation and the position book
//!
//! The risk manager is the only component that mutates positions. Every
//! position moves through `Pending -> Open -> Closed`: it is recorded as
//! pending before the entry order goes out (so its risk counts against the
//! portfolio cap), confirmed once the exchange acknowledges, and rolled back
//! with [`RiskManager::abandon_position`] if the order fails.
//!
//! Balance changes only when PnL is realized on a close.

use std::collections::HashMap;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::errors::EngineError;
use crate::types::Side;

pub mod dynamic;
pub mod metrics;
pub mod position;

pub use dynamic::{DynamicRiskManager, DynamicRiskParams};
pub use metrics::PerformanceMetrics;
pub use position::{
    ClosedTrade, EntryContext, ExitReason, Position, PositionId, PositionState, ProfitLevel,
    ProfitTarget,
};

const QTY_EPSILON: f64 = 1e-12;

/// A trade proposal as seen by validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeProposal {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeValidation {
    pub valid: bool,
    pub reason: Option<String>,
}

impl TradeValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: f64,
    pub open_positions_count: usize,
    pub pending_positions_count: usize,
    /// Summed risk of open and pending positions
    pub total_open_risk: f64,
    pub realized_pnl: f64,
}

pub struct RiskManager {
    config: RiskConfig,
    balance: f64,
    positions: HashMap<PositionId, Position>,
    history: Vec<ClosedTrade>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            balance: config.initial_balance,
            config,
            positions: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Replace the balance, e.g. after syncing with the exchange
    pub fn set_balance(&mut self, balance: f64) -> Result<(), EngineError> {
        if !(balance > 0.0 && balance.is_finite()) {
            return Err(EngineError::Configuration(format!(
                "balance must be positive, got {}",
                balance
            )));
        }
        info!("Balance set: {:.2} -> {:.2}", self.balance, balance);
        self.balance = balance;
        Ok(())
    }

    pub fn set_atr_multiplier(&mut self, value: f64) -> Result<(), EngineError> {
        if !(value > 0.0 && value.is_finite()) {
            return Err(EngineError::Configuration(format!(
                "ATR multiplier must be positive, got {}",
                value
            )));
        }
        self.config.atr_multiplier = value;
        Ok(())
    }

    pub fn set_trailing_atr_multiplier(&mut self, value: f64) -> Result<(), EngineError> {
        if !(value > 0.0 && value.is_finite()) {
            return Err(EngineError::Configuration(format!(
                "trailing ATR multiplier must be positive, got {}",
                value
            )));
        }
        self.config.trailing_atr_multiplier = value;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sizing and levels
    // ------------------------------------------------------------------

    /// Risk-based position size, scaled by conviction and capped by notional.
    ///
    /// Scaling: confidence maps linearly to 40-100%, distance of the signal
    /// from neutral to 60-100%, full volatility removes 25%, and the
    /// sentiment multiplier applies as-is. Floored to the configured
    /// quantity precision.
    pub fn calculate_position_size(
        &self,
        entry_price: f64,
        stop_loss: f64,
        signal: f64,
        confidence: f64,
        volatility: f64,
        sentiment_risk_adjustment: f64,
    ) -> f64 {
        let distance = (entry_price - stop_loss).abs();
        if !(entry_price > 0.0) || !(distance > 0.0) || !distance.is_finite() {
            return 0.0;
        }

        let base = self.balance * self.config.max_position_risk / distance;
        let confidence_factor = 0.4 + 0.6 * unit(confidence);
        let strength_factor = 0.6 + 0.4 * unit((signal - 0.5).abs() * 2.0);
        let volatility_factor = 1.0 - 0.25 * unit(volatility);
        let sentiment_factor = if sentiment_risk_adjustment.is_finite() {
            sentiment_risk_adjustment.max(0.0)
        } else {
            1.0
        };

        let size = base * confidence_factor * strength_factor * volatility_factor * sentiment_factor;
        let cap = self.balance * self.config.max_notional_fraction / entry_price;
        floor_quantity(size.min(cap), self.config.quantity_precision)
    }

    /// ATR stop when available, else `2% + volatility * 3%` from entry
    pub fn calculate_stop_loss(
        &self,
        entry_price: f64,
        signal: f64,
        volatility: f64,
        atr: Option<f64>,
    ) -> f64 {
        let direction = Side::from_signal(signal).sign();
        match atr.filter(|a| *a > 0.0 && a.is_finite()) {
            Some(atr) => entry_price - direction * atr * self.config.atr_multiplier,
            None => {
                let pct = 0.02 + unit(volatility) * 0.03;
                entry_price * (1.0 - direction * pct)
            }
        }
    }

    /// Target on the profit side of entry at `ratio` times the stop distance
    pub fn calculate_take_profit(&self, entry_price: f64, stop_loss: f64, ratio: f64) -> f64 {
        let direction = if entry_price >= stop_loss { 1.0 } else { -1.0 };
        entry_price + direction * (entry_price - stop_loss).abs() * ratio
    }

    pub fn default_risk_reward(&self) -> f64 {
        self.config.default_risk_reward
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Summed risk of every pending and open position
    pub fn total_open_risk(&self) -> f64 {
        self.positions
            .values()
            .filter(|p| p.state != PositionState::Closed)
            .map(|p| p.risk_amount)
            .sum()
    }

    pub fn validate_trade(&self, proposal: &TradeProposal) -> TradeValidation {
        let TradeProposal {
            side,
            entry_price,
            stop_loss,
            take_profit,
            quantity,
        } = *proposal;

        if !(entry_price > 0.0) || !(quantity > 0.0) || !(stop_loss > 0.0) {
            return TradeValidation::reject(format!(
                "entry {:.4}, stop {:.4} and quantity {} must be positive",
                entry_price, stop_loss, quantity
            ));
        }

        let stop_ok = match side {
            Side::Long => stop_loss < entry_price && take_profit > entry_price,
            Side::Short => stop_loss > entry_price && take_profit < entry_price,
        };
        if !stop_ok {
            return TradeValidation::reject(format!(
                "{} levels on wrong side of entry {:.4}: stop {:.4}, target {:.4}",
                side, entry_price, stop_loss, take_profit
            ));
        }

        let notional = entry_price * quantity;
        let max_notional = self.balance * self.config.max_position_value_fraction;
        if notional > max_notional {
            return TradeValidation::reject(format!(
                "position value {:.2} exceeds {:.0}% of balance ({:.2})",
                notional,
                self.config.max_position_value_fraction * 100.0,
                max_notional
            ));
        }

        let risk = (entry_price - stop_loss).abs() * quantity;
        let reward = (take_profit - entry_price).abs() * quantity;
        let ratio = reward / risk;
        if ratio < self.config.min_risk_reward {
            return TradeValidation::reject(format!(
                "risk/reward {:.2} below minimum {:.2}",
                ratio, self.config.min_risk_reward
            ));
        }

        let total_risk = self.total_open_risk() + risk;
        let max_total = self.balance * self.config.max_total_risk;
        if total_risk > max_total {
            return TradeValidation::reject(format!(
                "total risk {:.2} would exceed portfolio cap {:.2}",
                total_risk, max_total
            ));
        }

        TradeValidation::ok()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Validate and record a pending position; side is taken from the signal
    pub fn open_position(
        &mut self,
        symbol: &str,
        signal: f64,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        quantity: f64,
    ) -> Result<Position, EngineError> {
        self.open_position_with_levels(
            symbol,
            Side::from_signal(signal),
            entry_price,
            stop_loss,
            take_profit,
            quantity,
        )
    }

    /// Validate and record a pending position for an explicit side
    pub fn open_position_with_levels(
        &mut self,
        symbol: &str,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        quantity: f64,
    ) -> Result<Position, EngineError> {
        let validation = self.validate_trade(&TradeProposal {
            side,
            entry_price,
            stop_loss,
            take_profit,
            quantity,
        });
        if !validation.valid {
            let reason = validation.reason.unwrap_or_default();
            warn!("Trade rejected for {}: {}", symbol, reason);
            return Err(EngineError::rejected(reason));
        }

        let position = Position::new(symbol, side, entry_price, stop_loss, take_profit, quantity);
        info!(
            "Position pending: {} {} {} @ {:.4} | stop {:.4} | target {:.4} | risk {:.2}",
            position.id, side, symbol, entry_price, stop_loss, take_profit, position.risk_amount
        );
        self.positions.insert(position.id, position.clone());
        Ok(position)
    }

    /// Mark a pending position as live after the entry order is acknowledged
    pub fn confirm_position(&mut self, id: PositionId, order_id: &str) -> Result<(), EngineError> {
        let position = self.expect_state(id, PositionState::Pending)?;
        position.state = PositionState::Open;
        position.order_id = Some(order_id.to_string());
        info!("Position open: {} (order {})", id, order_id);
        Ok(())
    }

    /// Roll back a pending position whose entry order failed
    pub fn abandon_position(&mut self, id: PositionId) -> Result<Position, EngineError> {
        self.expect_state(id, PositionState::Pending)?;
        let position = self
            .positions
            .remove(&id)
            .ok_or(EngineError::PositionNotFound(id))?;
        warn!("Position abandoned: {} {}", id, position.symbol);
        Ok(position)
    }

    pub fn set_entry_context(
        &mut self,
        id: PositionId,
        context: EntryContext,
    ) -> Result<(), EngineError> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(EngineError::PositionNotFound(id))?;
        position.entry_context = Some(context);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Supervision
    // ------------------------------------------------------------------

    /// Ratchet the stop behind the best price seen; never loosens.
    ///
    /// Returns the new stop when it moved.
    pub fn update_trailing_stop(
        &mut self,
        id: PositionId,
        current_price: f64,
        atr: f64,
    ) -> Result<Option<f64>, EngineError> {
        let trailing_mult = self.config.trailing_atr_multiplier;
        let position = self.expect_state(id, PositionState::Open)?;
        if !(atr > 0.0 && atr.is_finite() && current_price > 0.0) {
            return Ok(None);
        }
        let distance = atr * trailing_mult;

        let candidate = match position.side {
            Side::Long => {
                let high = position.highest_price.map_or(current_price, |h| h.max(current_price));
                position.highest_price = Some(high);
                (high - distance).max(position.initial_stop)
            }
            Side::Short => {
                let low = position.lowest_price.map_or(current_price, |l| l.min(current_price));
                position.lowest_price = Some(low);
                (low + distance).min(position.initial_stop)
            }
        };

        let tighter = match position.side {
            Side::Long => candidate > position.stop_loss,
            Side::Short => candidate < position.stop_loss,
        };
        if !tighter {
            return Ok(None);
        }

        debug!(
            "Trailing stop {}: {:.4} -> {:.4}",
            id, position.stop_loss, candidate
        );
        position.stop_loss = candidate;
        position.trailing_stop_price = Some(candidate);
        position.dynamic_stop = true;
        position.refresh_risk();
        Ok(Some(candidate))
    }

    /// Move the stop to `new_stop` if that tightens it. Returns whether it moved.
    pub fn update_position_stop(
        &mut self,
        id: PositionId,
        new_stop: f64,
    ) -> Result<bool, EngineError> {
        let position = self.expect_state(id, PositionState::Open)?;
        let tighter = new_stop.is_finite()
            && match position.side {
                Side::Long => new_stop > position.stop_loss,
                Side::Short => new_stop < position.stop_loss,
            };
        if tighter {
            position.stop_loss = new_stop;
            position.dynamic_stop = true;
            position.refresh_risk();
        }
        Ok(tighter)
    }

    /// Report the profit tier `current_price` has reached, if any.
    ///
    /// The 1% tier closes everything and wins when both are crossed; the
    /// 0.5% tier closes half and only fires before any partial close.
    /// Read-only: a tier is consumed by the close that follows, not by the check.
    pub fn check_profit_targets(
        &self,
        id: PositionId,
        current_price: f64,
    ) -> Result<Option<ProfitTarget>, EngineError> {
        let RiskConfig {
            partial_take_profit_pct,
            full_take_profit_pct,
            partial_close_fraction,
            quantity_precision,
            ..
        } = self.config;
        let position = self
            .positions
            .get(&id)
            .ok_or(EngineError::PositionNotFound(id))?;
        if position.state != PositionState::Open {
            return Err(EngineError::InvalidPositionState {
                id,
                state: position.state,
                expected: PositionState::Open,
            });
        }
        let change = position.favourable_move(current_price);

        if change >= full_take_profit_pct && !position.full_target_hit {
            return Ok(Some(ProfitTarget {
                level: ProfitLevel::Full,
                should_close: true,
                close_quantity: position.quantity,
            }));
        }

        if change >= partial_take_profit_pct && position.partial_closed_quantity <= 0.0 {
            let half = floor_quantity(position.quantity * partial_close_fraction, quantity_precision);
            let close_quantity = if half > 0.0 { half } else { position.quantity };
            return Ok(Some(ProfitTarget {
                level: ProfitLevel::Half,
                should_close: true,
                close_quantity,
            }));
        }

        Ok(None)
    }

    /// Close all or part of an open position at `exit_price`
    pub fn close_position(
        &mut self,
        id: PositionId,
        exit_price: f64,
        quantity: Option<f64>,
    ) -> Result<ClosedTrade, EngineError> {
        self.close_position_with_reason(id, exit_price, quantity, ExitReason::Manual)
    }

    pub fn close_position_with_reason(
        &mut self,
        id: PositionId,
        exit_price: f64,
        quantity: Option<f64>,
        reason: ExitReason,
    ) -> Result<ClosedTrade, EngineError> {
        if !(exit_price > 0.0 && exit_price.is_finite()) {
            return Err(EngineError::rejected(format!(
                "exit price must be positive, got {}",
                exit_price
            )));
        }
        if let Some(q) = quantity {
            if !(q > 0.0) {
                return Err(EngineError::rejected(format!(
                    "close quantity must be positive, got {}",
                    q
                )));
            }
        }

        let position = self.expect_state(id, PositionState::Open)?;
        let closed_quantity = quantity.map_or(position.quantity, |q| q.min(position.quantity));
        let full = position.quantity - closed_quantity <= QTY_EPSILON;

        let pnl = position.pnl_at(exit_price, closed_quantity);
        let cost = position.entry_price * closed_quantity;
        let pnl_percent = if cost > 0.0 { pnl / cost * 100.0 } else { 0.0 };

        position.realized_pnl += pnl;
        position.partial_closed_quantity += closed_quantity;
        if full {
            position.quantity = 0.0;
            position.state = PositionState::Closed;
            if reason == ExitReason::ProfitTier {
                position.full_target_hit = true;
            }
        } else {
            position.quantity -= closed_quantity;
        }
        position.refresh_risk();

        let trade = ClosedTrade {
            position: position.clone(),
            closed_quantity,
            exit_price,
            pnl,
            pnl_percent,
            closed_at: chrono::Utc::now(),
            reason,
        };

        if full {
            self.positions.remove(&id);
        }
        self.balance += pnl;

        info!(
            "{} {} {} {:.4} @ {:.4} | PnL {:.2} ({:.2}%) | {:?} | balance {:.2}",
            if full { "Closed" } else { "Partially closed" },
            trade.position.side,
            trade.position.symbol,
            closed_quantity,
            exit_price,
            pnl,
            pnl_percent,
            reason,
            self.balance
        );
        self.history.push(trade.clone());
        Ok(trade)
    }

    /// Per-tick supervision: trail the stop, then close at the stop or target if crossed
    pub fn update_position(
        &mut self,
        id: PositionId,
        current_price: f64,
        atr: Option<f64>,
    ) -> Result<Option<ClosedTrade>, EngineError> {
        if let Some(atr) = atr {
            self.update_trailing_stop(id, current_price, atr)?;
        }

        match self.triggered_exit(id, current_price)? {
            Some((level, reason)) => self
                .close_position_with_reason(id, level, None, reason)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Exit level and reason when `current_price` crosses the stop or target
    pub fn triggered_exit(
        &mut self,
        id: PositionId,
        current_price: f64,
    ) -> Result<Option<(f64, ExitReason)>, EngineError> {
        let position = self.expect_state(id, PositionState::Open)?;
        if position.stop_hit(current_price) {
            Ok(Some((position.stop_loss, ExitReason::StopLoss)))
        } else if position.target_hit(current_price) {
            Ok(Some((position.take_profit, ExitReason::TakeProfit)))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    /// Pending and open positions, oldest first
    pub fn positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.positions.values().collect();
        positions.sort_by_key(|p| (p.created_at, p.id));
        positions
    }

    pub fn open_positions_for(&self, symbol: &str) -> Vec<&Position> {
        self.positions()
            .into_iter()
            .filter(|p| p.is_open() && p.symbol == symbol)
            .collect()
    }

    pub fn history(&self) -> &[ClosedTrade] {
        &self.history
    }

    pub fn calculate_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::from_trades(&self.history)
    }

    pub fn account_state(&self) -> AccountState {
        AccountState {
            balance: self.balance,
            open_positions_count: self.positions.values().filter(|p| p.is_open()).count(),
            pending_positions_count: self
                .positions
                .values()
                .filter(|p| p.state == PositionState::Pending)
                .count(),
            total_open_risk: self.total_open_risk(),
            realized_pnl: self.history.iter().map(|t| t.pnl).sum(),
        }
    }

    fn expect_state(
        &mut self,
        id: PositionId,
        expected: PositionState,
    ) -> Result<&mut Position, EngineError> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(EngineError::PositionNotFound(id))?;
        if position.state != expected {
            return Err(EngineError::InvalidPositionState {
                id,
                state: position.state,
                expected,
            });
        }
        Ok(position)
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Floor a quantity toward zero at `precision` decimal places
pub fn floor_quantity(quantity: f64, precision: u32) -> f64 {
    if !(quantity > 0.0) || !quantity.is_finite() {
        return 0.0;
    }
    Decimal::from_f64(quantity)
        .map(|d| d.round_dp_with_strategy(precision, RoundingStrategy::ToZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default())
    }

    fn open_long(rm: &mut RiskManager, entry: f64, stop: f64, target: f64, qty: f64) -> PositionId {
        let p = rm
            .open_position("BTCUSDT", 0.7, entry, stop, target, qty)
            .unwrap();
        rm.confirm_position(p.id, "order-1").unwrap();
        p.id
    }

    #[test]
    fn test_take_profit_from_stop_distance() {
        let rm = manager();
        assert!((rm.calculate_take_profit(100.0, 98.0, 2.5) - 105.0).abs() < 1e-12);
        assert!((rm.calculate_take_profit(100.0, 102.0, 2.5) - 95.0).abs() < 1e-12);
    }

    #[test]
    fn test_stop_loss_uses_atr_then_percentage() {
        let rm = manager();
        assert_eq!(rm.calculate_stop_loss(100.0, 0.7, 0.5, Some(1.5)), 97.0);
        assert_eq!(rm.calculate_stop_loss(100.0, 0.3, 0.5, Some(1.5)), 103.0);
        // 2% + 0.5 * 3% = 3.5%
        assert!((rm.calculate_stop_loss(100.0, 0.7, 0.5, None) - 96.5).abs() < 1e-9);
        assert!((rm.calculate_stop_loss(100.0, 0.2, 0.0, None) - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_position_size_capped_and_floored() {
        let rm = manager();
        // risk sizing gives far more than the 2.5% notional cap of 250
        assert_eq!(rm.calculate_position_size(100.0, 98.0, 0.9, 1.0, 0.0, 1.0), 2.5);
        // 1/3 of a unit floors at two decimals
        assert_eq!(rm.calculate_position_size(750.0, 700.0, 0.9, 1.0, 0.0, 1.0), 0.33);
        assert_eq!(rm.calculate_position_size(100.0, 100.0, 0.9, 1.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_position_size_scales_with_conviction() {
        let rm = manager();
        // wide stop keeps the result under the notional cap
        let strong = rm.calculate_position_size(100.0, 50.0, 1.0, 1.0, 0.0, 1.0);
        let weak = rm.calculate_position_size(100.0, 50.0, 0.5, 0.0, 1.0, 0.7);
        // base = 200 / 50 = 4, capped at 2.5
        assert_eq!(strong, 2.5);
        // 4 * 0.4 * 0.6 * 0.75 * 0.7 = 0.504
        assert_eq!(weak, 0.5);
    }

    #[test]
    fn test_validation_reasons() {
        let rm = manager();
        let base = TradeProposal {
            side: Side::Long,
            entry_price: 100.0,
            stop_loss: 98.0,
            take_profit: 105.0,
            quantity: 2.0,
        };
        assert!(rm.validate_trade(&base).valid);

        let wrong_side = rm.validate_trade(&TradeProposal {
            stop_loss: 101.0,
            ..base
        });
        assert!(!wrong_side.valid);
        assert!(wrong_side.reason.unwrap().contains("wrong side"));

        let too_big = rm.validate_trade(&TradeProposal {
            quantity: 11.0,
            ..base
        });
        assert!(too_big.reason.unwrap().contains("position value"));

        let poor_ratio = rm.validate_trade(&TradeProposal {
            take_profit: 103.0,
            ..base
        });
        assert!(poor_ratio.reason.unwrap().contains("risk/reward"));
    }

    #[test]
    fn test_pending_risk_counts_toward_cap() {
        let mut rm = manager();
        // cap is 600; each position risks 250
        rm.open_position("A", 0.7, 1000.0, 750.0, 1625.0, 1.0)
            .unwrap();
        rm.open_position("B", 0.7, 1000.0, 750.0, 1625.0, 1.0)
            .unwrap();
        let err = rm
            .open_position("C", 0.7, 1000.0, 750.0, 1625.0, 1.0)
            .unwrap_err();
        assert!(err.rejection_reason().unwrap().contains("portfolio cap"));
        assert_eq!(rm.positions().len(), 2);
    }

    #[test]
    fn test_lifecycle_confirm_and_abandon() {
        let mut rm = manager();
        let p = rm
            .open_position("BTCUSDT", 0.7, 100.0, 98.0, 105.0, 2.0)
            .unwrap();
        assert_eq!(p.state, PositionState::Pending);
        // pending positions cannot be closed
        assert!(matches!(
            rm.close_position(p.id, 101.0, None),
            Err(EngineError::InvalidPositionState { .. })
        ));

        let abandoned = rm.abandon_position(p.id).unwrap();
        assert_eq!(abandoned.id, p.id);
        assert!(rm.positions().is_empty());
        assert_eq!(rm.balance(), 10_000.0);

        let id = open_long(&mut rm, 100.0, 98.0, 105.0, 2.0);
        assert!(rm.position(id).unwrap().is_open());
        assert!(rm.abandon_position(id).is_err());
    }

    #[test]
    fn test_close_long_realizes_pnl() {
        let mut rm = RiskManager::new(RiskConfig {
            max_position_value_fraction: 1.0,
            max_total_risk: 1.0,
            ..RiskConfig::default()
        });
        let id = open_long(&mut rm, 100.0, 98.0, 105.0, 10.0);
        let trade = rm.close_position(id, 103.0, None).unwrap();
        assert!((trade.pnl - 30.0).abs() < 1e-9);
        assert!((trade.pnl_percent - 3.0).abs() < 1e-9);
        assert!(!trade.is_partial());
        assert!(rm.position(id).is_none());
        assert!((rm.balance() - 10_030.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_close_keeps_position_open() {
        let mut rm = manager();
        let id = open_long(&mut rm, 100.0, 98.0, 105.0, 2.0);
        let first = rm.close_position(id, 101.0, Some(0.5)).unwrap();
        assert!(first.is_partial());
        assert!((first.pnl - 0.5).abs() < 1e-9);

        let p = rm.position(id).unwrap();
        assert_eq!(p.quantity, 1.5);
        assert_eq!(p.partial_closed_quantity, 0.5);
        assert!((p.risk_amount - 3.0).abs() < 1e-9);

        let last = rm.close_position(id, 102.0, None).unwrap();
        assert!((last.pnl - 3.0).abs() < 1e-9);
        assert_eq!(last.closed_quantity, 1.5);
        assert_eq!(last.position.quantity, 0.0);
        assert_eq!(last.position.partial_closed_quantity, last.position.original_quantity);
        assert!((rm.account_state().realized_pnl - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_profit_tiers() {
        let mut rm = manager();
        let id = open_long(&mut rm, 100.0, 98.0, 105.0, 2.0);

        let full = rm.check_profit_targets(id, 101.2).unwrap().unwrap();
        assert_eq!(full.level, ProfitLevel::Full);
        assert!(full.should_close);
        assert_eq!(full.close_quantity, 2.0);
        // checking alone consumes nothing
        let again = rm.check_profit_targets(id, 101.5).unwrap().unwrap();
        assert_eq!(again.level, ProfitLevel::Full);
        assert_eq!(again.close_quantity, 2.0);
        let trade = rm
            .close_position_with_reason(id, 101.5, Some(again.close_quantity), ExitReason::ProfitTier)
            .unwrap();
        assert!(trade.position.full_target_hit);
        assert!(rm.position(id).is_none());

        let id = open_long(&mut rm, 100.0, 98.0, 105.0, 2.0);
        let half = rm.check_profit_targets(id, 100.6).unwrap().unwrap();
        assert_eq!(half.level, ProfitLevel::Half);
        assert_eq!(half.close_quantity, 1.0);
        rm.close_position(id, 100.6, Some(half.close_quantity)).unwrap();
        assert_eq!(rm.check_profit_targets(id, 100.7).unwrap(), None);
        assert_eq!(rm.check_profit_targets(id, 100.2).unwrap(), None);
    }

    #[test]
    fn test_trailing_stop_ratchets_long() {
        let mut rm = manager();
        let id = open_long(&mut rm, 100.0, 98.0, 110.0, 1.0);
        // 104 - 1.2 * 2 = 101.6
        let moved = rm.update_trailing_stop(id, 104.0, 2.0).unwrap().unwrap();
        assert!((moved - 101.6).abs() < 1e-9);
        // pullback does not loosen
        assert_eq!(rm.update_trailing_stop(id, 102.0, 2.0).unwrap(), None);
        assert_eq!(rm.position(id).unwrap().stop_loss, moved);
        assert_eq!(rm.position(id).unwrap().highest_price, Some(104.0));
    }

    #[test]
    fn test_trailing_stop_never_below_initial() {
        let mut rm = manager();
        let id = open_long(&mut rm, 100.0, 98.0, 110.0, 1.0);
        assert_eq!(rm.update_trailing_stop(id, 100.0, 5.0).unwrap(), None);
        assert_eq!(rm.position(id).unwrap().stop_loss, 98.0);
    }

    #[test]
    fn test_update_position_stops_out_at_level() {
        let mut rm = manager();
        let id = open_long(&mut rm, 100.0, 98.0, 105.0, 1.0);
        assert!(rm.update_position(id, 99.0, None).unwrap().is_none());
        let trade = rm.update_position(id, 97.0, None).unwrap().unwrap();
        assert_eq!(trade.exit_price, 98.0);
        assert_eq!(trade.reason, ExitReason::StopLoss);
        assert!((trade.pnl + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_position_short_take_profit() {
        let mut rm = manager();
        let p = rm
            .open_position("ETHUSDT", 0.2, 100.0, 102.0, 95.0, 1.0)
            .unwrap();
        assert_eq!(p.side, Side::Short);
        rm.confirm_position(p.id, "o").unwrap();
        let trade = rm.update_position(p.id, 94.0, None).unwrap().unwrap();
        assert_eq!(trade.exit_price, 95.0);
        assert_eq!(trade.reason, ExitReason::TakeProfit);
        assert!((trade.pnl - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics() {
        let mut rm = manager();
        assert_eq!(rm.calculate_metrics(), PerformanceMetrics::default());

        let a = open_long(&mut rm, 100.0, 98.0, 105.0, 1.0);
        rm.close_position(a, 102.0, None).unwrap();
        let metrics = rm.calculate_metrics();
        assert_eq!(metrics.win_rate, 100.0);
        assert_eq!(metrics.profit_factor, None);
        assert_eq!(metrics.sharpe_ratio, 0.0);

        let b = open_long(&mut rm, 100.0, 98.0, 105.0, 1.0);
        rm.close_position(b, 99.0, None).unwrap();
        let metrics = rm.calculate_metrics();
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.win_rate, 50.0);
        assert!((metrics.profit_factor.unwrap() - 2.0).abs() < 1e-9);
        // mean 0.5%, population std 1.5%
        assert!((metrics.sharpe_ratio - (0.5 / 1.5) * 252f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_setters_keep_prior_value_on_rejection() {
        let mut rm = manager();
        assert!(rm.set_atr_multiplier(0.0).is_err());
        assert!(rm.set_atr_multiplier(f64::NAN).is_err());
        assert_eq!(rm.config().atr_multiplier, 2.0);
        rm.set_atr_multiplier(3.0).unwrap();
        assert_eq!(rm.config().atr_multiplier, 3.0);

        assert!(rm.set_trailing_atr_multiplier(-1.0).is_err());
        assert_eq!(rm.config().trailing_atr_multiplier, 1.2);
    }

    #[test]
    fn test_unknown_position() {
        let mut rm = manager();
        let ghost = PositionId::new();
        assert_eq!(
            rm.close_position(ghost, 100.0, None).unwrap_err(),
            EngineError::PositionNotFound(ghost)
        );
    }
}
