//! Single-symbol strategy engine
//!
//! One cycle: fetch -> supervise open positions -> update history -> ensemble
//! -> classify -> gate -> execute. A cycle whose market data is missing
//! returns [`CycleOutcome::Skipped`] before touching any state.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Settings, StrategyConfig};
use crate::ensemble::{MotifEnsemble, MotifWeights};
use crate::errors::EngineError;
use crate::exchange::{free_balance, order_request, Collaborators, OrderGateway};
use crate::indicators::volatility_score;
use crate::learning::{
    get_price_state, Action, AdaptiveLearningEngine, PriceState, SimulationBias,
    SimulationSummary, TradeOutcome,
};
use crate::motifs::{MotifSignal, MotifType};
use crate::risk::{
    AccountState, ClosedTrade, EntryContext, ExitReason, PerformanceMetrics, Position,
    PositionId, RiskManager,
};
use crate::types::{MarketIntelligence, MarketSnapshot, OrderSide, Side};

/// Volatility assumed when ATR is unavailable
const NEUTRAL_VOLATILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Long,
    Short,
    WeakLong,
    WeakShort,
    Neutral,
    ClosePosition,
}

impl TradeAction {
    /// Direction implied by the action, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            TradeAction::Long | TradeAction::WeakLong => Some(Side::Long),
            TradeAction::Short | TradeAction::WeakShort => Some(Side::Short),
            TradeAction::Neutral | TradeAction::ClosePosition => None,
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, TradeAction::Long | TradeAction::Short)
    }
}

/// Map an ensemble signal and confidence to an action
pub fn classify_action(signal: f64, confidence: f64, config: &StrategyConfig) -> TradeAction {
    if signal > config.long_threshold && confidence > config.min_confidence {
        TradeAction::Long
    } else if signal < config.short_threshold && confidence > config.min_confidence {
        TradeAction::Short
    } else if signal > config.weak_long_threshold && signal <= config.long_threshold {
        TradeAction::WeakLong
    } else if signal >= config.short_threshold && signal < config.weak_short_threshold {
        TradeAction::WeakShort
    } else {
        TradeAction::Neutral
    }
}

/// Bot-level gate layered over classification: higher confidence and a
/// wider signal separation. Weak actions never pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionGate {
    pub min_confidence: f64,
    pub long_signal: f64,
    pub short_signal: f64,
}

impl ExecutionGate {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            min_confidence: config.execution_min_confidence,
            long_signal: config.execution_long_signal,
            short_signal: config.execution_short_signal,
        }
    }

    pub fn allows(&self, decision: &Decision) -> bool {
        if decision.confidence <= self.min_confidence {
            return false;
        }
        match decision.action {
            TradeAction::Long => decision.signal > self.long_signal,
            TradeAction::Short => decision.signal < self.short_signal,
            TradeAction::ClosePosition => {
                decision.signal > self.long_signal || decision.signal < self.short_signal
            }
            _ => false,
        }
    }
}

/// Outcome of evaluating one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: String,
    pub action: TradeAction,
    pub signal: f64,
    pub confidence: f64,
    pub price: f64,
    pub volatility: f64,
    pub price_state: PriceState,
    pub predicted_state: PriceState,
    pub suggested_action: Action,
    pub dominant_motif: Option<MotifType>,
    pub motifs: Vec<MotifSignal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub executed: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Opened,
    Closed,
    Rejected,
    OrderFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub position_id: Option<PositionId>,
    pub order_side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub order_id: Option<String>,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub decision: Decision,
    pub executions: Vec<ExecutionRecord>,
    pub closed: Vec<ClosedTrade>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing was evaluated and no state changed
    Skipped(EngineError),
    Completed(CycleReport),
}

/// Monte Carlo view of the last observed market
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobustnessReport {
    pub symbol: String,
    pub base_price: f64,
    pub volatility: f64,
    pub simulation: SimulationSummary,
    pub bias: SimulationBias,
    pub metrics: PerformanceMetrics,
    pub account: AccountState,
}

/// Append to a bounded log, evicting the oldest entries
pub(crate) fn push_bounded<T>(log: &mut VecDeque<T>, item: T, retention: usize) {
    log.push_back(item);
    while log.len() > retention {
        log.pop_front();
    }
}

impl ExecutionRecord {
    pub(crate) fn rejected(
        symbol: &str,
        order_side: OrderSide,
        quantity: f64,
        price: f64,
        reason: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            position_id: None,
            order_side,
            quantity,
            price,
            order_id: None,
            status: ExecutionStatus::Rejected,
            reason: Some(reason.to_string()),
        }
    }
}

/// Place the entry order for a pending position, then confirm it or roll it back
pub(crate) async fn submit_entry(
    risk: &mut RiskManager,
    orders: &dyn OrderGateway,
    position: &Position,
) -> ExecutionRecord {
    let order_side = position.side.entry_order();
    let mut record = ExecutionRecord {
        timestamp: Utc::now(),
        symbol: position.symbol.clone(),
        position_id: Some(position.id),
        order_side,
        quantity: position.quantity,
        price: position.entry_price,
        order_id: None,
        status: ExecutionStatus::Rejected,
        reason: None,
    };

    let Some(request) = order_request(
        &position.symbol,
        order_side,
        position.quantity,
        position.entry_price,
    ) else {
        if let Err(e) = risk.abandon_position(position.id) {
            warn!("Rollback of {} failed: {}", position.id, e);
        }
        record.reason = Some("invalid order quantity".to_string());
        return record;
    };

    match orders.place_order(&request).await {
        Ok(ack) => match risk.confirm_position(position.id, &ack.order_id) {
            Ok(()) => {
                record.status = ExecutionStatus::Opened;
                record.order_id = Some(ack.order_id);
            }
            Err(e) => {
                warn!("Confirm failed for {}: {}", position.id, e);
                record.reason = Some(e.to_string());
            }
        },
        Err(e) => {
            let err = EngineError::ExternalOrderFailure {
                symbol: position.symbol.clone(),
                reason: e.to_string(),
            };
            warn!("Entry order failed, rolling back {}: {}", position.id, err);
            if let Err(rollback) = risk.abandon_position(position.id) {
                warn!("Rollback of {} failed: {}", position.id, rollback);
            }
            record.status = ExecutionStatus::OrderFailed;
            record.reason = Some(err.to_string());
        }
    }
    record
}

/// Place the exit order; the book only changes once the exchange accepts it.
///
/// Returns `None` when the position is unknown or the quantity cannot be
/// expressed as an order.
pub(crate) async fn submit_exit(
    risk: &mut RiskManager,
    orders: &dyn OrderGateway,
    id: PositionId,
    exit_price: f64,
    quantity: Option<f64>,
    reason: ExitReason,
) -> Option<(ExecutionRecord, Option<ClosedTrade>)> {
    let (symbol, side, open_quantity) = {
        let p = risk.position(id)?;
        (p.symbol.clone(), p.side, p.quantity)
    };
    let close_quantity = quantity.unwrap_or(open_quantity).min(open_quantity);
    let order_side = side.exit_order();
    let request = order_request(&symbol, order_side, close_quantity, exit_price)?;

    let mut record = ExecutionRecord {
        timestamp: Utc::now(),
        symbol: symbol.clone(),
        position_id: Some(id),
        order_side,
        quantity: close_quantity,
        price: exit_price,
        order_id: None,
        status: ExecutionStatus::Closed,
        reason: Some(format!("{:?}", reason)),
    };

    let trade = match orders.place_order(&request).await {
        Ok(ack) => {
            record.order_id = Some(ack.order_id);
            match risk.close_position_with_reason(id, exit_price, Some(close_quantity), reason) {
                Ok(trade) => Some(trade),
                Err(e) => {
                    warn!("Close of {} failed after exit order: {}", id, e);
                    record.status = ExecutionStatus::Rejected;
                    record.reason = Some(e.to_string());
                    None
                }
            }
        }
        Err(e) => {
            let err = EngineError::ExternalOrderFailure {
                symbol,
                reason: e.to_string(),
            };
            warn!("Exit order failed, position {} stays open: {}", id, err);
            record.status = ExecutionStatus::OrderFailed;
            record.reason = Some(err.to_string());
            None
        }
    };
    Some((record, trade))
}

pub struct StrategyEngine {
    symbol: String,
    interval: String,
    candle_limit: usize,
    config: StrategyConfig,
    gate: ExecutionGate,
    ensemble: MotifEnsemble,
    learning: AdaptiveLearningEngine,
    risk: RiskManager,
    collaborators: Collaborators,
    histories: HashMap<String, VecDeque<f64>>,
    last_states: HashMap<String, PriceState>,
    market: MarketIntelligence,
    /// (price, ATR / price) from the last evaluated cycle
    last_observation: Option<(f64, f64)>,
    decisions: VecDeque<DecisionRecord>,
    executions: VecDeque<ExecutionRecord>,
}

impl StrategyEngine {
    pub fn new(settings: &Settings, collaborators: Collaborators) -> Self {
        let weights = MotifWeights::from_raw(&settings.strategy.initial_weights);
        Self {
            symbol: settings.bot.symbol.clone(),
            interval: settings.bot.interval.clone(),
            candle_limit: settings.bot.candle_limit,
            config: settings.strategy.clone(),
            gate: ExecutionGate::from_config(&settings.strategy),
            ensemble: MotifEnsemble::new(weights),
            learning: AdaptiveLearningEngine::new(&settings.learning),
            risk: RiskManager::new(settings.risk),
            collaborators,
            histories: HashMap::new(),
            last_states: HashMap::new(),
            market: MarketIntelligence::default(),
            last_observation: None,
            decisions: VecDeque::new(),
            executions: VecDeque::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }

    pub fn ensemble(&self) -> &MotifEnsemble {
        &self.ensemble
    }

    pub fn learning(&self) -> &AdaptiveLearningEngine {
        &self.learning
    }

    pub fn market(&self) -> &MarketIntelligence {
        &self.market
    }

    pub fn history(&self, symbol: &str) -> Option<&VecDeque<f64>> {
        self.histories.get(symbol)
    }

    pub fn decisions(&self) -> &VecDeque<DecisionRecord> {
        &self.decisions
    }

    pub fn executions(&self) -> &VecDeque<ExecutionRecord> {
        &self.executions
    }

    /// Replace the risk balance with the exchange's free quote balance
    pub async fn sync_balance(&mut self, quote_asset: &str) -> Result<(), EngineError> {
        let balances = self
            .collaborators
            .orders
            .fetch_balances()
            .await
            .map_err(|e| EngineError::DataUnavailable {
                symbol: quote_asset.to_string(),
                reason: e.to_string(),
            })?;
        match free_balance(&balances, quote_asset) {
            Some(free) if free > 0.0 => self.risk.set_balance(free),
            _ => {
                warn!("No {} balance reported; keeping {:.2}", quote_asset, self.risk.balance());
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Cycle
    // ------------------------------------------------------------------

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let snapshot = match self
            .collaborators
            .market_data
            .fetch(&self.symbol, &self.interval, self.candle_limit)
            .await
        {
            Ok(Some(s)) if s.current_price > 0.0 => s,
            Ok(_) => return self.skip("no market data"),
            Err(e) => return self.skip(&e.to_string()),
        };
        if snapshot.indicators.is_empty() {
            let reason = format!("insufficient history ({} closes)", snapshot.closes.len());
            return self.skip(&reason);
        }

        self.market = self.collaborators.market_intelligence().await;
        self.ensemble.set_market_sentiment(self.market.sentiment_score());

        let mut executions = Vec::new();
        let mut closed = Vec::new();
        self.supervise_positions(&snapshot, &mut executions, &mut closed)
            .await;

        let decision = self.evaluate(&snapshot);
        let gate_open = self.gate.allows(&decision);
        let before = executions.len();

        let note = match decision.action {
            TradeAction::ClosePosition if gate_open => {
                self.close_reversals(&decision, &mut executions, &mut closed)
                    .await;
                None
            }
            TradeAction::Long | TradeAction::Short if gate_open => {
                self.execute_entry(&snapshot, &decision, &mut executions)
                    .await
            }
            TradeAction::Neutral => None,
            action => {
                debug!(
                    "{} {:?} held back by execution gate (signal {:.3}, confidence {:.3})",
                    decision.symbol, action, decision.signal, decision.confidence
                );
                Some("below execution gate".to_string())
            }
        };

        let executed = executions[before..]
            .iter()
            .any(|e| matches!(e.status, ExecutionStatus::Opened | ExecutionStatus::Closed));
        push_bounded(
            &mut self.decisions,
            DecisionRecord {
                decision: decision.clone(),
                executed,
                note,
            },
            self.config.log_retention,
        );
        for record in &executions {
            push_bounded(&mut self.executions, record.clone(), self.config.log_retention);
        }

        CycleOutcome::Completed(CycleReport {
            decision,
            executions,
            closed,
        })
    }

    fn skip(&self, reason: &str) -> CycleOutcome {
        let err = EngineError::DataUnavailable {
            symbol: self.symbol.clone(),
            reason: reason.to_string(),
        };
        warn!("Skipping cycle: {}", err);
        CycleOutcome::Skipped(err)
    }

    /// Run the ensemble and learning models over one snapshot
    pub fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Decision {
        let symbol = snapshot.symbol.clone();
        let price = snapshot.current_price;
        let capacity = self.config.history_capacity;

        let history: Vec<f64> = {
            let buffer = match self.histories.get_mut(&symbol) {
                Some(buffer) => {
                    buffer.push_back(price);
                    buffer
                }
                None => {
                    let start = snapshot.closes.len().saturating_sub(capacity);
                    self.histories
                        .entry(symbol.clone())
                        .or_insert_with(|| snapshot.closes[start..].iter().copied().collect())
                }
            };
            while buffer.len() > capacity {
                buffer.pop_front();
            }
            buffer.iter().copied().collect()
        };

        let ensemble = self.ensemble.analyze(
            &snapshot.indicators,
            price,
            &symbol,
            snapshot.order_book.as_ref(),
            &history,
        );

        let volatility = snapshot
            .indicators
            .atr14
            .map_or(NEUTRAL_VOLATILITY, |atr| volatility_score(atr, price));
        let price_state = get_price_state(ensemble.signal, volatility);
        if let Some(previous) = self.last_states.insert(symbol.clone(), price_state) {
            self.learning.observe_transition(previous, price_state);
        }
        let predicted_state = self.learning.predict_next_state(price_state);
        let suggested_action = self.learning.select_action(price_state);
        self.last_observation = Some((price, snapshot.atr_ratio()));

        let mut action = classify_action(ensemble.signal, ensemble.confidence, &self.config);
        if let Some(side) = action.side() {
            let reversal = self
                .risk
                .open_positions_for(&symbol)
                .iter()
                .any(|p| p.side == side.opposite());
            if reversal {
                action = TradeAction::ClosePosition;
            }
        }

        info!(
            "{} | {:?} | signal {:.3} | confidence {:.3} | state {:?} -> {:?} | Q suggests {:?}",
            symbol,
            action,
            ensemble.signal,
            ensemble.confidence,
            price_state,
            predicted_state,
            suggested_action
        );

        Decision {
            dominant_motif: ensemble.dominant_motif(),
            symbol,
            action,
            signal: ensemble.signal,
            confidence: ensemble.confidence,
            price,
            volatility,
            price_state,
            predicted_state,
            suggested_action,
            motifs: ensemble.motifs,
            timestamp: Utc::now(),
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Trail stops, then exit on stop, target or profit tier
    async fn supervise_positions(
        &mut self,
        snapshot: &MarketSnapshot,
        executions: &mut Vec<ExecutionRecord>,
        closed: &mut Vec<ClosedTrade>,
    ) {
        let price = snapshot.current_price;
        let ids: Vec<PositionId> = self
            .risk
            .open_positions_for(&snapshot.symbol)
            .iter()
            .map(|p| p.id)
            .collect();

        for id in ids {
            if let Some(atr) = snapshot.indicators.atr14 {
                if let Err(e) = self.risk.update_trailing_stop(id, price, atr) {
                    warn!("Trailing stop update failed for {}: {}", id, e);
                }
            }

            let exit = match self.risk.triggered_exit(id, price) {
                Ok(Some((level, reason))) => Some((level, None, reason)),
                Ok(None) => match self.risk.check_profit_targets(id, price) {
                    Ok(Some(target)) if target.should_close => {
                        info!("Profit tier {} reached for {}", target.level, id);
                        Some((price, Some(target.close_quantity), ExitReason::ProfitTier))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Profit check failed for {}: {}", id, e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Exit check failed for {}: {}", id, e);
                    None
                }
            };

            if let Some((level, quantity, reason)) = exit {
                if let Some(trade) = self.exit_position(id, level, quantity, reason, executions).await {
                    closed.push(trade);
                }
            }
        }
    }

    async fn close_reversals(
        &mut self,
        decision: &Decision,
        executions: &mut Vec<ExecutionRecord>,
        closed: &mut Vec<ClosedTrade>,
    ) {
        let direction = Side::from_signal(decision.signal);
        let ids: Vec<PositionId> = self
            .risk
            .open_positions_for(&decision.symbol)
            .iter()
            .filter(|p| p.side == direction.opposite())
            .map(|p| p.id)
            .collect();
        for id in ids {
            if let Some(trade) = self
                .exit_position(id, decision.price, None, ExitReason::Reversal, executions)
                .await
            {
                closed.push(trade);
            }
        }
    }

    async fn exit_position(
        &mut self,
        id: PositionId,
        exit_price: f64,
        quantity: Option<f64>,
        reason: ExitReason,
        executions: &mut Vec<ExecutionRecord>,
    ) -> Option<ClosedTrade> {
        let (record, trade) = submit_exit(
            &mut self.risk,
            self.collaborators.orders.as_ref(),
            id,
            exit_price,
            quantity,
            reason,
        )
        .await?;
        executions.push(record);
        let trade = trade?;
        self.apply_outcome(&trade).await;
        Some(trade)
    }

    /// Size, validate, record pending, place the order, then confirm or roll back
    async fn execute_entry(
        &mut self,
        snapshot: &MarketSnapshot,
        decision: &Decision,
        executions: &mut Vec<ExecutionRecord>,
    ) -> Option<String> {
        let symbol = decision.symbol.as_str();
        let side = decision.action.side()?;
        if self.risk.positions().iter().any(|p| p.symbol == symbol) {
            debug!("{} already has a position; not adding", symbol);
            return Some("position already open".to_string());
        }

        let price = decision.price;
        let stop = self.risk.calculate_stop_loss(
            price,
            decision.signal,
            decision.volatility,
            snapshot.indicators.atr14,
        );
        let target = self
            .risk
            .calculate_take_profit(price, stop, self.risk.default_risk_reward());
        let quantity = self.risk.calculate_position_size(
            price,
            stop,
            decision.signal,
            decision.confidence,
            decision.volatility,
            self.market.risk_adjustment(),
        );

        let position = match self
            .risk
            .open_position(symbol, decision.signal, price, stop, target, quantity)
        {
            Ok(p) => p,
            Err(e) => {
                let reason = e.rejection_reason().unwrap_or("rejected").to_string();
                executions.push(ExecutionRecord::rejected(
                    symbol,
                    side.entry_order(),
                    quantity,
                    price,
                    &reason,
                ));
                return Some(reason);
            }
        };

        let context = EntryContext {
            motif: decision.dominant_motif.unwrap_or(MotifType::Trend),
            state: decision.price_state,
            action: Action::from(side),
        };
        if let Err(e) = self.risk.set_entry_context(position.id, context) {
            warn!("Could not attach entry context to {}: {}", position.id, e);
        }

        let record = submit_entry(&mut self.risk, self.collaborators.orders.as_ref(), &position).await;
        let note = match record.status {
            ExecutionStatus::Opened => None,
            _ => record.reason.clone(),
        };
        executions.push(record);
        note
    }

    // ------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------

    /// Close (part of) a position and feed the realized result back into
    /// learning and the ensemble weights
    pub async fn record_trade_outcome(
        &mut self,
        id: PositionId,
        exit_price: f64,
        quantity: Option<f64>,
        reason: ExitReason,
    ) -> Result<ClosedTrade, EngineError> {
        let trade = self
            .risk
            .close_position_with_reason(id, exit_price, quantity, reason)?;
        self.apply_outcome(&trade).await;
        Ok(trade)
    }

    async fn apply_outcome(&mut self, trade: &ClosedTrade) {
        match trade.position.entry_context {
            Some(context) => {
                let to_state = self
                    .last_states
                    .get(&trade.position.symbol)
                    .copied()
                    .unwrap_or(context.state);
                self.learning.record_trade_outcome(&TradeOutcome {
                    motif: context.motif,
                    success: trade.pnl > 0.0,
                    from_state: context.state,
                    to_state,
                    action: context.action,
                    reward: trade.pnl_percent / 100.0,
                });
                let learned = self.learning.learned_weights();
                self.ensemble.update_weights(learned.as_map());
            }
            None => debug!("No entry context for {}; learning skipped", trade.position.id),
        }

        self.collaborators.store_trade(trade).await;
    }

    /// Simulate forward from the last observed price and ATR volatility
    pub fn robustness_report(&mut self) -> Option<RobustnessReport> {
        let (base_price, volatility) = self.last_observation?;
        let simulation = self.learning.simulate(base_price, volatility)?;
        Some(RobustnessReport {
            symbol: self.symbol.clone(),
            base_price,
            volatility,
            bias: simulation.bias(base_price),
            simulation,
            metrics: self.risk.calculate_metrics(),
            account: self.risk.account_state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StrategyConfig {
        StrategyConfig::default()
    }

    #[test]
    fn test_classification_thresholds() {
        let c = config();
        assert_eq!(classify_action(0.60, 0.5, &c), TradeAction::Long);
        assert_eq!(classify_action(0.60, 0.3, &c), TradeAction::Neutral);
        assert_eq!(classify_action(0.40, 0.5, &c), TradeAction::Short);
        assert_eq!(classify_action(0.55, 0.9, &c), TradeAction::WeakLong);
        assert_eq!(classify_action(0.58, 0.9, &c), TradeAction::WeakLong);
        assert_eq!(classify_action(0.45, 0.9, &c), TradeAction::WeakShort);
        assert_eq!(classify_action(0.42, 0.9, &c), TradeAction::WeakShort);
        assert_eq!(classify_action(0.50, 0.9, &c), TradeAction::Neutral);
        assert_eq!(classify_action(0.52, 0.9, &c), TradeAction::Neutral);
    }

    fn decision(action: TradeAction, signal: f64, confidence: f64) -> Decision {
        Decision {
            symbol: "BTCUSDT".to_string(),
            action,
            signal,
            confidence,
            price: 100.0,
            volatility: 0.4,
            price_state: PriceState::Neutral,
            predicted_state: PriceState::Neutral,
            suggested_action: Action::Neutral,
            dominant_motif: None,
            motifs: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_gate_requires_both_layers() {
        let gate = ExecutionGate::from_config(&config());
        assert!(gate.allows(&decision(TradeAction::Long, 0.6, 0.7)));
        assert!(!gate.allows(&decision(TradeAction::Long, 0.6, 0.6)));
        assert!(gate.allows(&decision(TradeAction::Short, 0.4, 0.7)));
        assert!(!gate.allows(&decision(TradeAction::WeakLong, 0.57, 0.9)));
        assert!(gate.allows(&decision(TradeAction::ClosePosition, 0.40, 0.8)));
        assert!(!gate.allows(&decision(TradeAction::ClosePosition, 0.47, 0.8)));
        assert!(!gate.allows(&decision(TradeAction::Neutral, 0.5, 0.9)));
    }

    #[test]
    fn test_push_bounded_evicts_oldest() {
        let mut log = VecDeque::new();
        for i in 0..5 {
            push_bounded(&mut log, i, 3);
        }
        assert_eq!(log, VecDeque::from(vec![2, 3, 4]));
    }
}
