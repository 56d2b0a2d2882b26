//! Multi-symbol ensemble strategy
//!
//! Each cycle fetches the whole universe, supervises open positions, keeps
//! the top-N most liquid symbols and votes four strategy types per symbol.
//! Strategy weights are per symbol and drift through a stochastic mutation
//! step; they are independent of the single-symbol motif weights.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::engine::{push_bounded, submit_entry, submit_exit, ExecutionRecord, ExecutionStatus};
use super::rotation::{MarketRotation, RankedSymbol};
use crate::config::{RiskConfig, RotationConfig, Settings};
use crate::exchange::Collaborators;
use crate::learning::{simulate_scenarios, SimulationBias, SimulationParams};
use crate::motifs::{Motif, MotifInput, SentimentMotif, TrendMotif};
use crate::risk::{
    floor_quantity, ClosedTrade, DynamicRiskManager, DynamicRiskParams, ExitReason, PositionId,
    RiskManager,
};
use crate::types::{MarketIntelligence, MarketSnapshot, Side};

/// Learning rate of the outcome EMA
const PERFORMANCE_ALPHA: f64 = 0.1;
const INITIAL_PERFORMANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyType {
    Trend,
    Volatility,
    EventDriven,
    MlPrediction,
}

impl StrategyType {
    pub const ALL: [StrategyType; 4] = [
        StrategyType::Trend,
        StrategyType::Volatility,
        StrategyType::EventDriven,
        StrategyType::MlPrediction,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyVote {
    pub strategy: StrategyType,
    pub signal: f64,
}

/// Per-symbol strategy weights and running performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEnsemble {
    weights: BTreeMap<StrategyType, f64>,
    performance: BTreeMap<StrategyType, f64>,
}

impl Default for SymbolEnsemble {
    fn default() -> Self {
        let share = 1.0 / StrategyType::ALL.len() as f64;
        Self {
            weights: StrategyType::ALL.iter().map(|s| (*s, share)).collect(),
            performance: StrategyType::ALL
                .iter()
                .map(|s| (*s, INITIAL_PERFORMANCE))
                .collect(),
        }
    }
}

impl SymbolEnsemble {
    pub fn weight(&self, strategy: StrategyType) -> f64 {
        self.weights.get(&strategy).copied().unwrap_or(0.0)
    }

    pub fn performance(&self, strategy: StrategyType) -> f64 {
        self.performance.get(&strategy).copied().unwrap_or(INITIAL_PERFORMANCE)
    }

    pub fn weights(&self) -> &BTreeMap<StrategyType, f64> {
        &self.weights
    }

    /// Weighted vote, neutral when there is nothing to weigh
    pub fn combine(&self, votes: &[StrategyVote]) -> f64 {
        let (sum, total) = votes.iter().fold((0.0, 0.0), |(sum, total), v| {
            let w = self.weight(v.strategy);
            (sum + v.signal * w, total + w)
        });
        if total > 0.0 {
            (sum / total).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    /// Jitter performance, boost strong strategies, renormalize
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R, config: &RotationConfig) {
        for perf in self.performance.values_mut() {
            let factor = 1.0 + (rng.gen::<f64>() - 0.5) * config.mutation_rate;
            *perf = (*perf * factor).clamp(0.0, 1.0);
        }
        for (strategy, weight) in self.weights.iter_mut() {
            let perf = self.performance.get(strategy).copied().unwrap_or(INITIAL_PERFORMANCE);
            if perf > config.performance_boost_threshold {
                *weight *= config.weight_boost;
            }
        }
        self.normalize();
    }

    /// EMA of wins for the strategies that voted with the trade
    pub fn learn(&mut self, strategies: &[StrategyType], success: bool) {
        let outcome = if success { 1.0 } else { 0.0 };
        for strategy in strategies {
            let perf = self.performance.entry(*strategy).or_insert(INITIAL_PERFORMANCE);
            *perf = (1.0 - PERFORMANCE_ALPHA) * *perf + PERFORMANCE_ALPHA * outcome;
        }
    }

    fn normalize(&mut self) {
        let total: f64 = self.weights.values().sum();
        if total > 0.0 && total.is_finite() {
            for weight in self.weights.values_mut() {
                *weight /= total;
            }
        } else {
            let share = 1.0 / self.weights.len().max(1) as f64;
            for weight in self.weights.values_mut() {
                *weight = share;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RotationAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationDecision {
    pub symbol: String,
    pub action: RotationAction,
    pub signal: f64,
    pub votes: Vec<StrategyVote>,
    pub liquidity_score: f64,
    pub risk: DynamicRiskParams,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotationReport {
    pub selected: Vec<RankedSymbol>,
    pub decisions: Vec<RotationDecision>,
    pub executions: Vec<ExecutionRecord>,
    pub closed: Vec<ClosedTrade>,
    /// Symbols whose market data was unavailable this cycle
    pub skipped: Vec<String>,
}

pub struct EnsembleStrategyEngine {
    interval: String,
    candle_limit: usize,
    config: RotationConfig,
    log_retention: usize,
    rotation: MarketRotation,
    dynamic_risk: DynamicRiskManager,
    risk: RiskManager,
    collaborators: Collaborators,
    trend: TrendMotif,
    sentiment: SentimentMotif,
    ensembles: HashMap<String, SymbolEnsemble>,
    entry_votes: HashMap<PositionId, Vec<StrategyVote>>,
    market: MarketIntelligence,
    simulation: SimulationParams,
    rng: StdRng,
    decisions: VecDeque<RotationDecision>,
}

impl EnsembleStrategyEngine {
    pub fn new(settings: &Settings, collaborators: Collaborators) -> Self {
        let rng = match settings.learning.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let risk_config = RiskConfig {
            min_risk_reward: settings.rotation.min_risk_reward,
            ..settings.risk
        };
        Self {
            interval: settings.bot.interval.clone(),
            candle_limit: settings.bot.candle_limit,
            config: settings.rotation.clone(),
            log_retention: settings.strategy.log_retention,
            rotation: MarketRotation::new(&settings.rotation),
            dynamic_risk: DynamicRiskManager::new(&settings.rotation),
            risk: RiskManager::new(risk_config),
            collaborators,
            trend: TrendMotif,
            sentiment: SentimentMotif::new(),
            ensembles: HashMap::new(),
            entry_votes: HashMap::new(),
            market: MarketIntelligence::default(),
            simulation: SimulationParams {
                scenarios: settings.learning.simulation_scenarios,
                steps: settings.learning.simulation_steps,
                drift: settings.learning.simulation_drift,
            },
            rng,
            decisions: VecDeque::new(),
        }
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }

    pub fn ensemble(&self, symbol: &str) -> Option<&SymbolEnsemble> {
        self.ensembles.get(symbol)
    }

    pub fn decisions(&self) -> &VecDeque<RotationDecision> {
        &self.decisions
    }

    pub async fn run_cycle(&mut self) -> RotationReport {
        let mut report = RotationReport::default();

        let mut snapshots = Vec::new();
        for symbol in self.rotation.universe().to_vec() {
            match self
                .collaborators
                .market_data
                .fetch(&symbol, &self.interval, self.candle_limit)
                .await
            {
                Ok(Some(s)) if s.current_price > 0.0 && !s.indicators.is_empty() => snapshots.push(s),
                Ok(_) => {
                    debug!("{}: no usable market data", symbol);
                    report.skipped.push(symbol);
                }
                Err(e) => {
                    warn!("{}: market data failed: {}", symbol, e);
                    report.skipped.push(symbol);
                }
            }
        }
        if snapshots.is_empty() {
            return report;
        }

        self.market = self.collaborators.market_intelligence().await;
        self.sentiment.set_external_score(self.market.sentiment_score());

        for snapshot in &snapshots {
            self.supervise(snapshot, &mut report).await;
        }

        report.selected = self.rotation.select(&snapshots);
        info!(
            "Rotation selected: {}",
            report
                .selected
                .iter()
                .map(|r| format!("{} ({:.3})", r.symbol, r.liquidity_score))
                .collect::<Vec<_>>()
                .join(", ")
        );

        for ranked in report.selected.clone() {
            let Some(snapshot) = snapshots.iter().find(|s| s.symbol == ranked.symbol) else {
                continue;
            };
            let decision = self.evaluate(snapshot, &ranked);
            self.act(&decision, &mut report).await;
            push_bounded(&mut self.decisions, decision.clone(), self.log_retention);
            report.decisions.push(decision);
        }
        report
    }

    /// Vote every strategy type for one selected symbol
    pub fn evaluate(&mut self, snapshot: &MarketSnapshot, ranked: &RankedSymbol) -> RotationDecision {
        let price = snapshot.current_price;
        let start = snapshot.closes.len().saturating_sub(100);
        let input = MotifInput {
            indicators: &snapshot.indicators,
            price,
            order_book: snapshot.order_book.as_ref(),
            price_history: &snapshot.closes[start..],
        };

        let ml = simulate_scenarios(price, ranked.volatility, self.simulation, &mut self.rng)
            .map(|summary| match summary.bias(price) {
                SimulationBias::Buy => 0.7,
                SimulationBias::Sell => 0.3,
                SimulationBias::Hold => 0.5,
            })
            .unwrap_or(0.5);

        let votes = vec![
            StrategyVote {
                strategy: StrategyType::Trend,
                signal: self.trend.analyze(&input).signal,
            },
            StrategyVote {
                strategy: StrategyType::Volatility,
                signal: mean_reversion(snapshot),
            },
            StrategyVote {
                strategy: StrategyType::EventDriven,
                signal: self.sentiment.analyze(&input).signal,
            },
            StrategyVote {
                strategy: StrategyType::MlPrediction,
                signal: ml,
            },
        ];

        let ensemble = self.ensembles.entry(snapshot.symbol.clone()).or_default();
        ensemble.mutate(&mut self.rng, &self.config);
        let signal = ensemble.combine(&votes);

        let action = if signal > self.config.buy_threshold {
            RotationAction::Buy
        } else if signal < self.config.sell_threshold {
            RotationAction::Sell
        } else {
            RotationAction::Hold
        };
        debug!("{} | {:?} | combined {:.3}", snapshot.symbol, action, signal);

        RotationDecision {
            symbol: snapshot.symbol.clone(),
            action,
            signal,
            votes,
            liquidity_score: ranked.liquidity_score,
            risk: self.dynamic_risk.params_for(ranked.volatility),
            price,
            timestamp: Utc::now(),
        }
    }

    async fn supervise(&mut self, snapshot: &MarketSnapshot, report: &mut RotationReport) {
        let ids: Vec<PositionId> = self
            .risk
            .open_positions_for(&snapshot.symbol)
            .iter()
            .map(|p| p.id)
            .collect();
        for id in ids {
            match self.risk.triggered_exit(id, snapshot.current_price) {
                Ok(Some((level, reason))) => self.exit(id, level, reason, report).await,
                Ok(None) => {}
                Err(e) => warn!("Exit check failed for {}: {}", id, e),
            }
        }
    }

    async fn act(&mut self, decision: &RotationDecision, report: &mut RotationReport) {
        let side = match decision.action {
            RotationAction::Buy => Side::Long,
            RotationAction::Sell => Side::Short,
            RotationAction::Hold => return,
        };

        let opposite: Vec<PositionId> = self
            .risk
            .open_positions_for(&decision.symbol)
            .iter()
            .filter(|p| p.side == side.opposite())
            .map(|p| p.id)
            .collect();
        if !opposite.is_empty() {
            for id in opposite {
                self.exit(id, decision.price, ExitReason::Reversal, report).await;
            }
            return;
        }
        if self.risk.positions().iter().any(|p| p.symbol == decision.symbol) {
            return;
        }

        let (stop, target) = decision.risk.levels(decision.price, side);
        let notional =
            self.risk.balance() * decision.risk.max_position_fraction * self.market.risk_adjustment();
        let quantity = floor_quantity(notional / decision.price, self.risk.config().quantity_precision);

        let position = match self.risk.open_position_with_levels(
            &decision.symbol,
            side,
            decision.price,
            stop,
            target,
            quantity,
        ) {
            Ok(p) => p,
            Err(e) => {
                let reason = e.rejection_reason().unwrap_or("rejected").to_string();
                report.executions.push(ExecutionRecord::rejected(
                    &decision.symbol,
                    side.entry_order(),
                    quantity,
                    decision.price,
                    &reason,
                ));
                return;
            }
        };

        let record =
            submit_entry(&mut self.risk, self.collaborators.orders.as_ref(), &position).await;
        if record.status == ExecutionStatus::Opened {
            self.entry_votes.insert(position.id, decision.votes.clone());
        }
        report.executions.push(record);
    }

    async fn exit(&mut self, id: PositionId, price: f64, reason: ExitReason, report: &mut RotationReport) {
        let Some((record, trade)) = submit_exit(
            &mut self.risk,
            self.collaborators.orders.as_ref(),
            id,
            price,
            None,
            reason,
        )
        .await
        else {
            return;
        };
        report.executions.push(record);
        if let Some(trade) = trade {
            self.learn_from(&trade);
            self.collaborators.store_trade(&trade).await;
            report.closed.push(trade);
        }
    }

    /// Credit the strategies that voted in the trade's direction
    fn learn_from(&mut self, trade: &ClosedTrade) {
        let Some(votes) = self.entry_votes.remove(&trade.position.id) else {
            return;
        };
        let agreed: Vec<StrategyType> = votes
            .iter()
            .filter(|v| match trade.position.side {
                Side::Long => v.signal > 0.5,
                Side::Short => v.signal < 0.5,
            })
            .map(|v| v.strategy)
            .collect();
        let ensemble = self.ensembles.entry(trade.position.symbol.clone()).or_default();
        ensemble.learn(&agreed, trade.is_win());
    }
}

/// Bollinger mean reversion: near the lower band leans long
fn mean_reversion(snapshot: &MarketSnapshot) -> f64 {
    match (
        snapshot.indicators.bollinger_upper,
        snapshot.indicators.bollinger_lower,
    ) {
        (Some(upper), Some(lower)) if upper > lower => {
            let position = (snapshot.current_price - lower) / (upper - lower);
            (1.0 - position).clamp(0.0, 1.0)
        }
        _ => 0.5,
    }
}
