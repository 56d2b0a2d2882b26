//! Bot Runner - Main orchestration loop
//!
//! Every bot runs in its own task on its own interval. A tick is only polled
//! again after the previous cycle has finished, so one bot never has two
//! cycles in flight. Shutdown is observed between cycles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::risk::RiskManager;
use crate::state::{BotStatus, JournalEntry, NowState, StateManager};
use crate::strategy::{CycleOutcome, EnsembleStrategyEngine, StrategyEngine};

/// Cycles between Monte Carlo robustness reports
const ROBUSTNESS_EVERY: u64 = 20;

/// What one cycle produced, for the state files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    /// Set when the cycle did nothing because data was missing
    pub skipped: Option<String>,
    pub decisions: Vec<serde_json::Value>,
}

/// A bot the runner can drive
#[async_trait]
pub trait TradingCycle: Send + Sync {
    fn name(&self) -> &str;

    /// One-off work before the first tick
    async fn startup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run_cycle(&mut self) -> anyhow::Result<CycleSummary>;

    fn risk(&self) -> &RiskManager;
}

/// Single-symbol motif bot
pub struct SingleSymbolBot {
    name: String,
    engine: StrategyEngine,
    quote_asset: String,
    sync_balance: bool,
    cycles: u64,
}

impl SingleSymbolBot {
    pub fn new(name: &str, engine: StrategyEngine, quote_asset: &str, sync_balance: bool) -> Self {
        Self {
            name: name.to_string(),
            engine,
            quote_asset: quote_asset.to_string(),
            sync_balance,
            cycles: 0,
        }
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }
}

#[async_trait]
impl TradingCycle for SingleSymbolBot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn startup(&mut self) -> anyhow::Result<()> {
        if self.sync_balance {
            self.engine.sync_balance(&self.quote_asset).await?;
            info!(
                "{}: balance synced to {:.2} {}",
                self.name,
                self.engine.risk().balance(),
                self.quote_asset
            );
        }
        Ok(())
    }

    async fn run_cycle(&mut self) -> anyhow::Result<CycleSummary> {
        self.cycles += 1;
        let summary = match self.engine.run_cycle().await {
            CycleOutcome::Skipped(reason) => CycleSummary {
                skipped: Some(reason.to_string()),
                decisions: Vec::new(),
            },
            CycleOutcome::Completed(report) => {
                for trade in &report.closed {
                    info!(
                        "{}: closed {} {} @ {:.4} | pnl {:.2} ({:.2}%) | {:?}",
                        self.name,
                        trade.closed_quantity,
                        trade.position.symbol,
                        trade.exit_price,
                        trade.pnl,
                        trade.pnl_percent,
                        trade.reason
                    );
                }
                CycleSummary {
                    skipped: None,
                    decisions: vec![serde_json::to_value(&report.decision)?],
                }
            }
        };

        if self.cycles % ROBUSTNESS_EVERY == 0 {
            if let Some(report) = self.engine.robustness_report() {
                info!(
                    "{}: robustness | mean {:.4} | p5 {:.4} | p95 {:.4} | bias {:?} | win rate {:.2}",
                    self.name,
                    report.simulation.mean,
                    report.simulation.p5,
                    report.simulation.p95,
                    report.bias,
                    report.metrics.win_rate
                );
            }
        }
        Ok(summary)
    }

    fn risk(&self) -> &RiskManager {
        self.engine.risk()
    }
}

/// Multi-symbol rotation bot
pub struct RotationBot {
    name: String,
    engine: EnsembleStrategyEngine,
}

impl RotationBot {
    pub fn new(name: &str, engine: EnsembleStrategyEngine) -> Self {
        Self {
            name: name.to_string(),
            engine,
        }
    }

    pub fn engine(&self) -> &EnsembleStrategyEngine {
        &self.engine
    }
}

#[async_trait]
impl TradingCycle for RotationBot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_cycle(&mut self) -> anyhow::Result<CycleSummary> {
        let report = self.engine.run_cycle().await;
        if !report.skipped.is_empty() {
            debug!("{}: no data for {}", self.name, report.skipped.join(", "));
        }
        let skipped = report
            .selected
            .is_empty()
            .then(|| "no symbols with market data".to_string());
        let decisions = report
            .decisions
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CycleSummary { skipped, decisions })
    }

    fn risk(&self) -> &RiskManager {
        self.engine.risk()
    }
}

fn now_state(bot: &dyn TradingCycle, status: BotStatus, cycles: u64) -> NowState {
    let risk = bot.risk();
    NowState {
        bot: bot.name().to_string(),
        timestamp: Utc::now(),
        status,
        cycles,
        balance: risk.balance(),
        open_positions: risk.positions().into_iter().cloned().collect(),
        metrics: risk.calculate_metrics(),
        last_decision: None,
        last_error: None,
    }
}

/// Run one cycle and persist its outcome. Failures are logged, never raised.
pub async fn execute_cycle(bot: &mut dyn TradingCycle, state: &StateManager, cycle: u64) -> NowState {
    let result = bot.run_cycle().await;

    let mut now = now_state(bot, BotStatus::Running, cycle);
    let mut decisions = Vec::new();
    match result {
        Ok(summary) => {
            if let Some(reason) = summary.skipped {
                now.status = BotStatus::Skipped;
                now.last_error = Some(reason);
            }
            decisions = summary.decisions;
        }
        Err(e) => {
            error!("{}: cycle {} failed: {:#}", bot.name(), cycle, e);
            now.status = BotStatus::Error;
            now.last_error = Some(e.to_string());
        }
    }
    now.last_decision = decisions.last().cloned();

    if let Err(e) = state.write_now(&now).await {
        warn!("{}: failed to write state: {}", bot.name(), e);
    }
    for decision in decisions {
        let entry = JournalEntry {
            bot: now.bot.clone(),
            timestamp: now.timestamp,
            decision,
        };
        if let Err(e) = state.append_journal(&entry).await {
            warn!("{}: failed to journal decision: {}", bot.name(), e);
        }
    }
    now
}

async fn run_bot(
    mut bot: Box<dyn TradingCycle>,
    every: Duration,
    state: Arc<StateManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = bot.name().to_string();
    if let Err(e) = bot.startup().await {
        warn!("{}: startup failed, continuing: {:#}", name, e);
    }
    let starting = now_state(bot.as_ref(), BotStatus::Starting, 0);
    if let Err(e) = state.write_now(&starting).await {
        warn!("{}: failed to write state: {}", name, e);
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles = 0u64;
    info!("{}: running every {:?}", name, every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        if *shutdown.borrow() {
            break;
        }
        cycles += 1;
        let now = execute_cycle(bot.as_mut(), &state, cycles).await;
        debug!("{}: cycle {} -> {:?}", name, cycles, now.status);
    }

    let stopped = now_state(bot.as_ref(), BotStatus::Stopped, cycles);
    if let Err(e) = state.write_now(&stopped).await {
        warn!("{}: failed to write state: {}", name, e);
    }
    info!("{}: stopped after {} cycles", name, cycles);
}

/// Main bot runner that owns every bot loop
pub struct BotRunner {
    state: Arc<StateManager>,
    bots: Vec<(Box<dyn TradingCycle>, Duration)>,
}

impl BotRunner {
    pub fn new(state: StateManager) -> Self {
        Self {
            state: Arc::new(state),
            bots: Vec::new(),
        }
    }

    pub fn add_bot(&mut self, bot: Box<dyn TradingCycle>, every: Duration) {
        self.bots.push((bot, every));
    }

    /// Run every bot until `shutdown` flips to true
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.state.init().await?;
        info!("Bot runner starting {} bot(s)", self.bots.len());

        let handles: Vec<_> = self
            .bots
            .into_iter()
            .map(|(bot, every)| {
                tokio::spawn(run_bot(bot, every, self.state.clone(), shutdown.clone()))
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Bot task ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}
