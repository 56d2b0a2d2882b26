//! Trading strategies
//!
//! - [`StrategyEngine`]: one symbol, motif ensemble plus adaptive learning
//! - [`EnsembleStrategyEngine`]: rotating universe with dynamic risk

pub mod engine;
pub mod ensemble_engine;
pub mod rotation;

pub use engine::{
    classify_action, CycleOutcome, CycleReport, Decision, DecisionRecord, ExecutionGate,
    ExecutionRecord, ExecutionStatus, RobustnessReport, StrategyEngine, TradeAction,
};
pub use ensemble_engine::{
    EnsembleStrategyEngine, RotationAction, RotationDecision, RotationReport, StrategyType,
    StrategyVote, SymbolEnsemble,
};
pub use rotation::{liquidity_score, MarketRotation, RankedSymbol};
