//! Motif Runner Library
//!
//! Crypto trading agent: heuristic motif scorers feed a weighted ensemble,
//! adaptive learning (Bayesian, Markov, Q-learning, Monte Carlo) tunes it,
//! and a risk manager owns every position through a pending/open/closed
//! lifecycle.

pub mod client;
pub mod config;
pub mod ensemble;
pub mod errors;
pub mod exchange;
pub mod indicators;
pub mod learning;
pub mod logging;
pub mod motifs;
pub mod risk;
pub mod runner;
pub mod state;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use client::{MarketIntelligenceClient, RestMarketData, RestOrderGateway};
pub use config::{Settings, TradingMode};
pub use ensemble::{EnsembleSignal, MotifEnsemble, MotifWeights};
pub use errors::{EngineError, ExchangeError, ExchangeResult};
pub use exchange::{
    CachedMarketData, Collaborators, DemoFallbackGateway, MarketDataSource, MemoryTradeStore,
    OrderGateway, PaperGateway, SentimentSource, TradeSink,
};
pub use indicators::{provider_for, IndicatorProvider, Indicators, TaIndicators, TechnicalIndicators};
pub use learning::{AdaptiveLearningEngine, Action, PriceState, TradeOutcome};
pub use motifs::{MotifSignal, MotifType};
pub use risk::{ClosedTrade, Position, PositionId, PositionState, RiskManager};
pub use runner::{BotRunner, RotationBot, SingleSymbolBot, TradingCycle};
pub use state::StateManager;
pub use strategy::{EnsembleStrategyEngine, StrategyEngine};
pub use types::{MarketIntelligence, MarketSnapshot, OrderSide, Side};
