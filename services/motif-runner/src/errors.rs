//! Error types for the trading core and its exchange collaborators

use thiserror::Error;

use crate::risk::{PositionId, PositionState};

/// Errors surfaced by the decision pipeline and the risk engine.
///
/// None of these are allowed to escape a trading cycle as a panic; the
/// runner logs them and moves on to the next tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("trade rejected: {reason}")]
    ValidationRejected { reason: String },

    #[error("order failed for {symbol}: {reason}")]
    ExternalOrderFailure { symbol: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("position not found: {0}")]
    PositionNotFound(PositionId),

    #[error("position {id} is {state:?}, expected {expected:?}")]
    InvalidPositionState {
        id: PositionId,
        state: PositionState,
        expected: PositionState,
    },
}

impl EngineError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        EngineError::ValidationRejected {
            reason: reason.into(),
        }
    }

    /// Rejection reason, if this is a risk-validation failure
    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            EngineError::ValidationRejected { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Failures reported by market-data, order and sentiment collaborators
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ExchangeError {
    /// Map a reqwest failure, keeping timeouts distinguishable
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(timeout_secs)
        } else {
            ExchangeError::Http(err)
        }
    }

    /// True for invalid-key / permission failures that should trigger demo mode
    pub fn is_permission(&self) -> bool {
        matches!(self, ExchangeError::Permission(_))
    }
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
