//! Position and closed-trade records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::learning::{Action, PriceState};
use crate::motifs::MotifType;
use crate::types::Side;

/// Unique position identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(Uuid);

impl PositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position lifecycle.
///
/// ```text
/// Pending ──confirm──> Open ──close──> Closed
///    │
///    └──abandon──> (removed, nothing realized)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    /// Recorded and counted against risk, order not yet acknowledged
    Pending,
    Open,
    Closed,
}

/// Decision context captured at entry, replayed into learning on close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryContext {
    pub motif: MotifType,
    pub state: PriceState,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    /// Quantity still open
    pub quantity: f64,
    pub original_quantity: f64,
    pub stop_loss: f64,
    /// Hard stop set at entry; trailing never loosens past it
    pub initial_stop: f64,
    pub take_profit: f64,
    pub risk_amount: f64,
    pub potential_reward: f64,
    pub risk_reward_ratio: f64,
    pub created_at: DateTime<Utc>,
    pub state: PositionState,
    /// True once the trailing logic has moved the stop
    pub dynamic_stop: bool,
    pub trailing_stop_price: Option<f64>,
    pub highest_price: Option<f64>,
    pub lowest_price: Option<f64>,
    /// Cumulative quantity closed so far, final close included;
    /// `quantity + partial_closed_quantity == original_quantity`
    pub partial_closed_quantity: f64,
    pub realized_pnl: f64,
    pub order_id: Option<String>,
    /// Set by a full close on the 1% profit tier
    pub full_target_hit: bool,
    pub entry_context: Option<EntryContext>,
}

impl Position {
    pub(crate) fn new(
        symbol: &str,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        quantity: f64,
    ) -> Self {
        let mut position = Self {
            id: PositionId::new(),
            symbol: symbol.to_string(),
            side,
            entry_price,
            quantity,
            original_quantity: quantity,
            stop_loss,
            initial_stop: stop_loss,
            take_profit,
            risk_amount: 0.0,
            potential_reward: 0.0,
            risk_reward_ratio: 0.0,
            created_at: Utc::now(),
            state: PositionState::Pending,
            dynamic_stop: false,
            trailing_stop_price: None,
            highest_price: None,
            lowest_price: None,
            partial_closed_quantity: 0.0,
            realized_pnl: 0.0,
            order_id: None,
            full_target_hit: false,
            entry_context: None,
        };
        position.refresh_risk();
        position
    }

    /// Legacy `symbol_createdAt` key, kept for journal readability
    pub fn key(&self) -> String {
        format!("{}_{}", self.symbol, self.created_at.timestamp_millis())
    }

    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    /// Recompute risk, reward and R:R from the current stop and quantity
    pub(crate) fn refresh_risk(&mut self) {
        self.risk_amount = (self.entry_price - self.stop_loss).abs() * self.quantity;
        self.potential_reward = (self.take_profit - self.entry_price).abs() * self.quantity;
        self.risk_reward_ratio = if self.risk_amount > 0.0 {
            self.potential_reward / self.risk_amount
        } else {
            0.0
        };
    }

    pub fn pnl_at(&self, price: f64, quantity: f64) -> f64 {
        (price - self.entry_price) * quantity * self.side.sign()
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.pnl_at(price, self.quantity)
    }

    /// Signed move from entry in the position's favour, as a fraction
    pub fn favourable_move(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * self.side.sign()
    }

    pub fn stop_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }

    pub fn target_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price >= self.take_profit,
            Side::Short => price <= self.take_profit,
        }
    }
}

/// Why a position (or part of it) was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    ProfitTier,
    Reversal,
    Manual,
}

/// One close event, partial or full. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Position as it stood after this close
    pub position: Position,
    pub closed_quantity: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub closed_at: DateTime<Utc>,
    pub reason: ExitReason,
}

impl ClosedTrade {
    pub fn is_partial(&self) -> bool {
        self.position.state != PositionState::Closed
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Profit-taking tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfitLevel {
    #[serde(rename = "0.5%")]
    Half,
    #[serde(rename = "1%")]
    Full,
}

impl std::fmt::Display for ProfitLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfitLevel::Half => write!(f, "0.5%"),
            ProfitLevel::Full => write!(f, "1%"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitTarget {
    pub level: ProfitLevel,
    pub should_close: bool,
    pub close_quantity: f64,
}
