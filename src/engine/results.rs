// 8.0.2: result types and errors for engine operations.

use crate::ledger::LedgerError;
use crate::order::Order;
use crate::settlement::SettlementError;
use crate::trade::Trade;
use crate::types::{OrderId, OrderStatus, UserId};
use serde::{Deserialize, Serialize};

/// Coarse error classes a request layer maps to rejection responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientFunds,
    InsufficientAsset,
    InvalidState,
    NotFound,
    InvalidInput,
    Internal,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Order {order_id} is {status}, expected open")]
    InvalidState { order_id: OrderId, status: OrderStatus },

    #[error("Invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Settlement failed: {0}")]
    Settlement(#[from] SettlementError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UserNotFound(_) | EngineError::OrderNotFound(_) => ErrorKind::NotFound,
            EngineError::InvalidState { .. } => ErrorKind::InvalidState,
            EngineError::InvalidOrder { .. } | EngineError::InvalidAmount { .. } => {
                ErrorKind::InvalidInput
            }
            EngineError::ArithmeticOverflow => ErrorKind::InvalidInput,
            EngineError::Ledger(e) | EngineError::Settlement(SettlementError::Ledger(e)) => {
                ledger_kind(e)
            }
            EngineError::Settlement(SettlementError::ArithmeticOverflow) => ErrorKind::InvalidInput,
            EngineError::Settlement(_) => ErrorKind::Internal,
        }
    }
}

fn ledger_kind(error: &LedgerError) -> ErrorKind {
    match error {
        LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
        LedgerError::InsufficientAsset { .. } => ErrorKind::InsufficientAsset,
        LedgerError::InsufficientLocked { .. } => ErrorKind::Internal,
        LedgerError::BalanceOverflow { .. } => ErrorKind::InvalidInput,
    }
}

/// Outcome of a cancellation.
#[derive(Debug, Clone)]
pub struct CancelResult {
    pub order: Order,
    pub refunded_cash: crate::types::Quote,
    pub released_asset: rust_decimal::Decimal,
}

/// Outcome of sweeping a taker until matching is a no-op.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    pub trades: Vec<Trade>,
    /// True when the sweep stopped at `max_fills_per_sweep` with the taker still crossing.
    pub truncated: bool,
}

impl SweepResult {
    pub fn filled_amount(&self) -> rust_decimal::Decimal {
        self.trades.iter().map(|t| t.amount).sum()
    }
}
