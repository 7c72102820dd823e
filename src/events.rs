// 5.0: every committed unit of work produces an event. the engine keeps a bounded journal
// and hands each event to the registered sinks after the locks are released. publication
// is best effort: a failing sink is logged and never undoes the commit.

use crate::trade::Trade;
use crate::types::{OrderId, Price, Quote, Side, Symbol, Timestamp, UserId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.payload {
            EventPayload::CashDeposited(_) => "cash_deposited",
            EventPayload::AssetDeposited(_) => "asset_deposited",
            EventPayload::OrderPlaced(_) => "order_placed",
            EventPayload::OrderCanceled(_) => "order_canceled",
            EventPayload::TradeExecuted(_) => "trade_executed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    CashDeposited(CashDepositedEvent),
    AssetDeposited(AssetDepositedEvent),
    OrderPlaced(OrderPlacedEvent),
    OrderCanceled(OrderCanceledEvent),
    TradeExecuted(TradeExecutedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashDepositedEvent {
    pub user_id: UserId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDepositedEvent {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub amount: Decimal,
    pub new_available: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub amount: Decimal,
    pub locked_usd: Option<Quote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCanceledEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub refunded_cash: Quote,
    pub released_asset: Decimal,
}

/// Trade-completed notification for market-data and per-user listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeExecutedEvent {
    pub trade: Trade,
    pub buyer: UserId,
    pub seller: UserId,
    pub taker_order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event sink '{sink}' failed: {reason}")]
pub struct PublishError {
    pub sink: String,
    pub reason: String,
}

/// Receives events after commit. Implementations must not call back into the
/// exchange.
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    fn publish(&self, event: &Event) -> Result<(), PublishError>;
}

/// Sink that keeps everything it receives. Useful for tests and audit dumps.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<Event>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn trades(&self) -> Vec<TradeExecutedEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::TradeExecuted(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for EventCollector {
    fn name(&self) -> &str {
        "collector"
    }

    fn publish(&self, event: &Event) -> Result<(), PublishError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
