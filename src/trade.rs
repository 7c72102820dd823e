// 3.0: a trade is the immutable record of one fill. written once inside the settling
// unit of work, never touched again.

use crate::types::{OrderId, Price, Quote, Symbol, Timestamp, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// Always the BUY-side order of the fill, whichever side was the taker.
    pub buy_order_id: OrderId,
    /// Always the SELL-side order of the fill.
    pub sell_order_id: OrderId,
    pub symbol: Symbol,
    pub price: Price,
    pub amount: Decimal,
    pub volume: Quote,
    pub fee: Quote,
    pub created_at: Timestamp,
}

impl Trade {
    pub fn involves(&self, order_id: OrderId) -> bool {
        self.buy_order_id == order_id || self.sell_order_id == order_id
    }
}
