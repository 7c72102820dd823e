//! Orders and the per-symbol price-time book index.
//!
//! Only plain limit orders exist. An order's `remaining_amount` starts at the
//! requested size and shrinks with every fill; there is no separate filled
//! field. The book indexes OPEN orders only, best price first and earliest
//! arrival first within a price.

use crate::types::{OrderId, OrderStatus, Price, Quote, Side, Symbol, Timestamp, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A limit order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub remaining_amount: Decimal,
    /// Cash still reserved by a BUY order. Always `None` for SELL orders.
    pub locked_usd: Option<Quote>,
    pub status: OrderStatus,
    pub created_at: Timestamp,
}

impl Order {
    pub fn new(
        id: OrderId,
        user_id: UserId,
        symbol: Symbol,
        side: Side,
        price: Price,
        amount: Decimal,
        locked_usd: Option<Quote>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            symbol,
            side,
            price,
            remaining_amount: amount,
            locked_usd,
            status: OrderStatus::Open,
            created_at: timestamp,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    /// True when `resting` sits on the other side of this order's book at a
    /// price this order accepts.
    pub fn crosses(&self, resting: &Order) -> bool {
        self.symbol == resting.symbol
            && self.side.opposite() == resting.side
            && self.side.crosses(self.price, resting.price)
    }

    /// Decrements the open size and moves to FILLED when nothing is left.
    pub fn fill(&mut self, amount: Decimal) {
        debug_assert!(self.is_open(), "cannot fill a terminal order");
        debug_assert!(amount <= self.remaining_amount, "cannot fill more than remaining");
        self.remaining_amount -= amount;
        if self.remaining_amount <= Decimal::ZERO {
            self.remaining_amount = Decimal::ZERO;
            self.status = OrderStatus::Filled;
        }
    }

    pub fn cancel(&mut self) {
        debug_assert!(self.is_open(), "cannot cancel a terminal order");
        self.status = OrderStatus::Cancelled;
    }
}

/// Sort key. `rank` is the price for asks and the negated price for bids, so
/// both sides iterate best-first in ascending key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BookKey {
    rank: Decimal,
    created_at: Timestamp,
    order_id: OrderId,
}

impl BookKey {
    fn for_order(order: &Order) -> Self {
        let rank = match order.side {
            Side::Buy => -order.price.value(),
            Side::Sell => order.price.value(),
        };
        Self {
            rank,
            created_at: order.created_at,
            order_id: order.id,
        }
    }
}

/// What the book keeps about a resting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub price: Price,
    pub remaining_amount: Decimal,
    pub created_at: Timestamp,
}

impl From<&Order> for RestingOrder {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            side: order.side,
            price: order.price,
            remaining_amount: order.remaining_amount,
            created_at: order.created_at,
        }
    }
}

/// A single price level in the order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub total_amount: Decimal,
    pub order_count: usize,
}

/// Price-time index of the OPEN orders of one symbol
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub symbol: Symbol,
    bids: BTreeMap<BookKey, RestingOrder>,
    asks: BTreeMap<BookKey, RestingOrder>,
    index: HashMap<OrderId, (Side, BookKey)>,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<BookKey, RestingOrder> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<BookKey, RestingOrder> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub fn insert(&mut self, order: &Order) {
        debug_assert!(order.is_open());
        let key = BookKey::for_order(order);
        self.index.insert(order.id, (order.side, key));
        self.side_mut(order.side).insert(key, RestingOrder::from(order));
    }

    pub fn remove(&mut self, order_id: OrderId) -> Option<RestingOrder> {
        let (side, key) = self.index.remove(&order_id)?;
        self.side_mut(side).remove(&key)
    }

    /// Mirrors the order's current state: refreshes the open size, or drops the
    /// entry once the order is terminal.
    pub fn sync(&mut self, order: &Order) {
        if !order.is_open() {
            self.remove(order.id);
            return;
        }
        if let Some((side, key)) = self.index.get(&order.id).copied() {
            if let Some(entry) = self.side_mut(side).get_mut(&key) {
                entry.remaining_amount = order.remaining_amount;
            }
        }
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Best resting order on the opposite side that an incoming order on
    /// `side` limited at `limit` can trade with.
    pub fn best_crossing(&self, side: Side, limit: Price) -> Option<&RestingOrder> {
        self.side(side.opposite())
            .values()
            .next()
            .filter(|resting| side.crosses(limit, resting.price))
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.values().next().map(|o| o.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.values().next().map(|o| o.price)
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.value() - bid.value()),
            _ => None,
        }
    }

    /// Bids, highest price first, earliest first within a price.
    pub fn top_bids(&self, depth: usize) -> Vec<RestingOrder> {
        self.bids.values().take(depth).cloned().collect()
    }

    /// Asks, lowest price first, earliest first within a price.
    pub fn top_asks(&self, depth: usize) -> Vec<RestingOrder> {
        self.asks.values().take(depth).cloned().collect()
    }

    pub fn bid_levels(&self, max_levels: usize) -> Vec<PriceLevel> {
        Self::levels(self.bids.values(), max_levels)
    }

    pub fn ask_levels(&self, max_levels: usize) -> Vec<PriceLevel> {
        Self::levels(self.asks.values(), max_levels)
    }

    fn levels<'a>(
        orders: impl Iterator<Item = &'a RestingOrder>,
        max_levels: usize,
    ) -> Vec<PriceLevel> {
        let mut levels: Vec<PriceLevel> = Vec::new();

        for order in orders {
            let same_level = levels.last().is_some_and(|l| l.price == order.price);
            if !same_level {
                if levels.len() >= max_levels {
                    break;
                }
                levels.push(PriceLevel {
                    price: order.price,
                    total_amount: Decimal::ZERO,
                    order_count: 0,
                });
            }
            if let Some(level) = levels.last_mut() {
                level.total_amount += order.remaining_amount;
                level.order_count += 1;
            }
        }

        levels
    }

    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
