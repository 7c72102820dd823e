//! Order book store: order rows, per-symbol book indexes, and the trade log.
//!
//! Order rows are lockable. The book map and the trade log are leaf locks:
//! held for one insert or lookup and never while waiting on another lock.

use crate::order::{Order, OrderBook, PriceLevel, RestingOrder};
use crate::rowlock::{new_row, Row};
use crate::trade::Trade;
use crate::types::{OrderId, OrderStatus, Price, Side, Symbol, TradeId, UserId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Filter for order listings. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub symbol: Option<Symbol>,
    pub side: Option<Side>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn open(symbol: Symbol) -> Self {
        Self {
            symbol: Some(symbol),
            side: None,
            status: Some(OrderStatus::Open),
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.symbol.as_ref().map_or(true, |s| *s == order.symbol)
            && self.side.map_or(true, |s| s == order.side)
            && self.status.map_or(true, |s| s == order.status)
    }
}

/// Order-book view for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<RestingOrder>,
    pub asks: Vec<RestingOrder>,
    pub bid_levels: Vec<PriceLevel>,
    pub ask_levels: Vec<PriceLevel>,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
}

#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<OrderId, Row<Order>>>,
    books: RwLock<HashMap<Symbol, OrderBook>>,
    trades: RwLock<Vec<Trade>>,
    next_order_id: AtomicU64,
    next_trade_id: AtomicU64,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn next_trade_id(&self) -> TradeId {
        TradeId(self.next_trade_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Persists a new order and lists it on its book if it is OPEN.
    pub fn insert(&self, order: Order) {
        self.orders.write().insert(order.id, new_row(order.clone()));
        if order.is_open() {
            self.books
                .write()
                .entry(order.symbol.clone())
                .or_insert_with(|| OrderBook::new(order.symbol.clone()))
                .insert(&order);
        }
    }

    pub fn order_row(&self, id: OrderId) -> Option<Row<Order>> {
        self.orders.read().get(&id).cloned()
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        let row = self.order_row(id)?;
        let snapshot = row.lock().clone();
        Some(snapshot)
    }

    /// Brings the book index in line with a (staged) order. Callers hold the
    /// order's row lock.
    pub fn sync_book(&self, order: &Order) {
        if let Some(book) = self.books.write().get_mut(&order.symbol) {
            book.sync(order);
        }
    }

    /// Best resting order the given order can trade against.
    pub fn best_crossing(&self, taker: &Order) -> Option<OrderId> {
        let books = self.books.read();
        let book = books.get(&taker.symbol)?;
        book.best_crossing(taker.side, taker.price)
            .map(|resting| resting.order_id)
            .filter(|id| *id != taker.id)
    }

    pub fn record_trade(&self, trade: Trade) {
        self.trades.write().push(trade);
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.read().clone()
    }

    pub fn trades_for_order(&self, order_id: OrderId) -> Vec<Trade> {
        self.trades
            .read()
            .iter()
            .filter(|t| t.involves(order_id))
            .cloned()
            .collect()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.read().len()
    }

    fn snapshot_where(&self, keep: impl Fn(&Order) -> bool) -> Vec<Order> {
        let rows: Vec<Row<Order>> = self.orders.read().values().cloned().collect();
        rows.iter()
            .map(|row| row.lock().clone())
            .filter(|o| keep(o))
            .collect()
    }

    pub fn all_orders(&self) -> Vec<Order> {
        let mut orders = self.snapshot_where(|_| true);
        orders.sort_by_key(|o| o.id);
        orders
    }

    pub fn orders_for_user(&self, user: UserId) -> Vec<Order> {
        let mut orders = self.snapshot_where(|o| o.user_id == user);
        orders.sort_by_key(|o| o.id);
        orders
    }

    /// Orders matching `filter`, bids before asks, each side best price first
    /// and earliest first within a price.
    pub fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let mut orders = self.snapshot_where(|o| filter.matches(o));
        orders.sort_by(priority_order);
        orders
    }

    pub fn book_snapshot(&self, symbol: &Symbol, depth: usize) -> BookSnapshot {
        let books = self.books.read();
        match books.get(symbol) {
            Some(book) => BookSnapshot {
                symbol: symbol.clone(),
                bids: book.top_bids(depth),
                asks: book.top_asks(depth),
                bid_levels: book.bid_levels(depth),
                ask_levels: book.ask_levels(depth),
                best_bid: book.best_bid(),
                best_ask: book.best_ask(),
            },
            None => BookSnapshot {
                symbol: symbol.clone(),
                bids: Vec::new(),
                asks: Vec::new(),
                bid_levels: Vec::new(),
                ask_levels: Vec::new(),
                best_bid: None,
                best_ask: None,
            },
        }
    }

    pub fn resting_count(&self, symbol: &Symbol) -> usize {
        self.books.read().get(symbol).map_or(0, |b| b.order_count())
    }
}

fn priority_order(a: &Order, b: &Order) -> CmpOrdering {
    let side_rank = |s: Side| match s {
        Side::Buy => 0u8,
        Side::Sell => 1u8,
    };
    side_rank(a.side)
        .cmp(&side_rank(b.side))
        .then_with(|| match a.side {
            Side::Buy => b.price.cmp(&a.price),
            Side::Sell => a.price.cmp(&b.price),
        })
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}
