// 8.0 engine/core.rs: the exchange. owns the ledger, the order store, the fee account,
// the event journal. every method takes &self so one Arc<Exchange> serves all threads.

use super::config::{ClockMode, EngineConfig};
use super::results::EngineError;
use super::trigger::MatchTrigger;
use crate::config::{ConfigError, ExchangeConfig};
use crate::events::{
    AssetDepositedEvent, CashDepositedEvent, Event, EventId, EventPayload, EventSink,
};
use crate::ledger::{AssetHolding, Ledger, UserAccount};
use crate::order::Order;
use crate::rowlock::RowSet;
use crate::store::{BookSnapshot, OrderFilter, OrderStore};
use crate::trade::Trade;
use crate::types::{OrderId, Quote, Symbol, Timestamp, UserId};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/** 8.1: main exchange struct. all state lives here */
pub struct Exchange {
    pub(super) config: ExchangeConfig,
    pub(super) engine_config: EngineConfig,
    pub(super) ledger: Ledger,
    pub(super) store: OrderStore,
    pub(super) fees_collected: Mutex<Quote>,
    pub(super) asset_deposits: Mutex<HashMap<Symbol, Decimal>>,
    journal: Mutex<VecDeque<Event>>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    trigger: RwLock<Option<Arc<dyn MatchTrigger>>>,
    next_event_id: AtomicU64,
    manual_time: AtomicI64,
}

impl Exchange {
    pub fn new(config: ExchangeConfig, engine_config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            taker_fee_rate = %config.fees.taker_fee_rate,
            cash_scale = config.precision.cash_scale,
            asset_scale = config.precision.asset_scale,
            clock = ?engine_config.clock,
            "Exchange initialized"
        );
        Ok(Self {
            config,
            engine_config,
            ledger: Ledger::new(),
            store: OrderStore::new(),
            fees_collected: Mutex::new(Quote::zero()),
            asset_deposits: Mutex::new(HashMap::new()),
            journal: Mutex::new(VecDeque::new()),
            sinks: RwLock::new(Vec::new()),
            trigger: RwLock::new(None),
            next_event_id: AtomicU64::new(1),
            manual_time: AtomicI64::new(0),
        })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub fn now(&self) -> Timestamp {
        match self.engine_config.clock {
            ClockMode::Wall => Timestamp::now(),
            ClockMode::Manual => Timestamp::from_millis(self.manual_time.load(Ordering::SeqCst)),
        }
    }

    pub fn set_time(&self, timestamp: Timestamp) {
        self.manual_time.store(timestamp.as_millis(), Ordering::SeqCst);
    }

    pub fn advance_time(&self, millis: i64) {
        self.manual_time.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Installs the hook called with every newly admitted order id.
    pub fn set_trigger(&self, trigger: Arc<dyn MatchTrigger>) {
        *self.trigger.write() = Some(trigger);
    }

    pub fn clear_trigger(&self) {
        *self.trigger.write() = None;
    }

    pub fn create_user(&self) -> UserId {
        let id = self.ledger.create_user(self.now());
        debug!(user = %id, "User created");
        id
    }

    pub fn deposit_cash(&self, user: UserId, amount: Decimal) -> Result<UserAccount, EngineError> {
        self.check_positive(amount, self.config.precision.cash_scale, "deposit amount")?;
        let row = self.ledger.user_row(user).ok_or(EngineError::UserNotFound(user))?;

        let rows = RowSet::new(vec![(user, row)]);
        let mut users = rows.lock();
        let account = users.get_mut(&user).ok_or(EngineError::UserNotFound(user))?;
        account
            .deposit(Quote::new(amount))
            .map_err(|_| EngineError::ArithmeticOverflow)?;
        let snapshot = account.clone();
        users.commit();

        self.emit(EventPayload::CashDeposited(CashDepositedEvent {
            user_id: user,
            amount: Quote::new(amount),
            new_balance: snapshot.cash_balance,
        }));
        Ok(snapshot)
    }

    pub fn deposit_asset(
        &self,
        user: UserId,
        symbol: &str,
        amount: Decimal,
    ) -> Result<AssetHolding, EngineError> {
        let symbol = self.tradable_symbol(symbol)?;
        self.check_positive(amount, self.config.precision.asset_scale, "deposit amount")?;
        if self.ledger.user_row(user).is_none() {
            return Err(EngineError::UserNotFound(user));
        }

        let key = (user, symbol.clone());
        let rows = RowSet::new(vec![(key.clone(), self.ledger.holding_row_or_create(user, &symbol))]);
        let mut holdings = rows.lock();
        let holding = holdings.get_mut(&key).ok_or(EngineError::UserNotFound(user))?;
        holding
            .credit_available(amount)
            .map_err(|_| EngineError::ArithmeticOverflow)?;
        let snapshot = holding.clone();
        {
            let mut deposits = self.asset_deposits.lock();
            let total = deposits.entry(symbol.clone()).or_insert(Decimal::ZERO);
            *total = total
                .checked_add(amount)
                .ok_or(EngineError::ArithmeticOverflow)?;
        }
        holdings.commit();

        self.emit(EventPayload::AssetDeposited(AssetDepositedEvent {
            user_id: user,
            symbol,
            amount,
            new_available: snapshot.available,
        }));
        Ok(snapshot)
    }

    pub fn user(&self, id: UserId) -> Option<UserAccount> {
        self.ledger.user(id)
    }

    pub fn users(&self) -> Vec<UserAccount> {
        self.ledger.users()
    }

    pub fn holding(&self, user: UserId, symbol: &str) -> Option<AssetHolding> {
        let symbol = Symbol::new(symbol)?;
        self.ledger.holding(user, &symbol)
    }

    /// Profile view: every holding of a user, by symbol.
    pub fn holdings(&self, user: UserId) -> Vec<AssetHolding> {
        self.ledger.holdings_for(user)
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.store.order(id)
    }

    pub fn orders_for_user(&self, user: UserId) -> Vec<Order> {
        self.store.orders_for_user(user)
    }

    pub fn all_orders(&self) -> Vec<Order> {
        self.store.all_orders()
    }

    /// Orders matching the filter, best price first then earliest.
    pub fn open_orders(&self, filter: &OrderFilter) -> Vec<Order> {
        self.store.list(filter)
    }

    pub fn order_book(&self, symbol: &str) -> Result<BookSnapshot, EngineError> {
        let symbol = self.tradable_symbol(symbol)?;
        Ok(self.store.book_snapshot(&symbol, self.config.book.depth_limit))
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.store.trades()
    }

    pub fn trades_for_order(&self, order_id: OrderId) -> Vec<Trade> {
        self.store.trades_for_order(order_id)
    }

    pub fn trade_count(&self) -> usize {
        self.store.trade_count()
    }

    pub fn fees_collected(&self) -> Quote {
        *self.fees_collected.lock()
    }

    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        let journal = self.journal.lock();
        let start = journal.len().saturating_sub(count);
        journal.iter().skip(start).cloned().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().iter().cloned().collect()
    }

    pub(super) fn tradable_symbol(&self, raw: &str) -> Result<Symbol, EngineError> {
        let symbol = Symbol::new(raw).ok_or_else(|| EngineError::InvalidOrder {
            reason: format!("symbol '{raw}' is not alphanumeric"),
        })?;
        if symbol.len() > self.config.symbols.max_len {
            return Err(EngineError::InvalidOrder {
                reason: format!(
                    "symbol '{symbol}' longer than {} characters",
                    self.config.symbols.max_len
                ),
            });
        }
        if self.config.is_quote_symbol(&symbol) {
            return Err(EngineError::InvalidOrder {
                reason: format!("{symbol} is the quote currency"),
            });
        }
        Ok(symbol)
    }

    pub(super) fn check_positive(
        &self,
        value: Decimal,
        max_scale: u32,
        what: &str,
    ) -> Result<(), EngineError> {
        if value <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount {
                reason: format!("{what} must be positive, got {value}"),
            });
        }
        if value.normalize().scale() > max_scale {
            return Err(EngineError::InvalidAmount {
                reason: format!("{what} {value} has more than {max_scale} decimal places"),
            });
        }
        Ok(())
    }

    pub(super) fn dispatch_match(&self, order_id: OrderId) {
        let trigger = self.trigger.read().clone();
        if let Some(trigger) = trigger {
            trigger.dispatch(order_id);
        }
    }

    /// Journals the event and hands it to every sink. Call only after commit,
    /// with no row locks held.
    pub(super) fn emit(&self, payload: EventPayload) -> EventId {
        // ids are handed out under the journal lock so journal order is id order
        let event = {
            let mut journal = self.journal.lock();
            let id = EventId(self.next_event_id.fetch_add(1, Ordering::SeqCst));
            let event = Event::new(id, self.now(), payload);
            journal.push_back(event.clone());
            while journal.len() > self.engine_config.max_events {
                journal.pop_front();
            }
            event
        };
        let id = event.id;

        let sinks: Vec<Arc<dyn EventSink>> = self.sinks.read().clone();
        for sink in sinks {
            if let Err(e) = sink.publish(&event) {
                warn!(sink = sink.name(), event_id = id.0, error = %e, "Event publication failed");
            }
        }

        id
    }
}
