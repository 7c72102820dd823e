//! Order admission: validate, reserve funds or assets, persist OPEN.

use super::core::Exchange;
use super::results::EngineError;
use crate::events::{EventPayload, OrderPlacedEvent};
use crate::ledger::LedgerError;
use crate::order::Order;
use crate::rowlock::RowSet;
use crate::settlement::reserve_cost;
use crate::types::{Price, Side, UserId};
use rust_decimal::Decimal;
use tracing::info;

impl Exchange {
    /// Place a limit order.
    ///
    /// A BUY reserves `price × amount` of the user's cash, rounded up to the
    /// cash scale, and records it on the order as `locked_usd`. A SELL moves
    /// `amount` of the symbol from available to locked. Either the reservation
    /// and the OPEN order both exist afterwards or neither does.
    ///
    /// The order is stored and listed on its book only after `OrderPlaced` is
    /// published, so no fill or cancel of it can reach the journal first.
    /// Matching is not run here; the installed trigger, if any, is handed the
    /// new order id afterwards.
    pub fn place_order(
        &self,
        user: UserId,
        symbol: &str,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<Order, EngineError> {
        let symbol = self.tradable_symbol(symbol)?;
        let price = Price::new(price).ok_or_else(|| EngineError::InvalidOrder {
            reason: format!("price must be positive, got {price}"),
        })?;
        self.check_positive(price.value(), self.config.precision.cash_scale, "price")?;
        self.check_positive(amount, self.config.precision.asset_scale, "amount")?;

        let user_row = self.ledger.user_row(user).ok_or(EngineError::UserNotFound(user))?;

        let order = match side {
            Side::Buy => {
                let total_cost = reserve_cost(price, amount, self.config.precision.cash_scale)?;

                let rows = RowSet::new(vec![(user, user_row)]);
                let mut users = rows.lock();
                users
                    .get_mut(&user)
                    .ok_or(EngineError::UserNotFound(user))?
                    .lock_cash(total_cost)?;

                let order = Order::new(
                    self.store.next_order_id(),
                    user,
                    symbol,
                    side,
                    price,
                    amount,
                    Some(total_cost),
                    self.now(),
                );
                users.commit();
                order
            }
            Side::Sell => {
                let holding_row = self.ledger.holding_row(user, &symbol).ok_or_else(|| {
                    LedgerError::InsufficientAsset {
                        user,
                        symbol: symbol.clone(),
                        requested: amount,
                        available: Decimal::ZERO,
                    }
                })?;

                let key = (user, symbol.clone());
                let rows = RowSet::new(vec![(key.clone(), holding_row)]);
                let mut holdings = rows.lock();
                holdings
                    .get_mut(&key)
                    .ok_or(EngineError::UserNotFound(user))?
                    .lock(amount)?;

                let order = Order::new(
                    self.store.next_order_id(),
                    user,
                    symbol,
                    side,
                    price,
                    amount,
                    None,
                    self.now(),
                );
                holdings.commit();
                order
            }
        };

        info!(
            order_id = %order.id,
            user = %user,
            symbol = %order.symbol,
            side = %order.side,
            price = %order.price,
            amount = %order.remaining_amount,
            "Order admitted"
        );

        self.emit(EventPayload::OrderPlaced(OrderPlacedEvent {
            order_id: order.id,
            user_id: user,
            symbol: order.symbol.clone(),
            side,
            price: order.price,
            amount: order.remaining_amount,
            locked_usd: order.locked_usd,
        }));
        self.store.insert(order.clone());
        self.dispatch_match(order.id);

        Ok(order)
    }
}
