//! Cancellation of OPEN orders with release of whatever they still reserve.

use super::core::Exchange;
use super::results::{CancelResult, EngineError};
use crate::events::{EventPayload, OrderCanceledEvent};
use crate::rowlock::RowSet;
use crate::types::{OrderId, Quote, Side, UserId};
use rust_decimal::Decimal;
use tracing::info;

impl Exchange {
    /// Cancels `order_id` on behalf of `user`.
    ///
    /// An order owned by someone else reads as not found. A BUY returns its
    /// remaining `locked_usd` to the user's cash and keeps zero on the order; a
    /// SELL moves its `remaining_amount` from locked back to available.
    pub fn cancel_order(&self, user: UserId, order_id: OrderId) -> Result<CancelResult, EngineError> {
        let row = self
            .store
            .order_row(order_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;

        let order_rows = RowSet::new(vec![(order_id, row)]);
        let mut orders = order_rows.lock();
        let order = orders
            .get_mut(&order_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;

        if order.user_id != user {
            return Err(EngineError::OrderNotFound(order_id));
        }
        if !order.is_open() {
            return Err(EngineError::InvalidState {
                order_id,
                status: order.status,
            });
        }

        let (refunded_cash, released_asset) = match order.side {
            Side::Buy => {
                let user_row = self.ledger.user_row(user).ok_or(EngineError::UserNotFound(user))?;
                let user_rows = RowSet::new(vec![(user, user_row)]);
                let mut users = user_rows.lock();

                let refund = order.locked_usd.unwrap_or_default();
                users
                    .get_mut(&user)
                    .ok_or(EngineError::UserNotFound(user))?
                    .unlock_cash(refund)?;
                order.locked_usd = Some(Quote::zero());
                order.cancel();
                self.store.sync_book(order);
                users.commit();
                (refund, Decimal::ZERO)
            }
            Side::Sell => {
                let key = (user, order.symbol.clone());
                let holding_row = self.ledger.holding_row_or_create(user, &order.symbol);
                let holding_rows = RowSet::new(vec![(key.clone(), holding_row)]);
                let mut holdings = holding_rows.lock();

                let released = order.remaining_amount;
                holdings
                    .get_mut(&key)
                    .ok_or(EngineError::UserNotFound(user))?
                    .unlock(released)?;
                order.cancel();
                self.store.sync_book(order);
                holdings.commit();
                (Quote::zero(), released)
            }
        };

        let cancelled = order.clone();
        orders.commit();

        info!(
            order_id = %order_id,
            user = %user,
            side = %cancelled.side,
            refunded_cash = %refunded_cash,
            released_asset = %released_asset,
            "Order cancelled"
        );

        self.emit(EventPayload::OrderCanceled(OrderCanceledEvent {
            order_id,
            user_id: user,
            symbol: cancelled.symbol.clone(),
            side: cancelled.side,
            refunded_cash,
            released_asset,
        }));

        Ok(CancelResult {
            order: cancelled,
            refunded_cash,
            released_asset,
        })
    }
}
