//! Matching: one fill per call, best price then earliest arrival.
//!
//! A call picks the best crossing maker from the book index, locks both order
//! rows in id order, re-checks them under the lock and settles one fill. A maker
//! that was filled or cancelled between lookup and lock is skipped and the next
//! best is selected, up to `max_reselect_attempts` times.

use super::core::Exchange;
use super::results::{EngineError, SweepResult};
use crate::events::{EventPayload, TradeExecutedEvent};
use crate::ledger::{AssetHolding, HoldingKey, UserAccount};
use crate::order::Order;
use crate::rowlock::{Row, RowSet, Staged};
use crate::settlement::{fill_terms, SettlementError, SettlementPlan};
use crate::trade::Trade;
use crate::types::{OrderId, Quote, UserId};
use tracing::{debug, info, warn};

enum PairOutcome {
    Settled(Box<SettledFill>),
    TakerClosed,
    MakerChanged,
}

struct SettledFill {
    trade: Trade,
    plan: SettlementPlan,
}

impl Exchange {
    /// Executes at most one fill for `taker_id`.
    ///
    /// Returns `Ok(None)` when the order is missing, no longer OPEN, or nothing
    /// on the other side crosses its limit. On error no row is changed.
    pub fn attempt_match(&self, taker_id: OrderId) -> Result<Option<Trade>, EngineError> {
        let attempts = self.engine_config.max_reselect_attempts.max(1);

        for attempt in 0..attempts {
            let Some(taker_row) = self.store.order_row(taker_id) else {
                debug!(order_id = %taker_id, "Match skipped, unknown order");
                return Ok(None);
            };
            let taker_view = taker_row.lock().clone();
            if !taker_view.is_open() {
                debug!(order_id = %taker_id, status = %taker_view.status, "Match skipped, order not open");
                return Ok(None);
            }

            let Some(maker_id) = self.store.best_crossing(&taker_view) else {
                debug!(order_id = %taker_id, "Nothing crosses");
                return Ok(None);
            };
            let Some(maker_row) = self.store.order_row(maker_id) else {
                continue;
            };

            match self.settle_pair(taker_id, taker_row, maker_id, maker_row)? {
                PairOutcome::Settled(fill) => {
                    self.publish_fill(taker_id, &fill);
                    return Ok(Some(fill.trade));
                }
                PairOutcome::TakerClosed => return Ok(None),
                PairOutcome::MakerChanged => {
                    debug!(order_id = %taker_id, maker = %maker_id, attempt, "Maker changed under lock, reselecting");
                }
            }
        }

        warn!(order_id = %taker_id, attempts, "Gave up reselecting makers");
        Ok(None)
    }

    /// Repeats [`attempt_match`](Self::attempt_match) until it is a no-op or
    /// `max_fills_per_sweep` fills were produced.
    pub fn match_until_idle(&self, taker_id: OrderId) -> Result<SweepResult, EngineError> {
        let mut sweep = SweepResult::default();

        while sweep.trades.len() < self.engine_config.max_fills_per_sweep {
            match self.attempt_match(taker_id)? {
                Some(trade) => sweep.trades.push(trade),
                None => return Ok(sweep),
            }
        }

        sweep.truncated = self
            .store
            .order(taker_id)
            .map_or(false, |o| o.is_open() && self.store.best_crossing(&o).is_some());
        if sweep.truncated {
            warn!(order_id = %taker_id, fills = sweep.trades.len(), "Sweep stopped at fill limit");
        }
        Ok(sweep)
    }

    fn settle_pair(
        &self,
        taker_id: OrderId,
        taker_row: Row<Order>,
        maker_id: OrderId,
        maker_row: Row<Order>,
    ) -> Result<PairOutcome, EngineError> {
        let order_rows = RowSet::new(vec![(taker_id, taker_row), (maker_id, maker_row)]);
        let orders = order_rows.lock();

        let taker = orders
            .get(&taker_id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(taker_id))?;
        let maker = orders
            .get(&maker_id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(maker_id))?;

        if !taker.is_open() {
            return Ok(PairOutcome::TakerClosed);
        }
        if !maker.is_open() || !taker.crosses(&maker) {
            return Ok(PairOutcome::MakerChanged);
        }

        let terms = fill_terms(
            &taker,
            &maker,
            &self.config.fees,
            self.config.precision.cash_scale,
        )?;
        let plan = SettlementPlan::build(
            &taker,
            &maker,
            terms,
            self.config.precision.cash_scale,
        )?;
        let trade = self.settle(&plan, orders)?;

        Ok(PairOutcome::Settled(Box::new(SettledFill { trade, plan })))
    }

    /// Applies one fill to the ledger, both orders, the book and the trade log
    /// as a single unit. The order rows arrive locked; user and holding rows are
    /// locked here, below them in the hierarchy.
    fn settle(
        &self,
        plan: &SettlementPlan,
        mut orders: Staged<'_, OrderId, Order>,
    ) -> Result<Trade, EngineError> {
        let user_rows = RowSet::new(vec![
            self.user_entry(plan.buy.user_id)?,
            self.user_entry(plan.sell.user_id)?,
        ]);
        let holding_rows: RowSet<HoldingKey, AssetHolding> = RowSet::new(
            plan.holding_keys()
                .into_iter()
                .map(|(user, symbol)| {
                    let row = self.ledger.holding_row_or_create(user, &symbol);
                    ((user, symbol), row)
                })
                .collect(),
        );

        let mut users = user_rows.lock();
        let mut holdings = holding_rows.lock();

        // the fee account is credited last; nothing after it can fail
        if let Err(e) = plan
            .execute(&mut orders, &mut users, &mut holdings)
            .and_then(|fee| self.collect_fee(fee))
        {
            warn!(
                buy_order = %plan.buy_order_id(),
                sell_order = %plan.sell_order_id(),
                error = %e,
                "Settlement aborted"
            );
            return Err(e.into());
        }

        let trade = Trade {
            id: self.store.next_trade_id(),
            buy_order_id: plan.buy_order_id(),
            sell_order_id: plan.sell_order_id(),
            symbol: plan.symbol.clone(),
            price: plan.terms.price,
            amount: plan.terms.amount,
            volume: plan.buy.actual_cost,
            fee: plan.terms.fee,
            created_at: self.now(),
        };

        for order in orders.values() {
            self.store.sync_book(order);
        }
        self.store.record_trade(trade.clone());

        holdings.commit();
        users.commit();
        orders.commit();

        Ok(trade)
    }

    fn collect_fee(&self, fee: Quote) -> Result<(), SettlementError> {
        let mut collected = self.fees_collected.lock();
        *collected = collected
            .checked_add(fee)
            .ok_or(SettlementError::ArithmeticOverflow)?;
        Ok(())
    }

    fn user_entry(&self, user: UserId) -> Result<(UserId, Row<UserAccount>), EngineError> {
        let row = self.ledger.user_row(user).ok_or(EngineError::UserNotFound(user))?;
        Ok((user, row))
    }

    fn publish_fill(&self, taker_id: OrderId, fill: &SettledFill) {
        let trade = &fill.trade;
        info!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            price = %trade.price,
            amount = %trade.amount,
            fee = %trade.fee,
            buy_order = %trade.buy_order_id,
            sell_order = %trade.sell_order_id,
            taker = %taker_id,
            "Trade executed"
        );

        self.emit(EventPayload::TradeExecuted(TradeExecutedEvent {
            trade: trade.clone(),
            buyer: fill.plan.buy.user_id,
            seller: fill.plan.sell.user_id,
            taker_order_id: taker_id,
        }));
    }
}
