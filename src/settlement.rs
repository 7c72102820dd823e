// 4.0 settlement.rs: fill math and the settlement instructions for one fill.
// 4.1 FillTerms fixes size, price, volume, fee. maker's price always wins.
//     cash is held at the cash scale: reserves round up, fill volumes round down.
// 4.2 SettlementPlan turns terms into per-side instructions, labelled by BUY/SELL side
//     rather than taker/maker role. the fee is charged once, to the taker only.
//     a BUY order's reserve always equals reserve_cost(price, remaining).
// 4.3 execute() applies a plan to staged rows. any failure leaves the staging dirty but
//     uncommitted, so the caller's unit of work aborts with no side effects.

use crate::config::FeeConfig;
use crate::ledger::{AssetHolding, HoldingKey, LedgerError, UserAccount};
use crate::order::Order;
use crate::rowlock::Staged;
use crate::types::{OrderId, Price, Quote, Side, Symbol, UserId};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Taker,
    Maker,
}

/// Size, price and cost of one fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillTerms {
    pub amount: Decimal,
    pub price: Price,
    pub volume: Quote,
    pub fee: Quote,
}

pub fn checked_cost(price: Price, amount: Decimal) -> Result<Quote, SettlementError> {
    price
        .value()
        .checked_mul(amount)
        .map(Quote::new)
        .ok_or(SettlementError::ArithmeticOverflow)
}

/// Cash a BUY of `amount` at `price` reserves: the exact cost rounded up to
/// the cash scale.
pub fn reserve_cost(price: Price, amount: Decimal, cash_scale: u32) -> Result<Quote, SettlementError> {
    let exact = checked_cost(price, amount)?;
    Ok(Quote::new(
        exact
            .value()
            .round_dp_with_strategy(cash_scale, RoundingStrategy::ToPositiveInfinity),
    ))
}

/// `volume × rate`, rounded to the cash scale with the configured strategy.
pub fn compute_fee(volume: Quote, fees: &FeeConfig, cash_scale: u32) -> Result<Quote, SettlementError> {
    let raw = volume
        .value()
        .checked_mul(fees.taker_fee_rate)
        .ok_or(SettlementError::ArithmeticOverflow)?;
    Ok(Quote::new(
        raw.round_dp_with_strategy(cash_scale, fees.rounding.strategy()),
    ))
}

pub fn fill_terms(
    taker: &Order,
    maker: &Order,
    fees: &FeeConfig,
    cash_scale: u32,
) -> Result<FillTerms, SettlementError> {
    if !taker.crosses(maker) {
        return Err(SettlementError::NotCrossing {
            taker: taker.id,
            maker: maker.id,
        });
    }

    let amount = taker.remaining_amount.min(maker.remaining_amount);
    let price = maker.price;
    let volume = Quote::new(
        checked_cost(price, amount)?
            .value()
            .round_dp_with_strategy(cash_scale, RoundingStrategy::ToZero),
    );
    let fee = compute_fee(volume, fees, cash_scale)?;

    Ok(FillTerms {
        amount,
        price,
        volume,
        fee,
    })
}

// Why cash moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferReason {
    SpreadRefund,
    SaleProceeds,
    TakerFee,
}

/// One ledger or order mutation of a fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementInstruction {
    // Reduce a BUY order's reserved cash down to the reserve of what stays open
    ReleaseLockedCash { order_id: OrderId, amount: Quote },

    CreditCash { user: UserId, amount: Quote, reason: TransferReason },

    DebitCash { user: UserId, amount: Quote, reason: TransferReason },

    // Locked asset leaves the seller for good
    TransferOutAsset { user: UserId, symbol: Symbol, amount: Decimal },

    CreditAsset { user: UserId, symbol: Symbol, amount: Decimal },

    // Decrement remaining size, FILLED at zero
    FillOrder { order_id: OrderId, amount: Decimal },

    CollectFee { from: UserId, amount: Quote },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyLeg {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub role: Role,
    pub planned_cost: Quote,
    pub actual_cost: Quote,
    pub refund: Quote,
    pub fee: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellLeg {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub role: Role,
    pub revenue: Quote,
    pub fee: Quote,
}

/// Everything one fill does, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub symbol: Symbol,
    pub terms: FillTerms,
    pub buy: BuyLeg,
    pub sell: SellLeg,
    instructions: Vec<SettlementInstruction>,
}

impl SettlementPlan {
    pub fn build(
        taker: &Order,
        maker: &Order,
        terms: FillTerms,
        cash_scale: u32,
    ) -> Result<Self, SettlementError> {
        if !taker.crosses(maker) {
            return Err(SettlementError::NotCrossing {
                taker: taker.id,
                maker: maker.id,
            });
        }

        let (buy_order, sell_order, buy_role, sell_role) = match taker.side {
            Side::Buy => (taker, maker, Role::Taker, Role::Maker),
            Side::Sell => (maker, taker, Role::Maker, Role::Taker),
        };
        let fee_for = |role: Role| match role {
            Role::Taker => terms.fee,
            Role::Maker => Quote::zero(),
        };

        // release whatever the unfilled remainder no longer needs; the last
        // fill releases the whole reserve
        let locked = buy_order.locked_usd.unwrap_or_default();
        let open_after = buy_order.remaining_amount - terms.amount;
        let reserve_after = if open_after > Decimal::ZERO {
            reserve_cost(buy_order.price, open_after, cash_scale)?.min(locked)
        } else {
            Quote::zero()
        };
        let planned_cost = locked.sub(reserve_after);
        let actual_cost = terms.volume.min(planned_cost);
        let refund = planned_cost.sub(actual_cost);

        let buy = BuyLeg {
            order_id: buy_order.id,
            user_id: buy_order.user_id,
            role: buy_role,
            planned_cost,
            actual_cost,
            refund,
            fee: fee_for(buy_role),
        };

        let sell_fee = fee_for(sell_role);
        let sell = SellLeg {
            order_id: sell_order.id,
            user_id: sell_order.user_id,
            role: sell_role,
            revenue: actual_cost.sub(sell_fee),
            fee: sell_fee,
        };

        let symbol = taker.symbol.clone();
        let mut instructions = Vec::with_capacity(9);

        // buyer
        instructions.push(SettlementInstruction::ReleaseLockedCash {
            order_id: buy.order_id,
            amount: planned_cost,
        });
        if refund.is_positive() {
            instructions.push(SettlementInstruction::CreditCash {
                user: buy.user_id,
                amount: refund,
                reason: TransferReason::SpreadRefund,
            });
        }
        if buy.fee.is_positive() {
            instructions.push(SettlementInstruction::DebitCash {
                user: buy.user_id,
                amount: buy.fee,
                reason: TransferReason::TakerFee,
            });
        }
        instructions.push(SettlementInstruction::CreditAsset {
            user: buy.user_id,
            symbol: symbol.clone(),
            amount: terms.amount,
        });

        // seller
        instructions.push(SettlementInstruction::TransferOutAsset {
            user: sell.user_id,
            symbol: symbol.clone(),
            amount: terms.amount,
        });
        instructions.push(SettlementInstruction::CreditCash {
            user: sell.user_id,
            amount: sell.revenue,
            reason: TransferReason::SaleProceeds,
        });

        // fee and order state
        if terms.fee.is_positive() {
            let payer = match taker.side {
                Side::Buy => buy.user_id,
                Side::Sell => sell.user_id,
            };
            instructions.push(SettlementInstruction::CollectFee {
                from: payer,
                amount: terms.fee,
            });
        }
        instructions.push(SettlementInstruction::FillOrder {
            order_id: taker.id,
            amount: terms.amount,
        });
        instructions.push(SettlementInstruction::FillOrder {
            order_id: maker.id,
            amount: terms.amount,
        });

        Ok(Self {
            symbol,
            terms,
            buy,
            sell,
            instructions,
        })
    }

    pub fn instructions(&self) -> &[SettlementInstruction] {
        &self.instructions
    }

    pub fn buy_order_id(&self) -> OrderId {
        self.buy.order_id
    }

    pub fn sell_order_id(&self) -> OrderId {
        self.sell.order_id
    }

    pub fn holding_keys(&self) -> [HoldingKey; 2] {
        [
            (self.buy.user_id, self.symbol.clone()),
            (self.sell.user_id, self.symbol.clone()),
        ]
    }

    // Net change of each user's available cash
    pub fn net_cash_flows(&self) -> HashMap<UserId, Decimal> {
        let mut flows = HashMap::new();

        for instruction in &self.instructions {
            match instruction {
                SettlementInstruction::CreditCash { user, amount, .. } => {
                    *flows.entry(*user).or_insert(Decimal::ZERO) += amount.value();
                }
                SettlementInstruction::DebitCash { user, amount, .. } => {
                    *flows.entry(*user).or_insert(Decimal::ZERO) -= amount.value();
                }
                SettlementInstruction::ReleaseLockedCash { .. }
                | SettlementInstruction::TransferOutAsset { .. }
                | SettlementInstruction::CreditAsset { .. }
                | SettlementInstruction::FillOrder { .. }
                | SettlementInstruction::CollectFee { .. } => {}
            }
        }

        flows
    }

    /// Applies every instruction to the staged rows and returns the fee
    /// collected. Rows must already be locked by the caller.
    pub fn execute(
        &self,
        orders: &mut Staged<'_, OrderId, Order>,
        users: &mut Staged<'_, UserId, UserAccount>,
        holdings: &mut Staged<'_, HoldingKey, AssetHolding>,
    ) -> Result<Quote, SettlementError> {
        let mut fees = Quote::zero();

        for instruction in &self.instructions {
            match instruction {
                SettlementInstruction::ReleaseLockedCash { order_id, amount } => {
                    let order = orders
                        .get_mut(order_id)
                        .ok_or(SettlementError::RowNotHeld("order"))?;
                    let locked = order.locked_usd.unwrap_or_default();
                    if *amount > locked {
                        return Err(SettlementError::LockedCashShortfall {
                            order_id: *order_id,
                            requested: *amount,
                            locked,
                        });
                    }
                    order.locked_usd = Some(locked.sub(*amount));
                }
                SettlementInstruction::CreditCash { user, amount, .. } => {
                    users
                        .get_mut(user)
                        .ok_or(SettlementError::RowNotHeld("user"))?
                        .credit_cash(*amount)?;
                }
                SettlementInstruction::DebitCash { user, amount, .. } => {
                    users
                        .get_mut(user)
                        .ok_or(SettlementError::RowNotHeld("user"))?
                        .debit_cash(*amount)?;
                }
                SettlementInstruction::TransferOutAsset { user, symbol, amount } => {
                    holdings
                        .get_mut(&(*user, symbol.clone()))
                        .ok_or(SettlementError::RowNotHeld("holding"))?
                        .transfer_out_locked(*amount)?;
                }
                SettlementInstruction::CreditAsset { user, symbol, amount } => {
                    holdings
                        .get_mut(&(*user, symbol.clone()))
                        .ok_or(SettlementError::RowNotHeld("holding"))?
                        .credit_available(*amount)?;
                }
                SettlementInstruction::FillOrder { order_id, amount } => {
                    orders
                        .get_mut(order_id)
                        .ok_or(SettlementError::RowNotHeld("order"))?
                        .fill(*amount);
                }
                SettlementInstruction::CollectFee { amount, .. } => {
                    fees = fees
                        .checked_add(*amount)
                        .ok_or(SettlementError::ArithmeticOverflow)?;
                }
            }
        }

        Ok(fees)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettlementError {
    #[error("{taker} does not cross {maker}")]
    NotCrossing { taker: OrderId, maker: OrderId },

    #[error("Arithmetic overflow computing fill amounts")]
    ArithmeticOverflow,

    #[error("Locked cash on {order_id} below release: requested {requested}, locked {locked}")]
    LockedCashShortfall {
        order_id: OrderId,
        requested: Quote,
        locked: Quote,
    },

    #[error("Settlement touched a {0} row that is not held")]
    RowNotHeld(&'static str),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
