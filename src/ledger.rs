//! Cash and asset bookkeeping.
//!
//! Users hold a single cash balance in the quote currency. Asset holdings are
//! keyed by (user, symbol) and split into `available` and `locked`. The ledger
//! knows nothing about orders: callers record what they locked on the order
//! itself.
//!
//! Row operations mutate a row in place and are only reachable through a
//! [`Staged`](crate::rowlock::Staged) copy, so every call happens with the row
//! exclusively held.

use crate::rowlock::{new_row, Row};
use crate::types::{Quote, Symbol, Timestamp, UserId};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub type HoldingKey = (UserId, Symbol);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub cash_balance: Quote,
    pub total_deposited: Quote,
    pub created_at: Timestamp,
}

impl UserAccount {
    pub fn new(id: UserId, timestamp: Timestamp) -> Self {
        Self {
            id,
            cash_balance: Quote::zero(),
            total_deposited: Quote::zero(),
            created_at: timestamp,
        }
    }

    pub fn deposit(&mut self, amount: Quote) -> Result<(), LedgerError> {
        let total = self
            .total_deposited
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { user: self.id })?;
        self.credit_cash(amount)?;
        self.total_deposited = total;
        Ok(())
    }

    pub fn credit_cash(&mut self, amount: Quote) -> Result<(), LedgerError> {
        debug_assert!(!amount.is_negative());
        self.cash_balance = self
            .cash_balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { user: self.id })?;
        Ok(())
    }

    pub fn debit_cash(&mut self, amount: Quote) -> Result<(), LedgerError> {
        if amount > self.cash_balance {
            return Err(LedgerError::InsufficientFunds {
                user: self.id,
                requested: amount,
                available: self.cash_balance,
            });
        }
        self.cash_balance = self.cash_balance.sub(amount);
        Ok(())
    }

    /// Takes `amount` out of available cash. The caller keeps the locked figure
    /// on the order that reserved it.
    pub fn lock_cash(&mut self, amount: Quote) -> Result<(), LedgerError> {
        self.debit_cash(amount)
    }

    pub fn unlock_cash(&mut self, amount: Quote) -> Result<(), LedgerError> {
        self.credit_cash(amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetHolding {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub available: Decimal,
    pub locked: Decimal,
}

impl AssetHolding {
    pub fn new(user_id: UserId, symbol: Symbol) -> Self {
        Self {
            user_id,
            symbol,
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    pub fn key(&self) -> HoldingKey {
        (self.user_id, self.symbol.clone())
    }

    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    pub fn lock(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.available {
            return Err(LedgerError::InsufficientAsset {
                user: self.user_id,
                symbol: self.symbol.clone(),
                requested: amount,
                available: self.available,
            });
        }
        let locked = self.checked_sum(self.locked, amount)?;
        self.available -= amount;
        self.locked = locked;
        Ok(())
    }

    /// Unlock-and-keep: the amount returns to `available`.
    pub fn unlock(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        self.check_locked(amount)?;
        let available = self.checked_sum(self.available, amount)?;
        self.locked -= amount;
        self.available = available;
        Ok(())
    }

    /// Unlock-and-transfer-out: the amount leaves this holding for good.
    pub fn transfer_out_locked(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        self.check_locked(amount)?;
        self.locked -= amount;
        Ok(())
    }

    pub fn credit_available(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        debug_assert!(amount >= Decimal::ZERO);
        self.available = self.checked_sum(self.available, amount)?;
        Ok(())
    }

    fn checked_sum(&self, balance: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
        balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { user: self.user_id })
    }

    fn check_locked(&self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.locked {
            return Err(LedgerError::InsufficientLocked {
                user: self.user_id,
                symbol: self.symbol.clone(),
                requested: amount,
                locked: self.locked,
            });
        }
        Ok(())
    }
}

/// Registry of lockable user and holding rows.
#[derive(Debug, Default)]
pub struct Ledger {
    users: RwLock<HashMap<UserId, Row<UserAccount>>>,
    holdings: RwLock<HashMap<HoldingKey, Row<AssetHolding>>>,
    next_user_id: AtomicU64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_user(&self, timestamp: Timestamp) -> UserId {
        let id = UserId(self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.users
            .write()
            .insert(id, new_row(UserAccount::new(id, timestamp)));
        id
    }

    pub fn user_row(&self, id: UserId) -> Option<Row<UserAccount>> {
        self.users.read().get(&id).cloned()
    }

    pub fn holding_row(&self, user: UserId, symbol: &Symbol) -> Option<Row<AssetHolding>> {
        self.holdings.read().get(&(user, symbol.clone())).cloned()
    }

    /// Holdings are created lazily. An empty holding carries no balance, so
    /// creating one outside a committed unit changes nothing observable.
    pub fn holding_row_or_create(&self, user: UserId, symbol: &Symbol) -> Row<AssetHolding> {
        if let Some(row) = self.holding_row(user, symbol) {
            return row;
        }
        self.holdings
            .write()
            .entry((user, symbol.clone()))
            .or_insert_with(|| new_row(AssetHolding::new(user, symbol.clone())))
            .clone()
    }

    pub fn user(&self, id: UserId) -> Option<UserAccount> {
        let row = self.user_row(id)?;
        let snapshot = row.lock().clone();
        Some(snapshot)
    }

    pub fn holding(&self, user: UserId, symbol: &Symbol) -> Option<AssetHolding> {
        let row = self.holding_row(user, symbol)?;
        let snapshot = row.lock().clone();
        Some(snapshot)
    }

    pub fn holdings_for(&self, user: UserId) -> Vec<AssetHolding> {
        let rows: Vec<Row<AssetHolding>> = self
            .holdings
            .read()
            .iter()
            .filter(|((owner, _), _)| *owner == user)
            .map(|(_, row)| row.clone())
            .collect();
        let mut holdings: Vec<AssetHolding> = rows.iter().map(|r| r.lock().clone()).collect();
        holdings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        holdings
    }

    pub fn users(&self) -> Vec<UserAccount> {
        let rows: Vec<Row<UserAccount>> = self.users.read().values().cloned().collect();
        let mut users: Vec<UserAccount> = rows.iter().map(|r| r.lock().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub fn all_holdings(&self) -> Vec<AssetHolding> {
        let rows: Vec<Row<AssetHolding>> = self.holdings.read().values().cloned().collect();
        let mut holdings: Vec<AssetHolding> = rows.iter().map(|r| r.lock().clone()).collect();
        holdings.sort_by_key(|h| h.key());
        holdings
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds for {user}: requested {requested}, available {available}")]
    InsufficientFunds {
        user: UserId,
        requested: Quote,
        available: Quote,
    },

    #[error("Insufficient {symbol} for {user}: requested {requested}, available {available}")]
    InsufficientAsset {
        user: UserId,
        symbol: Symbol,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Balance of {user} would overflow")]
    BalanceOverflow { user: UserId },

    #[error("Locked {symbol} for {user} below release: requested {requested}, locked {locked}")]
    InsufficientLocked {
        user: UserId,
        symbol: Symbol,
        requested: Decimal,
        locked: Decimal,
    },
}
