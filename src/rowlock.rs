//! Exclusive row locks for units of work.
//!
//! Every mutating operation locks the rows it touches through a [`RowSet`], which
//! sorts rows by key so that all callers acquire same-type rows in one global
//! order. Locked rows are copied into a [`Staged`] scratch area; mutations hit the
//! copies and only [`Staged::commit`] writes them back. Dropping a `Staged`
//! without committing releases the locks and discards every change.
//!
//! Lock hierarchy across types: orders, then users, then asset holdings.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type Row<T> = Arc<Mutex<T>>;

pub fn new_row<T>(value: T) -> Row<T> {
    Arc::new(Mutex::new(value))
}

/// Rows of one type, sorted ascending by key with duplicates removed.
pub struct RowSet<K, T> {
    rows: Vec<(K, Row<T>)>,
}

impl<K: Ord + Clone, T: Clone> RowSet<K, T> {
    pub fn new(mut rows: Vec<(K, Row<T>)>) -> Self {
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows.dedup_by(|a, b| a.0 == b.0);
        Self { rows }
    }

    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Blocks until every row is held, in key order.
    pub fn lock(&self) -> Staged<'_, K, T> {
        let mut guards = Vec::with_capacity(self.rows.len());
        let mut staged = BTreeMap::new();
        for (key, row) in &self.rows {
            let guard = row.lock();
            staged.insert(key.clone(), (*guard).clone());
            guards.push((key.clone(), guard));
        }
        Staged { guards, staged }
    }
}

/// Held rows plus their working copies.
pub struct Staged<'a, K, T> {
    guards: Vec<(K, MutexGuard<'a, T>)>,
    staged: BTreeMap<K, T>,
}

impl<'a, K: Ord, T> Staged<'a, K, T> {
    pub fn get(&self, key: &K) -> Option<&T> {
        self.staged.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut T> {
        self.staged.get_mut(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.staged.contains_key(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.staged.values()
    }

    /// Writes every staged copy back into its row and releases the locks.
    pub fn commit(self) {
        let Staged { mut guards, mut staged } = self;
        for (key, guard) in guards.iter_mut() {
            if let Some(row) = staged.remove(key) {
                **guard = row;
            }
        }
    }
}
