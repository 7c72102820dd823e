//! Asynchronous matching trigger and worker pool.
//!
//! Admission hands each new order id to a [`MatchTrigger`] after commit. The
//! channel trigger queues ids for a pool of threads that sweep each one with
//! `match_until_idle`. Workers exit once every sender is gone, so shutting down
//! means clearing the exchange's trigger and joining the pool.

use super::core::Exchange;
use crate::types::OrderId;
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

pub trait MatchTrigger: Send + Sync {
    fn dispatch(&self, order_id: OrderId);
}

/// Queues order ids on an unbounded crossbeam channel.
#[derive(Clone)]
pub struct ChannelTrigger {
    tx: Sender<OrderId>,
}

impl ChannelTrigger {
    pub fn new(tx: Sender<OrderId>) -> Self {
        Self { tx }
    }

    /// Trigger plus the receiving end for [`MatchWorkers::spawn`].
    pub fn channel() -> (Self, Receiver<OrderId>) {
        let (tx, rx) = channel::unbounded();
        (Self::new(tx), rx)
    }
}

impl MatchTrigger for ChannelTrigger {
    fn dispatch(&self, order_id: OrderId) {
        if self.tx.send(order_id).is_err() {
            warn!(order_id = %order_id, "Match queue closed, order left unmatched");
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub orders_swept: usize,
    pub fills: usize,
    pub failures: usize,
}

impl WorkerStats {
    fn merge(self, other: WorkerStats) -> WorkerStats {
        WorkerStats {
            orders_swept: self.orders_swept + other.orders_swept,
            fills: self.fills + other.fills,
            failures: self.failures + other.failures,
        }
    }
}

pub struct MatchWorkers {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl MatchWorkers {
    pub fn spawn(exchange: Arc<Exchange>, rx: Receiver<OrderId>, workers: usize) -> Self {
        let handles = (0..workers.max(1))
            .map(|worker| {
                let exchange = Arc::clone(&exchange);
                let rx = rx.clone();
                thread::spawn(move || run_worker(worker, &exchange, &rx))
            })
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker to drain the queue and exit.
    pub fn join(self) -> WorkerStats {
        self.handles
            .into_iter()
            .fold(WorkerStats::default(), |total, handle| match handle.join() {
                Ok(stats) => total.merge(stats),
                Err(_) => {
                    error!("Match worker panicked");
                    total.merge(WorkerStats {
                        failures: 1,
                        ..WorkerStats::default()
                    })
                }
            })
    }
}

fn run_worker(worker: usize, exchange: &Exchange, rx: &Receiver<OrderId>) -> WorkerStats {
    let mut stats = WorkerStats::default();

    for order_id in rx.iter() {
        stats.orders_swept += 1;
        match exchange.match_until_idle(order_id) {
            Ok(sweep) => stats.fills += sweep.trades.len(),
            Err(e) => {
                stats.failures += 1;
                warn!(worker, order_id = %order_id, error = %e, "Match sweep failed");
            }
        }
    }

    debug!(worker, ?stats, "Match worker stopped");
    stats
}
