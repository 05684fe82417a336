//! The change-detection pipeline: diff, dedup, notify.
//!
//! [`ChangePipeline`] is the [`SnapshotSink`] the poller feeds. It owns the
//! [`DiffEngine`] and the [`DedupStore`], so both are only ever touched from
//! the poll task.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::RemoteApi;
use crate::dedup::DedupStore;
use crate::diff::DiffEngine;
use crate::notifier::Notifier;
use crate::poller::SnapshotSink;
use crate::types::{Order, StockItem, Transition};

/// Diff engine, dedup store and notifier wired in sequence.
#[derive(Debug)]
pub struct ChangePipeline<A> {
    diff: DiffEngine,
    dedup: DedupStore,
    notifier: Notifier<A>,
}

impl<A: RemoteApi> ChangePipeline<A> {
    #[must_use]
    pub fn new(diff: DiffEngine, notifier: Notifier<A>) -> Self {
        Self {
            diff,
            dedup: DedupStore::new(),
            notifier,
        }
    }

    /// Diffs an orders fetch and emits every newly admitted transition.
    ///
    /// Returns the transitions that were emitted.
    pub fn process_orders(&mut self, orders: &[Order], now: DateTime<Utc>) -> Vec<Transition> {
        let transitions = self.diff.diff_orders(orders, now);
        self.dispatch(transitions)
    }

    /// Diffs a stock fetch and emits every newly admitted transition.
    pub fn process_stock(&mut self, items: &[StockItem]) -> Vec<Transition> {
        let transitions = self.diff.diff_stock(items);
        self.dispatch(transitions)
    }

    #[must_use]
    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    fn dispatch(&mut self, transitions: Vec<Transition>) -> Vec<Transition> {
        let emitted: Vec<Transition> = transitions
            .into_iter()
            .filter(|t| self.dedup.admit(t))
            .collect();

        for transition in &emitted {
            // Persist runs detached; its outcome never affects the dedup mark.
            drop(self.notifier.emit(transition));
        }

        if !emitted.is_empty() {
            debug!(count = emitted.len(), "Dispatched transitions");
        }
        emitted
    }
}

impl<A: RemoteApi> SnapshotSink for ChangePipeline<A> {
    fn on_orders(&mut self, orders: Vec<Order>) {
        self.process_orders(&orders, Utc::now());
    }

    fn on_stock_items(&mut self, items: Vec<StockItem>) {
        self.process_stock(&items);
    }
}
