//! Snapshot diffing for orders and stock items.
//!
//! The [`DiffEngine`] holds the previous snapshot of each polled collection
//! and turns a freshly fetched collection into [`Transition`]s:
//!
//! - **NewOrder**: an order id absent from the previous snapshot whose
//!   creation date falls inside the freshness window
//! - **OrderCancelled**: a known order whose status changed to `Cancelled`
//! - **OutOfStock**: a known item whose quantity dropped from above zero to
//!   zero or below
//!
//! # Seeding
//!
//! While a snapshot is empty the next non-empty fetch becomes the baseline
//! and yields no transitions, so existing history is never reported as new.
//!
//! Each call replaces the held snapshot wholesale; nothing is merged.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, trace};

use crate::config::{NotificationPreferences, DEFAULT_FRESHNESS_WINDOW_SECS};
use crate::types::{EntityId, Order, OrderStatus, StockItem, Transition, TransitionKind};

/// Naive formats accepted in addition to RFC 3339. Interpreted as UTC.
const NAIVE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Stateful comparator over consecutive snapshots.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    orders: HashMap<EntityId, OrderStatus>,
    stock: HashMap<EntityId, i64>,
    preferences: NotificationPreferences,
    freshness_window: chrono::Duration,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(
            NotificationPreferences::default(),
            Duration::from_secs(DEFAULT_FRESHNESS_WINDOW_SECS),
        )
    }
}

impl DiffEngine {
    /// Creates an engine with empty snapshots.
    #[must_use]
    pub fn new(preferences: NotificationPreferences, freshness_window: Duration) -> Self {
        Self {
            orders: HashMap::new(),
            stock: HashMap::new(),
            preferences,
            freshness_window: chrono::Duration::from_std(freshness_window)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Classifies a fetched orders collection against the held snapshot.
    ///
    /// `now` is the reference point for the freshness window.
    pub fn diff_orders(&mut self, orders: &[Order], now: DateTime<Utc>) -> Vec<Transition> {
        let next: HashMap<EntityId, OrderStatus> =
            orders.iter().map(|order| (order.id, order.status)).collect();

        if self.orders.is_empty() {
            debug!(orders = next.len(), "Seeding order snapshot");
            self.orders = next;
            return Vec::new();
        }

        let mut transitions = Vec::new();

        for order in orders {
            match self.orders.get(&order.id) {
                None => {
                    if !self.preferences.new_orders {
                        continue;
                    }
                    if !self.is_fresh(&order.date, now) {
                        trace!(order_id = order.id, date = %order.date, "Skipping historical order");
                        continue;
                    }
                    transitions.push(Transition::new(
                        order.id,
                        TransitionKind::NewOrder,
                        order.customer_name.clone(),
                    ));
                }
                Some(previous) if *previous != order.status => {
                    if order.status == OrderStatus::Cancelled
                        && self.preferences.order_cancellations
                    {
                        transitions.push(Transition::new(
                            order.id,
                            TransitionKind::OrderCancelled,
                            order.customer_name.clone(),
                        ));
                    }
                }
                Some(_) => {}
            }
        }

        self.orders = next;
        transitions
    }

    /// Classifies a fetched stock collection against the held snapshot.
    pub fn diff_stock(&mut self, items: &[StockItem]) -> Vec<Transition> {
        let next: HashMap<EntityId, i64> =
            items.iter().map(|item| (item.id, item.quantity())).collect();

        if self.stock.is_empty() {
            debug!(items = next.len(), "Seeding stock snapshot");
            self.stock = next;
            return Vec::new();
        }

        let mut transitions = Vec::new();

        if self.preferences.out_of_stock {
            for item in items {
                let ran_out = matches!(self.stock.get(&item.id), Some(&previous) if previous > 0)
                    && item.quantity() <= 0;
                if ran_out {
                    transitions.push(Transition::new(
                        item.id,
                        TransitionKind::OutOfStock,
                        item.name.clone(),
                    ));
                }
            }
        }

        self.stock = next;
        transitions
    }

    /// Number of orders in the held snapshot.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of stock items in the held snapshot.
    #[must_use]
    pub fn stock_count(&self) -> usize {
        self.stock.len()
    }

    /// Whether an order created at `date` is recent enough to announce.
    ///
    /// An unparseable date counts as fresh so a real new order is never
    /// dropped silently.
    fn is_fresh(&self, date: &str, now: DateTime<Utc>) -> bool {
        match parse_order_date(date) {
            Some(created) => now.signed_duration_since(created) <= self.freshness_window,
            None => true,
        }
    }
}

/// Parses an order creation timestamp.
#[must_use]
pub fn parse_order_date(date: &str) -> Option<DateTime<Utc>> {
    let date = date.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(date, format).ok())
        .map(|naive| naive.and_utc())
}
