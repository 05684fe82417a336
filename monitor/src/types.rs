//! Shared data types for the Shopwatch monitor.
//!
//! This module defines the wire types exchanged with the remote store API
//! (orders, stock items, notification records) and the in-process values
//! produced by the change-detection pipeline (transitions, alerts, hand-off
//! records). All wire types serialize to camelCase JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier of an order or stock item in the remote API.
pub type EntityId = u64;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    /// Any status string this build does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

/// A single line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub product_id: Option<EntityId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: u32,
}

/// An order as returned by the orders collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: OrderStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_name: String,

    /// Creation timestamp as sent by the API, in text form.
    ///
    /// Numbers are kept as their decimal text and any other non-string value
    /// becomes empty, so a record with an odd timestamp never fails the whole
    /// collection. Unparseable values are classified as fresh.
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<OrderItem>,
}

/// A stock-bearing item as returned by the products collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub stock: Option<i64>,
}

impl StockItem {
    /// Observed quantity, treating a missing value as zero.
    #[must_use]
    pub fn quantity(&self) -> i64 {
        self.stock.unwrap_or(0)
    }
}

/// Semantically meaningful change detected between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    NewOrder,
    OrderCancelled,
    OutOfStock,
}

impl TransitionKind {
    /// All kinds, in the order the pipeline reports them.
    pub const ALL: [TransitionKind; 3] = [
        TransitionKind::NewOrder,
        TransitionKind::OrderCancelled,
        TransitionKind::OutOfStock,
    ];
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewOrder => write!(f, "new_order"),
            Self::OrderCancelled => write!(f, "order_cancelled"),
            Self::OutOfStock => write!(f, "out_of_stock"),
        }
    }
}

/// A transition produced by one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub entity_id: EntityId,
    pub kind: TransitionKind,

    /// Human-facing label for the entity (customer name or item name).
    pub subject: String,
}

impl Transition {
    #[must_use]
    pub fn new(entity_id: EntityId, kind: TransitionKind, subject: impl Into<String>) -> Self {
        Self {
            entity_id,
            kind,
            subject: subject.into(),
        }
    }
}

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A one-shot on-screen alert. Consumed once by the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralAlert {
    pub message: String,
    pub severity: Severity,
}

/// Message handed across a reload boundary to the next screen.
///
/// Stored under the `pendingToast` key; same shape as [`EphemeralAlert`].
pub type HandoffRecord = EphemeralAlert;

/// Payload for creating a durable notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub kind: TransitionKind,
}

/// A durable notification record owned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: EntityId,
    pub title: String,
    pub message: String,
    pub kind: TransitionKind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

/// Treats JSON `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_date<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(date) => date,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}
