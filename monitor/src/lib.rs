//! Shopwatch Monitor - order and stock change notifier.
//!
//! This crate polls a store backend for its orders and stock items, detects
//! meaningful changes between consecutive snapshots and raises notifications
//! for them. An idle watchdog ends the signed-in session after a period of
//! inactivity and leaves a message for the next screen through a small
//! persistent hand-off store.
//!
//! # Overview
//!
//! ```text
//! Poller --(orders, stock)--> DiffEngine --> DedupStore --> Notifier
//!                                                            |    |
//!                                          EphemeralAlert <--+    +--> create_notification
//! ```
//!
//! Every transition is notified at most once per session, new orders only
//! when they are recent, and the very first snapshot of each collection is a
//! silent baseline.
//!
//! # Modules
//!
//! - [`types`]: Wire types and transitions
//! - [`api`]: Remote store API trait and reqwest client
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations
//! - [`poller`]: Fixed-interval snapshot polling
//! - [`diff`]: Snapshot comparison rules
//! - [`dedup`]: At-most-once admission of transitions
//! - [`notifier`]: Alerts, notification persistence and the notification feed
//! - [`pipeline`]: Diff, dedup and notify wired for the poller
//! - [`handoff`]: Take-once state surviving a reload
//! - [`session`]: Session lifecycle and credential storage
//! - [`watchdog`]: Idle session watchdog

pub mod api;
pub mod config;
pub mod dedup;
pub mod diff;
pub mod error;
pub mod handoff;
pub mod notifier;
pub mod pipeline;
pub mod poller;
pub mod session;
pub mod types;
pub mod watchdog;

pub use api::{ApiError, HttpApi, RemoteApi};
pub use config::{Config, ConfigError, NotificationPreferences};
pub use dedup::DedupStore;
pub use diff::DiffEngine;
pub use error::{MonitorError, Result};
pub use handoff::{HandoffError, HandoffStore};
pub use notifier::{NotificationFeed, Notifier, NotifierOutput};
pub use pipeline::ChangePipeline;
pub use poller::{PollOutcome, PollerHandle, SnapshotSink};
pub use session::{
    sign_in, CredentialStore, Session, SessionError, SessionGuard, SessionSettings,
    TerminationHook, TerminationReason,
};
pub use types::{
    EphemeralAlert, NotificationRecord, Order, OrderStatus, Severity, StockItem, Transition,
    TransitionKind,
};
pub use watchdog::{ActivityKind, IdleWatchdog, WatchdogHandle, WatchdogState};
