//! Idle session watchdog.
//!
//! The watchdog tracks the time of the last user interaction and ends the
//! session once nothing has happened for the configured idle timeout
//! (one hour by default).
//!
//! # State Machine
//!
//! ```text
//!            activity (reschedule)
//!              +------+
//!              v      |
//!           +--------+    deadline reached and     +---------+
//!  start -> | Active | -- elapsed >= timeout -----> | Expired |
//!           +--------+                              +---------+
//! ```
//!
//! There is only ever one pending deadline: `last_activity + idle_timeout`,
//! re-derived each time the loop wakes, never accumulated.
//!
//! On expiry the watchdog writes a `pendingToast` hand-off record and the
//! current `lastPage`, then terminates the session through the
//! [`SessionGuard`]. When the session ends by any other path the watchdog's
//! token is cancelled too, which drops its timer and its activity receiver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::handoff::HandoffStore;
use crate::session::{SessionGuard, TerminationReason};
use crate::types::{HandoffRecord, Severity};

/// User interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    PointerDown,
    KeyDown,
    TouchStart,
    Scroll,
}

/// Watchdog lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Active,
    /// Terminal. A new watchdog is created for the next session.
    Expired,
}

#[derive(Debug)]
enum WatchdogInput {
    Activity { kind: ActivityKind, at: Instant },
    Navigated(String),
}

/// Last observed user activity. Owned by the watchdog task.
#[derive(Debug, Clone, Copy)]
struct ActivityState {
    last_activity_at: Instant,
}

impl ActivityState {
    fn touch(&mut self, at: Instant) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
    }
}

/// Builds the logout message for a given idle timeout.
#[must_use]
pub fn inactivity_message(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    let (amount, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("You were logged out due to {amount} {unit}{plural} of inactivity.")
}

/// Spawner for the idle watchdog task.
#[derive(Debug)]
pub struct IdleWatchdog;

impl IdleWatchdog {
    /// Starts a watchdog for `guard`'s session, active as of now.
    pub fn spawn(
        idle_timeout: Duration,
        handoff: Arc<HandoffStore>,
        guard: Arc<SessionGuard>,
    ) -> WatchdogHandle {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WatchdogState::Active);
        let token = guard.child_token();

        let activity = ActivityState {
            last_activity_at: Instant::now(),
        };

        let task = tokio::spawn(run_watchdog(
            idle_timeout,
            activity,
            input_rx,
            state_tx,
            handoff,
            guard,
            token.clone(),
        ));

        WatchdogHandle {
            input: input_tx,
            state: state_rx,
            token,
            task,
        }
    }
}

/// Handle used to feed activity to a running watchdog.
#[derive(Debug)]
pub struct WatchdogHandle {
    input: mpsc::UnboundedSender<WatchdogInput>,
    state: watch::Receiver<WatchdogState>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    /// Reports a user interaction that happened now.
    ///
    /// Returns `false` once the watchdog has stopped listening.
    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        self.input
            .send(WatchdogInput::Activity {
                kind,
                at: Instant::now(),
            })
            .is_ok()
    }

    /// Reports a navigation; the page is written to `lastPage` right away.
    pub fn navigated(&self, page: impl Into<String>) -> bool {
        self.input
            .send(WatchdogInput::Navigated(page.into()))
            .is_ok()
    }

    #[must_use]
    pub fn state(&self) -> WatchdogState {
        *self.state.borrow()
    }

    /// Detaches the watchdog without ending the session.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the watchdog task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Watchdog task ended abnormally");
        }
    }
}

async fn run_watchdog(
    idle_timeout: Duration,
    mut activity: ActivityState,
    mut input_rx: mpsc::UnboundedReceiver<WatchdogInput>,
    state_tx: watch::Sender<WatchdogState>,
    handoff: Arc<HandoffStore>,
    guard: Arc<SessionGuard>,
    token: CancellationToken,
) {
    let mut current_page = handoff.last_page();

    debug!(
        idle_timeout_secs = idle_timeout.as_secs(),
        "Idle watchdog started"
    );

    loop {
        // No deadline when the timeout reaches past what `Instant` can hold
        let deadline = activity.last_activity_at.checked_add(idle_timeout);

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Idle watchdog detached");
                return;
            }
            input = input_rx.recv() => match input {
                Some(WatchdogInput::Activity { kind, at }) => {
                    trace!(?kind, "User activity");
                    activity.touch(at);
                }
                Some(WatchdogInput::Navigated(page)) => {
                    if let Err(e) = handoff.set_last_page(&page) {
                        warn!(error = %e, page = %page, "Failed to record last page");
                    }
                    current_page = Some(page);
                }
                None => {
                    debug!("Watchdog handle dropped");
                    return;
                }
            },
            _ = sleep_until(deadline.unwrap_or(activity.last_activity_at)), if deadline.is_some() => {
                let idle_for = Instant::now().saturating_duration_since(activity.last_activity_at);
                if idle_for < idle_timeout {
                    continue;
                }

                expire(idle_timeout, idle_for, current_page.as_deref(), &handoff);
                let _ = state_tx.send(WatchdogState::Expired);
                guard.terminate(TerminationReason::IdleTimeout);
                return;
            }
        }
    }
}

/// Writes the hand-off state for the next screen.
fn expire(idle_timeout: Duration, idle_for: Duration, page: Option<&str>, handoff: &HandoffStore) {
    info!(idle_secs = idle_for.as_secs(), "Session idle timeout reached");

    let record = HandoffRecord {
        message: inactivity_message(idle_timeout),
        severity: Severity::Error,
    };
    if let Err(e) = handoff.put_toast(record) {
        warn!(error = %e, "Failed to store logout message");
    }

    if let Some(page) = page {
        if let Err(e) = handoff.set_last_page(page) {
            warn!(error = %e, "Failed to store last page");
        }
    }
}
