//! Notification emission and the local notification feed.
//!
//! For every transition admitted by the dedup store, the [`Notifier`]:
//!
//! 1. Renders a title/message pair from the template for its kind
//! 2. Raises an [`EphemeralAlert`] right away from local data
//! 3. Spawns an independent task that persists the notification through the
//!    remote API
//!
//! A failed persist is logged and otherwise ignored: the dedup mark stays in
//! place, so the transition is never retried. A successful persist sets the
//! `refreshNotifications` hand-off flag and forwards the created record so
//! the displayed list can be extended without waiting for a refetch.
//!
//! [`NotificationFeed`] is the locally displayed list of durable records.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, RemoteApi};
use crate::handoff::HandoffStore;
use crate::types::{
    EphemeralAlert, NewNotification, NotificationRecord, Severity, Transition, TransitionKind,
};

/// Output consumed by the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierOutput {
    /// Show once, then discard.
    Alert(EphemeralAlert),
    /// A notification was stored remotely; append it to the visible list.
    Persisted(NotificationRecord),
}

/// Builds the durable notification and the on-screen alert for a transition.
#[must_use]
pub fn render(transition: &Transition) -> (NewNotification, EphemeralAlert) {
    let id = transition.entity_id;
    let subject = &transition.subject;

    let (title, message, severity) = match transition.kind {
        TransitionKind::NewOrder => (
            "New Order Received",
            format!("#{id} from {subject}"),
            Severity::Info,
        ),
        TransitionKind::OrderCancelled => (
            "Order Cancelled",
            format!("#{id} was cancelled by {subject}"),
            Severity::Warning,
        ),
        TransitionKind::OutOfStock => (
            "Out of Stock",
            format!("{subject} is out of stock"),
            Severity::Error,
        ),
    };

    let alert = EphemeralAlert {
        message: format!("{title}: {message}"),
        severity,
    };
    let notification = NewNotification {
        title: title.to_string(),
        message,
        kind: transition.kind,
    };

    (notification, alert)
}

/// Raises alerts and persists notifications for accepted transitions.
#[derive(Debug)]
pub struct Notifier<A> {
    api: Arc<A>,
    handoff: Arc<HandoffStore>,
    output: mpsc::UnboundedSender<NotifierOutput>,
}

impl<A: RemoteApi> Notifier<A> {
    #[must_use]
    pub fn new(
        api: Arc<A>,
        handoff: Arc<HandoffStore>,
        output: mpsc::UnboundedSender<NotifierOutput>,
    ) -> Self {
        Self {
            api,
            handoff,
            output,
        }
    }

    /// Emits one transition.
    ///
    /// The alert is queued before this returns; the remote persist runs on
    /// the returned task and never reports back to the caller.
    pub fn emit(&self, transition: &Transition) -> JoinHandle<()> {
        let (notification, alert) = render(transition);

        info!(
            entity_id = transition.entity_id,
            kind = %transition.kind,
            "Emitting notification"
        );

        if self.output.send(NotifierOutput::Alert(alert)).is_err() {
            debug!("Display channel closed, alert dropped");
        }

        let api = Arc::clone(&self.api);
        let handoff = Arc::clone(&self.handoff);
        let output = self.output.clone();
        let entity_id = transition.entity_id;
        let kind = transition.kind;

        tokio::spawn(async move {
            match api.create_notification(notification).await {
                Ok(record) => {
                    debug!(notification_id = record.id, "Notification persisted");
                    if let Err(e) = handoff.request_notification_refresh() {
                        warn!(error = %e, "Failed to flag notification refresh");
                    }
                    let _ = output.send(NotifierOutput::Persisted(record));
                }
                Err(e) => {
                    warn!(
                        entity_id,
                        kind = %kind,
                        error = %e,
                        "Failed to persist notification"
                    );
                }
            }
        })
    }
}

/// The notification list shown to the user, newest first.
#[derive(Debug, Default, Clone)]
pub struct NotificationFeed {
    records: Vec<NotificationRecord>,
}

impl NotificationFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list with the server's current view.
    ///
    /// # Errors
    ///
    /// Returns the API error unchanged; the existing list is kept.
    pub async fn refresh<A: RemoteApi>(&mut self, api: &A) -> Result<usize, ApiError> {
        let mut records = api.fetch_notifications().await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.records = records;
        Ok(self.records.len())
    }

    /// Adds a freshly created record to the top of the list.
    ///
    /// Records already present (by id) are ignored.
    pub fn append(&mut self, record: NotificationRecord) {
        if self.records.iter().any(|r| r.id == record.id) {
            return;
        }
        self.records.insert(0, record);
    }

    /// Marks everything read remotely, then locally.
    ///
    /// # Errors
    ///
    /// Returns the API error; local read state is left untouched.
    pub async fn mark_all_read<A: RemoteApi>(&mut self, api: &A) -> Result<(), ApiError> {
        api.mark_all_notifications_read().await?;
        for record in &mut self.records {
            record.is_read = true;
        }
        Ok(())
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_read).count()
    }

    #[must_use]
    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
