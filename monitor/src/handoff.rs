//! Cross-reload key/value storage.
//!
//! A tiny persistent store used to hand messages from one session to the
//! next screen. It holds three keys:
//!
//! | Key | Value | Semantics |
//! |-----|-------|-----------|
//! | `pendingToast` | `{message, severity}` | take-once, read implies delete |
//! | `refreshNotifications` | presence flag | take-once, read implies delete |
//! | `lastPage` | screen identifier | overwritten on every navigation |
//!
//! The file-backed store writes a single JSON document and replaces it
//! atomically (write to a temporary file, then rename). A missing or corrupt
//! file opens as an empty store.
//!
//! # Example
//!
//! ```no_run
//! use shopwatch_monitor::handoff::HandoffStore;
//! use shopwatch_monitor::types::{HandoffRecord, Severity};
//!
//! let store = HandoffStore::open("/tmp/shopwatch/handoff.json").unwrap();
//! store.put_toast(HandoffRecord {
//!     message: "See you soon".to_string(),
//!     severity: Severity::Info,
//! }).unwrap();
//!
//! assert!(store.take_toast().is_some());
//! assert!(store.take_toast().is_none());
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::types::HandoffRecord;

/// Errors that can occur while persisting hand-off state.
#[derive(Error, Debug)]
pub enum HandoffError {
    /// Reading or writing the backing file failed.
    #[error("hand-off storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document could not be serialized.
    #[error("hand-off serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk document layout. Field names are the storage keys.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct HandoffDocument {
    #[serde(rename = "pendingToast", default, skip_serializing_if = "Option::is_none")]
    pending_toast: Option<HandoffRecord>,

    #[serde(rename = "refreshNotifications", default, skip_serializing_if = "is_false")]
    refresh_notifications: bool,

    #[serde(rename = "lastPage", default, skip_serializing_if = "Option::is_none")]
    last_page: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Persistent single-slot hand-off storage.
///
/// Shared between the watchdog, the notifier's persist tasks and the render
/// loop, so all access goes through an internal mutex.
#[derive(Debug)]
pub struct HandoffStore {
    path: Option<PathBuf>,
    document: Mutex<HandoffDocument>,
}

impl HandoffStore {
    /// Opens (or lazily creates) a file-backed store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Io`] if the file exists but cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HandoffError> {
        let path = path.as_ref().to_path_buf();

        let document = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(document) => document,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding corrupt hand-off file");
                    HandoffDocument::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HandoffDocument::default(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), "Opened hand-off store");

        Ok(Self {
            path: Some(path),
            document: Mutex::new(document),
        })
    }

    /// Creates a store that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: Mutex::new(HandoffDocument::default()),
        }
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Queues a message for the next render pass, replacing any pending one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn put_toast(&self, record: HandoffRecord) -> Result<(), HandoffError> {
        self.update(|doc| doc.pending_toast = Some(record))
    }

    /// Takes the pending message, deleting it from storage.
    ///
    /// A failed write is logged; the message is still returned so it is shown
    /// at most once in this process.
    pub fn take_toast(&self) -> Option<HandoffRecord> {
        self.take(|doc| doc.pending_toast.take())
    }

    /// Flags the notification list for a refetch on the next render pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn request_notification_refresh(&self) -> Result<(), HandoffError> {
        self.update(|doc| doc.refresh_notifications = true)
    }

    /// Consumes the refresh flag. Returns `true` if it was set.
    pub fn take_notification_refresh(&self) -> bool {
        self.take(|doc| std::mem::take(&mut doc.refresh_notifications).then_some(()))
            .is_some()
    }

    /// Records the last-visited screen identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_last_page(&self, page: &str) -> Result<(), HandoffError> {
        let page = page.to_string();
        self.update(|doc| doc.last_page = Some(page))
    }

    /// Last-visited screen identifier, if one was recorded.
    #[must_use]
    pub fn last_page(&self) -> Option<String> {
        self.lock().last_page.clone()
    }

    /// Drops state tied to the previous sign-in (`lastPage` and the refresh
    /// flag). A pending message is kept for the next screen.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn reset_session_state(&self) -> Result<(), HandoffError> {
        self.update(|doc| {
            doc.last_page = None;
            doc.refresh_notifications = false;
        })
    }

    fn lock(&self) -> MutexGuard<'_, HandoffDocument> {
        // A poisoned guard still holds a consistent document: every mutation
        // is a single field assignment.
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F>(&self, mutate: F) -> Result<(), HandoffError>
    where
        F: FnOnce(&mut HandoffDocument),
    {
        let mut doc = self.lock();
        mutate(&mut doc);
        self.persist(&doc)
    }

    fn take<T, F>(&self, extract: F) -> Option<T>
    where
        F: FnOnce(&mut HandoffDocument) -> Option<T>,
    {
        let mut doc = self.lock();
        let value = extract(&mut doc)?;
        if let Err(e) = self.persist(&doc) {
            warn!(error = %e, "Failed to persist hand-off deletion");
        }
        Some(value)
    }

    fn persist(&self, doc: &HandoffDocument) -> Result<(), HandoffError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, path)?;

        trace!(path = %path.display(), "Persisted hand-off store");
        Ok(())
    }
}
