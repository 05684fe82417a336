//! Authenticated session lifecycle.
//!
//! A [`Session`] is constructed once credentials are available and owns the
//! two background activities of a signed-in user: the snapshot poller (with
//! its change pipeline) and the idle watchdog. Every way of ending a session
//! (manual logout, an authentication failure seen by the poller, idle
//! expiry) goes through [`SessionGuard::terminate`], which:
//!
//! 1. Records the [`TerminationReason`] (first caller wins)
//! 2. Runs the [`TerminationHook`], clearing stored credentials
//! 3. Cancels the session token, stopping the poller and detaching the
//!    watchdog
//!
//! [`Session::teardown`] stops everything without running the hook, for
//! process shutdown where the user did not ask to sign out.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::api::RemoteApi;
use crate::config::{Config, NotificationPreferences};
use crate::diff::DiffEngine;
use crate::handoff::HandoffStore;
use crate::notifier::{Notifier, NotifierOutput};
use crate::pipeline::ChangePipeline;
use crate::poller::{self, PollOutcome};
use crate::watchdog::{IdleWatchdog, WatchdogHandle};

/// Errors from the credential store.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Reading, writing or deleting the credential file failed.
    #[error("credential storage error: {0}")]
    Io(#[from] io::Error),

    /// The stored token is empty.
    #[error("stored credentials are empty")]
    EmptyCredentials,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The user signed out.
    Logout,
    /// The API rejected the session's credentials.
    AuthFailed,
    /// The idle watchdog expired.
    IdleTimeout,
}

/// Side effects run exactly once when a session terminates.
pub trait TerminationHook: Send + Sync {
    fn on_terminate(&self, reason: TerminationReason);
}

/// File-backed API token storage.
///
/// The token is cached in memory after the first load and zeroized when
/// cleared.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    cached: Mutex<Option<Zeroizing<String>>>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the token, from cache or disk. `Ok(None)` when signed out.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, or is empty.
    pub fn load(&self) -> Result<Option<Zeroizing<String>>, SessionError> {
        let mut cached = self.lock();
        if let Some(token) = cached.as_ref() {
            return Ok(Some(token.clone()));
        }

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => Zeroizing::new(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token = Zeroizing::new(contents.trim().to_string());
        if token.is_empty() {
            return Err(SessionError::EmptyCredentials);
        }

        *cached = Some(token.clone());
        Ok(Some(token))
    }

    /// Stores a new token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is blank or the file cannot be written.
    pub fn save(&self, token: &str) -> Result<(), SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::EmptyCredentials);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)?;
        restrict_permissions(&self.path)?;

        *self.lock() = Some(Zeroizing::new(token.to_string()));
        debug!(path = %self.path.display(), "Credentials saved");
        Ok(())
    }

    /// Deletes stored credentials and wipes the cached token.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), SessionError> {
        // Dropping the Zeroizing wrapper wipes the buffer.
        self.lock().take();

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Zeroizing<String>>> {
        self.cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TerminationHook for CredentialStore {
    fn on_terminate(&self, reason: TerminationReason) {
        match self.clear() {
            Ok(()) => info!(?reason, "Credentials cleared"),
            Err(e) => warn!(?reason, error = %e, "Failed to clear credentials"),
        }
    }
}

/// Stores a new token and starts from a clean hand-off state.
///
/// The previous sign-in's `lastPage` and refresh flag are dropped; a pending
/// message survives so the next screen can still show it.
///
/// # Errors
///
/// Returns [`MonitorError::Session`] if the token cannot be stored, or
/// [`MonitorError::Handoff`] if the hand-off store cannot be written.
///
/// [`MonitorError::Session`]: crate::error::MonitorError::Session
/// [`MonitorError::Handoff`]: crate::error::MonitorError::Handoff
pub fn sign_in(
    credentials: &CredentialStore,
    handoff: &HandoffStore,
    token: &str,
) -> crate::error::Result<()> {
    credentials.save(token)?;
    handoff.reset_session_state()?;
    info!(path = %credentials.path().display(), "Signed in");
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// The single termination path of a session.
pub struct SessionGuard {
    id: Uuid,
    token: CancellationToken,
    hook: Arc<dyn TerminationHook>,
    reason: OnceLock<TerminationReason>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("id", &self.id)
            .field("reason", &self.reason.get())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SessionGuard {
    #[must_use]
    pub fn new(hook: Arc<dyn TerminationHook>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            hook,
            reason: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token cancelled when the session ends for any reason.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Ends the session. Returns `false` if it had already been terminated.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        if self.reason.set(reason).is_err() {
            debug!(session_id = %self.id, ?reason, "Session already terminated");
            return false;
        }

        info!(session_id = %self.id, ?reason, "Terminating session");
        self.hook.on_terminate(reason);
        self.token.cancel();
        true
    }

    /// Stops the session's activities without running the hook.
    pub fn teardown(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn reason(&self) -> Option<TerminationReason> {
        self.reason.get().copied()
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session has ended. `None` after a plain teardown.
    pub async fn ended(&self) -> Option<TerminationReason> {
        self.token.cancelled().await;
        self.reason()
    }
}

/// Timing and preference knobs for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
    pub freshness_window: Duration,
    pub preferences: NotificationPreferences,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            idle_timeout: config.idle_timeout,
            freshness_window: config.freshness_window,
            preferences: config.preferences,
        }
    }
}

/// A running authenticated session.
#[derive(Debug)]
pub struct Session {
    guard: Arc<SessionGuard>,
    watchdog: WatchdogHandle,
    poll_supervisor: JoinHandle<PollOutcome>,
}

impl Session {
    /// Starts the poller, the change pipeline and the idle watchdog.
    ///
    /// Alerts and persisted notifications are delivered on `output`.
    pub fn start<A: RemoteApi>(
        api: Arc<A>,
        handoff: Arc<HandoffStore>,
        hook: Arc<dyn TerminationHook>,
        settings: SessionSettings,
        output: mpsc::UnboundedSender<NotifierOutput>,
    ) -> Self {
        let guard = Arc::new(SessionGuard::new(hook));

        info!(
            session_id = %guard.id(),
            poll_interval_secs = settings.poll_interval.as_secs(),
            idle_timeout_secs = settings.idle_timeout.as_secs(),
            "Starting session"
        );

        let notifier = Notifier::new(Arc::clone(&api), Arc::clone(&handoff), output);
        let pipeline = ChangePipeline::new(
            DiffEngine::new(settings.preferences, settings.freshness_window),
            notifier,
        );

        let poller = poller::start(settings.poll_interval, api, pipeline, guard.child_token());

        let supervisor_guard = Arc::clone(&guard);
        let poll_supervisor = tokio::spawn(async move {
            let outcome = poller.join().await;
            if outcome == PollOutcome::AuthFailed {
                supervisor_guard.terminate(TerminationReason::AuthFailed);
            }
            outcome
        });

        let watchdog = IdleWatchdog::spawn(settings.idle_timeout, handoff, Arc::clone(&guard));

        Self {
            guard,
            watchdog,
            poll_supervisor,
        }
    }

    #[must_use]
    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    #[must_use]
    pub fn watchdog(&self) -> &WatchdogHandle {
        &self.watchdog
    }

    /// Signs the user out.
    pub fn logout(&self) -> bool {
        self.guard.terminate(TerminationReason::Logout)
    }

    /// Resolves once the session has ended.
    pub async fn ended(&self) -> Option<TerminationReason> {
        self.guard.ended().await
    }

    /// Stops all activities and waits for them to finish.
    ///
    /// Returns the termination reason if the session was terminated rather
    /// than just torn down.
    pub async fn teardown(self) -> Option<TerminationReason> {
        self.guard.teardown();

        if let Err(e) = self.poll_supervisor.await {
            warn!(error = %e, "Poll supervisor ended abnormally");
        }
        self.watchdog.join().await;

        debug!(session_id = %self.guard.id(), "Session torn down");
        self.guard.reason()
    }
}
