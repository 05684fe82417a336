//! Shopwatch Monitor - order and stock change notifier.
//!
//! This binary signs in to a store backend, polls it for orders and stock
//! items, and prints alerts for new orders, cancellations and items that run
//! out of stock.
//!
//! # Commands
//!
//! - `shopwatch-monitor login --token <TOKEN>`: Store the API token
//! - `shopwatch-monitor logout`: Clear stored credentials
//! - `shopwatch-monitor notifications`: List stored notifications
//! - `shopwatch-monitor run`: Start a monitoring session
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use shopwatch_monitor::api::{ApiError, HttpApi};
use shopwatch_monitor::config::{self, Config};
use shopwatch_monitor::handoff::HandoffStore;
use shopwatch_monitor::notifier::{NotificationFeed, NotifierOutput};
use shopwatch_monitor::session::{
    self, CredentialStore, Session, SessionSettings, TerminationHook, TerminationReason,
};
use shopwatch_monitor::types::{EphemeralAlert, Severity};
use shopwatch_monitor::watchdog::ActivityKind;

/// Shopwatch Monitor - order and stock change notifier.
///
/// Polls the store API and raises alerts for new orders, customer
/// cancellations and items that run out of stock.
#[derive(Parser, Debug)]
#[command(name = "shopwatch-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    SHOPWATCH_API_URL                Store API base URL (required for 'run' and 'notifications')
    SHOPWATCH_STATE_DIR              State directory (default: ~/.shopwatch)
    SHOPWATCH_POLL_INTERVAL_SECS     Seconds between polls (default: 20)
    SHOPWATCH_IDLE_TIMEOUT_SECS      Inactivity before logout (default: 3600)
    SHOPWATCH_FRESHNESS_WINDOW_SECS  Max age of a new order (default: 300)
    SHOPWATCH_NOTIFY_NEW_ORDERS      Notify on new orders (default: true)
    SHOPWATCH_NOTIFY_CANCELLATIONS   Notify on cancellations (default: true)
    SHOPWATCH_NOTIFY_OUT_OF_STOCK    Notify on out-of-stock items (default: true)

SESSION COMMANDS (typed on stdin during 'run'):
    list           Show the notification list
    read           Mark all notifications as read
    page <name>    Record the page you are on
    logout         Sign out and stop

EXAMPLES:
    shopwatch-monitor login --token \"$SHOP_TOKEN\"

    export SHOPWATCH_API_URL=https://shop.example.com/api
    shopwatch-monitor run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Store an API token for later sessions.
    Login {
        /// Bearer token issued by the store backend.
        #[arg(short, long)]
        token: String,
    },

    /// Clear stored credentials.
    Logout,

    /// List stored notifications, newest first.
    Notifications {
        /// Mark all notifications as read after listing.
        #[arg(long)]
        mark_read: bool,
    },

    /// Start a monitoring session.
    ///
    /// Requires SHOPWATCH_API_URL and stored credentials.
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Login { token } => run_login(&token),
        Command::Logout => run_logout(),
        Command::Notifications { mark_read } => {
            block_on(run_notifications(mark_read))
        }
        Command::Run => block_on(run_monitor()),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(future)
}

fn local_state_dir() -> Result<PathBuf> {
    config::state_dir_from_env().context("Failed to determine state directory")
}

fn local_credentials() -> Result<CredentialStore> {
    Ok(CredentialStore::new(config::credentials_path_in(
        &local_state_dir()?,
    )))
}

/// Runs the login command.
fn run_login(token: &str) -> Result<()> {
    let state_dir = local_state_dir()?;
    let credentials = CredentialStore::new(config::credentials_path_in(&state_dir));
    let handoff = HandoffStore::open(config::handoff_path_in(&state_dir))
        .context("Failed to open hand-off store")?;

    session::sign_in(&credentials, &handoff, token).context("Failed to sign in")?;

    println!("Credentials saved to: {}", credentials.path().display());
    Ok(())
}

/// Runs the logout command.
fn run_logout() -> Result<()> {
    let credentials = local_credentials()?;
    credentials
        .clear()
        .context("Failed to clear credentials")?;

    println!("Signed out.");
    Ok(())
}

/// Loads the stored token and builds an API client for it.
fn connect(config: &Config, credentials: &CredentialStore) -> Result<HttpApi> {
    let Some(token) = credentials
        .load()
        .context("Failed to read stored credentials")?
    else {
        bail!("Not signed in. Run 'shopwatch-monitor login --token <TOKEN>' first.");
    };

    HttpApi::new(config.api_url.as_str(), &token).context("Failed to create API client")
}

/// Runs the notifications command.
async fn run_notifications(mark_read: bool) -> Result<()> {
    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;
    let credentials = CredentialStore::new(config.credentials_path());
    let api = connect(&config, &credentials)?;

    let mut feed = NotificationFeed::new();
    if let Err(e) = feed.refresh(&api).await {
        if e.is_auth() {
            credentials.on_terminate(TerminationReason::AuthFailed);
        }
        return Err(e).context("Failed to fetch notifications");
    }

    print_feed(&feed);

    if mark_read && !feed.is_empty() {
        feed.mark_all_read(&api)
            .await
            .context("Failed to mark notifications as read")?;
        println!("Marked {} notification(s) as read.", feed.len());
    }

    Ok(())
}

/// Runs a monitoring session until logout, expiry or a shutdown signal.
async fn run_monitor() -> Result<()> {
    init_logging();

    info!("Starting Shopwatch Monitor");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        api_url = %config.api_url,
        state_dir = %config.state_dir.display(),
        poll_interval_secs = config.poll_interval.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Configuration loaded"
    );

    let handoff = Arc::new(
        HandoffStore::open(config.handoff_path()).context("Failed to open hand-off store")?,
    );

    // Whatever the previous session left behind is shown before anything else
    show_pending_toast(&handoff);

    let credentials = Arc::new(CredentialStore::new(config.credentials_path()));
    let api = Arc::new(connect(&config, &credentials)?);

    if let Some(page) = handoff.last_page() {
        println!("Last page: {page}");
    }

    let mut feed = NotificationFeed::new();
    if let Err(e) = feed.refresh(api.as_ref()).await {
        if e.is_auth() {
            credentials.on_terminate(TerminationReason::AuthFailed);
            return Err(e).context("Stored credentials were rejected");
        }
        warn!(error = %e, "Failed to load notifications");
    }
    // The initial fetch already reflects anything flagged before start-up
    handoff.take_notification_refresh();
    println!("{} unread notification(s).", feed.unread_count());

    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let hook: Arc<dyn TerminationHook> = credentials.clone();
    let session = Session::start(
        Arc::clone(&api),
        Arc::clone(&handoff),
        hook,
        SessionSettings::from(&config),
        output_tx,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            reason = session.ended() => {
                debug!(?reason, "Session ended");
                break;
            }
            Some(output) = output_rx.recv() => {
                match output {
                    NotifierOutput::Alert(alert) => print_alert(&alert),
                    NotifierOutput::Persisted(record) => feed.append(record),
                }
                if let Err(e) = refresh_if_flagged(&handoff, api.as_ref(), &mut feed).await {
                    if e.is_auth() {
                        session.guard().terminate(TerminationReason::AuthFailed);
                    }
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    session.watchdog().record_activity(ActivityKind::KeyDown);
                    handle_input(line.trim(), &session, api.as_ref(), &mut feed).await;
                }
                Ok(None) => {
                    debug!("stdin closed, continuing without session commands");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
        }
    }

    let reason = session.teardown().await;

    match reason {
        Some(TerminationReason::Logout) => println!("Signed out."),
        Some(TerminationReason::AuthFailed) => {
            println!("Your credentials were rejected. Please sign in again.");
        }
        Some(TerminationReason::IdleTimeout) => show_pending_toast(&handoff),
        None => info!("Monitor stopped"),
    }

    Ok(())
}

/// Handles one line typed during a session.
async fn handle_input(input: &str, session: &Session, api: &HttpApi, feed: &mut NotificationFeed) {
    let (command, argument) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };

    match command {
        "" => {}
        "list" => print_feed(feed),
        "read" => match feed.mark_all_read(api).await {
            Ok(()) => println!("All notifications marked as read."),
            Err(e) if e.is_auth() => {
                session.guard().terminate(TerminationReason::AuthFailed);
            }
            Err(e) => eprintln!("Failed to mark notifications as read: {e}"),
        },
        "page" if !argument.is_empty() => {
            session.watchdog().navigated(argument);
            println!("Now on page: {argument}");
        }
        "logout" => {
            session.logout();
        }
        _ => eprintln!("Unknown command '{input}'. Try: list, read, page <name>, logout"),
    }
}

/// Refetches the feed if a persisted notification asked for it.
async fn refresh_if_flagged(
    handoff: &HandoffStore,
    api: &HttpApi,
    feed: &mut NotificationFeed,
) -> std::result::Result<(), ApiError> {
    if !handoff.take_notification_refresh() {
        return Ok(());
    }

    match feed.refresh(api).await {
        Ok(count) => {
            debug!(count, "Notification list refreshed");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Failed to refresh notifications");
            Err(e)
        }
    }
}

/// Shows and deletes the message left for this screen, if any.
fn show_pending_toast(handoff: &HandoffStore) {
    if let Some(toast) = handoff.take_toast() {
        print_alert(&toast);
    }
}

fn print_alert(alert: &EphemeralAlert) {
    let label = match alert.severity {
        Severity::Info => "INFO",
        Severity::Success => "OK",
        Severity::Warning => "WARN",
        Severity::Error => "ERROR",
    };
    println!("[{label}] {}", alert.message);
}

fn print_feed(feed: &NotificationFeed) {
    if feed.is_empty() {
        println!("No notifications.");
        return;
    }

    for record in feed.records() {
        let marker = if record.is_read { " " } else { "*" };
        println!(
            "{marker} {}  {}: {}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.title,
            record.message
        );
    }
}

/// Initializes the tracing subscriber for logging.
///
/// Uses the `RUST_LOG` environment variable for filtering, defaulting to `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
