//! End-to-end polling scenarios against a mock store API.
//!
//! A full [`Session`] runs against wiremock: the real reqwest client, the
//! poll loop, the change pipeline and the notifier.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use shopwatch_monitor::api::HttpApi;
use shopwatch_monitor::config::NotificationPreferences;
use shopwatch_monitor::handoff::HandoffStore;
use shopwatch_monitor::notifier::NotifierOutput;
use shopwatch_monitor::session::{
    CredentialStore, Session, SessionSettings, TerminationHook, TerminationReason,
};
use shopwatch_monitor::types::{EphemeralAlert, Severity};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

fn settings(poll_interval: Duration) -> SessionSettings {
    SessionSettings {
        poll_interval,
        idle_timeout: Duration::from_secs(3600),
        freshness_window: Duration::from_secs(300),
        preferences: NotificationPreferences::default(),
    }
}

fn order(id: u64, status: &str, customer: &str, date: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "customerName": customer,
        "date": date,
        "amount": 25.0,
        "items": []
    })
}

/// Mounts one orders response that is served for exactly one poll.
async fn mount_orders_once(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

async fn mount_orders(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_products(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_create_notification(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 1,
            "title": "stored",
            "message": "stored",
            "kind": "new_order",
            "createdAt": Utc::now().to_rfc3339(),
            "isRead": false
        })))
        .mount(server)
        .await;
}

/// Collects alerts until `count` have arrived.
async fn collect_alerts(
    rx: &mut mpsc::UnboundedReceiver<NotifierOutput>,
    count: usize,
) -> Vec<EphemeralAlert> {
    let mut alerts = Vec::new();
    while alerts.len() < count {
        match rx.recv().await {
            Some(NotifierOutput::Alert(alert)) => alerts.push(alert),
            Some(NotifierOutput::Persisted(_)) => {}
            None => break,
        }
    }
    alerts
}

struct NoopHook;

impl TerminationHook for NoopHook {
    fn on_terminate(&self, _reason: TerminationReason) {}
}

// =============================================================================
// Scenario Tests
// =============================================================================

/// Seed, new order, then cancellation: exactly two alerts, no duplicates.
#[tokio::test]
async fn three_tick_scenario_emits_new_order_then_cancellation() {
    let server = MockServer::start().await;
    let now = Utc::now().to_rfc3339();

    mount_orders_once(&server, json!([order(1, "Pending", "Ada", &now)])).await;
    mount_orders_once(
        &server,
        json!([
            order(1, "Pending", "Ada", &now),
            order(2, "Pending", "Grace", &now)
        ]),
    )
    .await;
    mount_orders(
        &server,
        json!([
            order(1, "Cancelled", "Ada", &now),
            order(2, "Pending", "Grace", &now)
        ]),
    )
    .await;
    mount_products(&server, json!([])).await;
    mount_create_notification(&server).await;

    let api = Arc::new(HttpApi::new(server.uri(), "token").unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Session::start(
        api,
        Arc::new(HandoffStore::in_memory()),
        Arc::new(NoopHook),
        settings(Duration::from_millis(100)),
        tx,
    );

    let alerts = timeout(Duration::from_secs(5), collect_alerts(&mut rx, 2))
        .await
        .expect("two alerts within the deadline");

    assert_eq!(alerts[0].message, "New Order Received: #2 from Grace");
    assert_eq!(alerts[0].severity, Severity::Info);
    assert_eq!(alerts[1].message, "Order Cancelled: #1 was cancelled by Ada");
    assert_eq!(alerts[1].severity, Severity::Warning);

    // Further identical polls add nothing
    tokio::time::sleep(Duration::from_millis(400)).await;
    let extra = collect_pending_alerts(&mut rx);
    assert_eq!(extra, 0);

    assert_eq!(session.teardown().await, None);
}

/// Out of stock only fires on the crossing into zero.
#[tokio::test]
async fn stock_depletion_is_reported_once() {
    let server = MockServer::start().await;

    mount_orders(&server, json!([])).await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 7, "name": "Blue Mug", "stock": 2},
            {"id": 8, "name": "Lamp", "stock": 0}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_products(
        &server,
        json!([
            {"id": 7, "name": "Blue Mug", "stock": 0},
            {"id": 8, "name": "Lamp", "stock": 0}
        ]),
    )
    .await;
    mount_create_notification(&server).await;

    let api = Arc::new(HttpApi::new(server.uri(), "token").unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Session::start(
        api,
        Arc::new(HandoffStore::in_memory()),
        Arc::new(NoopHook),
        settings(Duration::from_millis(100)),
        tx,
    );

    let alerts = timeout(Duration::from_secs(5), collect_alerts(&mut rx, 1))
        .await
        .unwrap();
    assert_eq!(alerts[0].message, "Out of Stock: Blue Mug is out of stock");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(collect_pending_alerts(&mut rx), 0);

    session.teardown().await;
}

/// A rejected poll ends the session and wipes stored credentials.
#[tokio::test]
async fn auth_failure_terminates_session_and_clears_credentials() {
    let server = MockServer::start().await;
    mount_orders(&server, json!([])).await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let credentials = Arc::new(CredentialStore::new(dir.path().join("credentials")));
    credentials.save("token").unwrap();

    let api = Arc::new(HttpApi::new(server.uri(), "token").unwrap());
    let (tx, _rx) = mpsc::unbounded_channel();
    let session = Session::start(
        api,
        Arc::new(HandoffStore::in_memory()),
        credentials.clone(),
        settings(Duration::from_millis(100)),
        tx,
    );

    let reason = timeout(Duration::from_secs(5), session.ended())
        .await
        .expect("session ends after auth failure");
    assert_eq!(reason, Some(TerminationReason::AuthFailed));
    assert!(credentials.load().unwrap().is_none());
    assert!(!credentials.path().exists());

    assert_eq!(
        session.teardown().await,
        Some(TerminationReason::AuthFailed)
    );
}

/// Transient server errors are invisible to the user.
#[tokio::test]
async fn transient_errors_produce_no_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let api = Arc::new(HttpApi::new(server.uri(), "token").unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Session::start(
        api,
        Arc::new(HandoffStore::in_memory()),
        Arc::new(NoopHook),
        settings(Duration::from_millis(50)),
        tx,
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!session.guard().is_ended());
    assert_eq!(collect_pending_alerts(&mut rx), 0);

    assert_eq!(session.teardown().await, None);
}

fn collect_pending_alerts(rx: &mut mpsc::UnboundedReceiver<NotifierOutput>) -> usize {
    let mut count = 0;
    while let Ok(output) = rx.try_recv() {
        if matches!(output, NotifierOutput::Alert(_)) {
            count += 1;
        }
    }
    count
}
