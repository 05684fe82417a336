//! Fixed-interval snapshot poller.
//!
//! The poller runs a single tokio task that, on every tick, fetches the
//! orders and stock-item collections concurrently and hands the results to a
//! [`SnapshotSink`]. It never stops because of a transient failure; the only
//! error that ends the loop is [`ApiError::AuthFailed`], reported back as
//! [`PollOutcome::AuthFailed`] so the session layer can terminate.
//!
//! # Cancellation
//!
//! Cancelling the token stops future ticks right away. A fetch already in
//! flight is allowed to finish, but its results are discarded: the token is
//! checked again before anything reaches the sink.
//!
//! # Overlap
//!
//! Ticks are serialised. The loop awaits both fetches before waiting for the
//! next tick, and ticks missed while a slow fetch was running are skipped, so
//! two ticks never interleave inside the sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, RemoteApi};
use crate::types::{Order, StockItem};

/// Receiver for freshly fetched collections.
///
/// Orders are always delivered before stock items within one tick. A
/// collection whose fetch failed is simply not delivered for that tick.
pub trait SnapshotSink: Send + 'static {
    fn on_orders(&mut self, orders: Vec<Order>);
    fn on_stock_items(&mut self, items: Vec<StockItem>);
}

/// Why the poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The cancellation token fired.
    Stopped,
    /// A fetch was rejected for authentication reasons.
    AuthFailed,
}

/// Handle to a running poll loop.
#[derive(Debug)]
pub struct PollerHandle {
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollerHandle {
    /// Stops future ticks. In-flight results will be discarded.
    pub fn stop(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }

    /// Waits for the loop to end.
    pub async fn join(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Poller task ended abnormally");
                PollOutcome::Stopped
            }
        }
    }
}

/// Spawns the poll loop.
///
/// The first tick fires immediately; later ticks follow every `interval`.
pub fn start<A, S>(
    interval: Duration,
    api: Arc<A>,
    sink: S,
    token: CancellationToken,
) -> PollerHandle
where
    A: RemoteApi,
    S: SnapshotSink,
{
    let task = tokio::spawn(run_poll_loop(interval, api, sink, token.clone()));
    PollerHandle { token, task }
}

async fn run_poll_loop<A, S>(
    interval: Duration,
    api: Arc<A>,
    mut sink: S,
    token: CancellationToken,
) -> PollOutcome
where
    A: RemoteApi,
    S: SnapshotSink,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_ms = interval.as_millis(), "Starting snapshot poller");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Poller cancelled");
                return PollOutcome::Stopped;
            }
            _ = ticker.tick() => {}
        }

        let (orders, stock) = tokio::join!(api.fetch_orders(), api.fetch_stock_items());

        if token.is_cancelled() {
            debug!("Discarding poll results that arrived after cancellation");
            return PollOutcome::Stopped;
        }

        if is_auth_failure(&orders) || is_auth_failure(&stock) {
            warn!("Poll rejected for authentication, stopping poller");
            return PollOutcome::AuthFailed;
        }

        match orders {
            Ok(orders) => sink.on_orders(orders),
            Err(e) => debug!(error = %e, "Order fetch failed, skipping this tick"),
        }

        match stock {
            Ok(items) => sink.on_stock_items(items),
            Err(e) => debug!(error = %e, "Stock fetch failed, skipping this tick"),
        }
    }
}

fn is_auth_failure<T>(result: &Result<T, ApiError>) -> bool {
    matches!(result, Err(e) if e.is_auth())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HttpApi;
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Default)]
    struct Recorded {
        orders: Vec<Vec<Order>>,
        stock: Vec<Vec<StockItem>>,
        sequence: Vec<&'static str>,
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Recorded>>);

    impl SnapshotSink for RecordingSink {
        fn on_orders(&mut self, orders: Vec<Order>) {
            let mut rec = self.0.lock().unwrap();
            rec.orders.push(orders);
            rec.sequence.push("orders");
        }

        fn on_stock_items(&mut self, items: Vec<StockItem>) {
            let mut rec = self.0.lock().unwrap();
            rec.stock.push(items);
            rec.sequence.push("stock");
        }
    }

    async fn mount_ok(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "status": "Pending"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 5, "name": "Mug", "stock": 3}
            ])))
            .mount(server)
            .await;
    }

    fn api(server: &MockServer) -> Arc<HttpApi> {
        Arc::new(HttpApi::new(server.uri(), "t").unwrap())
    }

    #[tokio::test]
    async fn first_tick_is_immediate_and_orders_come_first() {
        let server = MockServer::start().await;
        mount_ok(&server).await;

        let sink = RecordingSink::default();
        let handle = start(
            Duration::from_secs(60),
            api(&server),
            sink.clone(),
            CancellationToken::new(),
        );

        sleep(Duration::from_millis(300)).await;
        handle.stop();
        assert_eq!(handle.join().await, PollOutcome::Stopped);

        let rec = sink.0.lock().unwrap();
        assert_eq!(rec.orders.len(), 1);
        assert_eq!(rec.stock.len(), 1);
        assert_eq!(rec.sequence, vec!["orders", "stock"]);
    }

    #[tokio::test]
    async fn keeps_ticking_through_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let sink = RecordingSink::default();
        let handle = start(
            Duration::from_millis(50),
            api(&server),
            sink.clone(),
            CancellationToken::new(),
        );

        sleep(Duration::from_millis(400)).await;
        assert!(!handle.is_stopped());
        handle.stop();
        handle.join().await;

        let rec = sink.0.lock().unwrap();
        assert!(rec.orders.is_empty(), "failed collection is never delivered");
        assert!(rec.stock.len() >= 3, "stock delivered on every tick");
    }

    #[tokio::test]
    async fn auth_failure_ends_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let sink = RecordingSink::default();
        let handle = start(
            Duration::from_millis(50),
            api(&server),
            sink.clone(),
            CancellationToken::new(),
        );

        let outcome = timeout(Duration::from_secs(2), handle.join()).await.unwrap();
        assert_eq!(outcome, PollOutcome::AuthFailed);
        assert!(sink.0.lock().unwrap().sequence.is_empty());
    }

    #[tokio::test]
    async fn results_after_cancellation_are_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"id": 1, "status": "Pending"}]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let sink = RecordingSink::default();
        let handle = start(
            Duration::from_secs(60),
            api(&server),
            sink.clone(),
            CancellationToken::new(),
        );

        sleep(Duration::from_millis(100)).await;
        handle.stop();

        let outcome = timeout(Duration::from_secs(2), handle.join()).await.unwrap();
        assert_eq!(outcome, PollOutcome::Stopped);
        assert!(sink.0.lock().unwrap().sequence.is_empty());
    }

    #[tokio::test]
    async fn cancelled_parent_token_stops_poller() {
        let server = MockServer::start().await;
        mount_ok(&server).await;

        let parent = CancellationToken::new();
        let handle = start(
            Duration::from_millis(50),
            api(&server),
            RecordingSink::default(),
            parent.child_token(),
        );

        parent.cancel();
        let outcome = timeout(Duration::from_secs(2), handle.join()).await.unwrap();
        assert_eq!(outcome, PollOutcome::Stopped);
    }
}
