//! Remote store API client.
//!
//! The monitor only talks to the store backend through the [`RemoteApi`]
//! trait. [`HttpApi`] is the production implementation built on reqwest:
//!
//! - Connection pooling via a shared [`Client`]
//! - Bearer token authentication
//! - 401/403 responses surfaced as [`ApiError::AuthFailed`], the only error
//!   class the polling pipeline lets escape
//!
//! # Example
//!
//! ```no_run
//! use shopwatch_monitor::api::{HttpApi, RemoteApi};
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = HttpApi::new("https://shop.example.com/api", "secret-token").unwrap();
//!     let orders = api.fetch_orders().await.unwrap();
//!     println!("{} orders", orders.len());
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::types::{NewNotification, NotificationRecord, Order, StockItem};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors returned by remote API calls.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials were rejected (401 or 403).
    #[error("authentication failed: credentials rejected by server")]
    AuthFailed,

    /// Server answered with a non-success status.
    #[error("server error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Token contains characters that cannot go in a header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl ApiError {
    /// Whether this error must end the session rather than be swallowed.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailed)
    }
}

/// Operations the monitor consumes from the store backend.
///
/// Implementations must be shareable across tasks: the poller and the
/// notification persist tasks hold the same instance behind an `Arc`.
pub trait RemoteApi: Send + Sync + 'static {
    /// Fetches the full orders collection.
    fn fetch_orders(&self) -> impl Future<Output = Result<Vec<Order>, ApiError>> + Send;

    /// Fetches the full stock-bearing items collection.
    fn fetch_stock_items(&self) -> impl Future<Output = Result<Vec<StockItem>, ApiError>> + Send;

    /// Creates a durable notification record.
    fn create_notification(
        &self,
        notification: NewNotification,
    ) -> impl Future<Output = Result<NotificationRecord, ApiError>> + Send;

    /// Fetches the current notification list.
    fn fetch_notifications(
        &self,
    ) -> impl Future<Output = Result<Vec<NotificationRecord>, ApiError>> + Send;

    /// Marks every notification as read.
    fn mark_all_notifications_read(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// reqwest-backed [`RemoteApi`].
#[derive(Debug, Clone)]
pub struct HttpApi {
    base_url: String,
    client: Client,
}

impl HttpApi {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidHeader`] if the token cannot be used as a
    /// header value, or [`ApiError::Http`] if the client cannot be built.
    pub fn new(base_url: impl Into<String>, token: &str) -> Result<Self, ApiError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(4)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(self.client.get(self.url(path)), path).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends a request and maps the status code into the error taxonomy.
    async fn execute(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<reqwest::Response, ApiError> {
        trace!(path = %path, "Sending API request");
        let response = request.send().await?;
        let status = response.status();

        match status {
            _ if status.is_success() => {
                debug!(path = %path, status = status.as_u16(), "API request succeeded");
                Ok(response)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(path = %path, status = status.as_u16(), "API rejected credentials");
                Err(ApiError::AuthFailed)
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

impl RemoteApi for HttpApi {
    async fn fetch_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.get_json("/orders").await
    }

    async fn fetch_stock_items(&self) -> Result<Vec<StockItem>, ApiError> {
        self.get_json("/products").await
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, ApiError> {
        let request = self
            .client
            .post(self.url("/notifications"))
            .json(&notification);
        let response = self.execute(request, "/notifications").await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_notifications(&self) -> Result<Vec<NotificationRecord>, ApiError> {
        self.get_json("/notifications").await
    }

    async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        let request = self.client.put(self.url("/notifications/read-all"));
        self.execute(request, "/notifications/read-all").await?;
        Ok(())
    }
}
