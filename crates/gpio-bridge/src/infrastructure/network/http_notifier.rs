//! One-shot HTTP notifications.
//!
//! Each submitted envelope is POSTed as `application/json` on its own
//! detached task.  Nothing waits for the response; the outcome is only
//! logged.  A slow or unreachable server therefore never holds up input
//! processing or the session.
//!
//! Two clients are kept: one that verifies server certificates against the
//! system roots (`secure = true`) and one that accepts self-signed
//! certificates (`secure = false`).

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::dispatch::NotificationTransport;

/// Per-request timeout.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("POST to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("POST to {url} answered {status}")]
    Status { url: String, status: StatusCode },
}

/// Fire-and-forget HTTP POST transport.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    verified: Client,
    lenient: Client,
}

impl HttpNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError::Client`] if the TLS backend cannot be set up.
    pub fn new() -> Result<Self, NotifyError> {
        Self::with_timeout(HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            verified: build_client(timeout, true)?,
            lenient: build_client(timeout, false)?,
        })
    }

    fn client(&self, secure: bool) -> &Client {
        if secure {
            &self.verified
        } else {
            &self.lenient
        }
    }

    /// POSTs `payload` and waits for the status.  [`NotificationTransport::submit`]
    /// runs this on a detached task.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::Request`] on connect, TLS, or timeout failure.
    /// - [`NotifyError::Status`] on a non-2xx answer.
    pub async fn post(&self, url: &str, secure: bool, payload: Vec<u8>) -> Result<StatusCode, NotifyError> {
        post(self.client(secure), url, payload).await
    }
}

fn build_client(timeout: Duration, verify: bool) -> Result<Client, NotifyError> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("gpio-bridge/", env!("CARGO_PKG_VERSION")));
    if !verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build().map_err(NotifyError::Client)
}

async fn post(client: &Client, url: &str, payload: Vec<u8>) -> Result<StatusCode, NotifyError> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(payload)
        .send()
        .await
        .map_err(|source| NotifyError::Request {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if status.is_success() {
        Ok(status)
    } else {
        Err(NotifyError::Status {
            url: url.to_string(),
            status,
        })
    }
}

impl NotificationTransport for HttpNotifier {
    fn submit(&self, url: &str, secure: bool, payload: Vec<u8>) {
        let client = self.client(secure).clone();
        let url = url.to_string();
        tokio::spawn(async move {
            match post(&client, &url, payload).await {
                Ok(status) => debug!("HTTP notification to {url}: {status}"),
                Err(e) => warn!("HTTP notification dropped: {e}"),
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
