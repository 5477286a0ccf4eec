/// Poll fallback
///
/// Polling is best-effort: failures never change the connection state, they
/// only show up as `PollOutcome::Ignored`.
use crate::errors::TransportError;
use async_trait::async_trait;
use serde::Serialize;

/// Result of one poll, kept so callers can assert on "silently ignored"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Refreshed { status: u16, latency_ms: u64 },
    Ignored { reason: String },
}

impl PollOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, PollOutcome::Refreshed { .. })
    }
}

/// Idempotent GET used as keep-alive / refresh trigger
#[async_trait]
pub trait PollSource: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Returns the HTTP status on success (2xx)
    async fn poll(&self) -> Result<u16, TransportError>;
}

pub struct HttpPollSource {
    client: reqwest::Client,
    url: String,
}

impl HttpPollSource {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PollSource for HttpPollSource {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn poll(&self) -> Result<u16, TransportError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(TransportError::HttpStatus {
                endpoint: self.url.clone(),
                status: status.as_u16(),
            })
        }
    }
}
