use super::types::ProbeResult;
use crate::config::HealthConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use std::time::Instant;

/// Liveness check against one backend
///
/// Implementations should not apply their own deadline: the monitor wraps
/// every call in `probe_timeout_ms` and counts an overrun as a failure.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Human-readable target (used in logs)
    fn target(&self) -> &str;

    /// Perform one probe
    async fn probe(&self) -> ProbeResult;
}

/// `GET <base>/health`; any 2xx counts as healthy, the body is ignored
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self, TransportError> {
        Self::new(config.health_url())
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    fn target(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> ProbeResult {
        let start = Instant::now();

        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    ProbeResult::success(latency)
                } else {
                    ProbeResult::failure(
                        TransportError::HttpStatus {
                            endpoint: self.url.clone(),
                            status: response.status().as_u16(),
                        }
                        .to_string(),
                    )
                }
            }
            Err(e) => ProbeResult::failure(format!("Request failed: {}", e)),
        }
    }
}
