//! HTTP beacon transport for the tracking service.
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use funnelstorm_engine::{BeaconOutcome, BeaconSender, EventRecord};

/// Sends event records as `POST {base}/track` with a JSON body, the way the
/// funnel pages' client-side beacons do. Every call carries the configured
/// timeout; a timed-out or refused call becomes a transport-failure outcome,
/// never an error the engine has to handle.
pub struct HttpBeaconSender {
    client: reqwest::Client,
    track_url: String,
    health_url: String,
    origin: Option<String>,
}

impl HttpBeaconSender {
    /// Builds a sender for the given tracking-service base URL.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, origin: Option<String>, timeout: Duration) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            track_url: format!("{base}/track"),
            health_url: format!("{base}/health"),
            origin,
        })
    }

    #[must_use]
    pub fn track_url(&self) -> &str {
        &self.track_url
    }

    /// Quick `/health` probe run before any traffic is generated. If this
    /// fails, don't run the bigger test — something is already broken.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is unreachable or non-2xx.
    pub async fn preflight(&self) -> Result<()> {
        let mut request = self.client.get(&self.health_url);
        if let Some(origin) = &self.origin {
            request = request.header("Origin", origin);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("health check against {} failed", self.health_url))?;
        let status = response.status();
        ensure!(
            status.is_success(),
            "health check against {} returned {status}",
            self.health_url
        );
        log::info!("preflight ok: {} -> {status}", self.health_url);
        Ok(())
    }
}

#[async_trait]
impl BeaconSender for HttpBeaconSender {
    async fn send(&self, event: &EventRecord) -> BeaconOutcome {
        let started = Instant::now();
        let mut request = self
            .client
            .post(&self.track_url)
            .header("Content-Type", "application/json")
            .json(event);
        if let Some(origin) = &self.origin {
            request = request.header("Origin", origin);
        }
        match request.send().await {
            Ok(response) => {
                BeaconOutcome::from_status(response.status().as_u16(), started.elapsed())
            }
            Err(err) => BeaconOutcome::transport_failure(err.to_string(), started.elapsed()),
        }
    }
}
