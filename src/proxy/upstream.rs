/// HTTP client for forwarding requests to the configured backends.
///
/// No retries and no request-level timeout: a failed call fails the client
/// request immediately, and forwarding latency stays equal to upstream
/// latency.
use std::time::Duration;

use crate::errors::AppError;

pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    /// Forward a JSON body. Headers are minimized to Content-Type; the
    /// inbound Authorization header never crosses to the backend.
    pub async fn forward(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, AppError> {
        self.client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("upstream request failed: {}", e);
                AppError::Transport(e.to_string())
            })
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}
