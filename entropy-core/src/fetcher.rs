// SPDX-License-Identifier: MIT
//
// QRNG Entropy Engine: Multi-Technique Quantum Randomness Service
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/yourusername/qrng-entropy-engine

//! HTTP client for the external quantum random number service
//!
//! Speaks the ANU-compatible JSON API: `GET <base>?length=N&type=uint8` answered with
//! `{"success": true, "data": [..N bytes..]}`. The service allows one call per window, so
//! only failures to connect (the request never left this host) are retried, according to
//! the configured [`RetryPolicy`]. Timeouts and every failure after the request was sent
//! are final.

use crate::{retry::RetryPolicy, validator::QuantumUpstream, Error, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Configuration for the external service client
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Endpoint of the JSON API
    pub base_url: Url,
    /// Per-attempt request timeout; attempts plus backoff must fit the caller's deadline
    pub timeout: Duration,
    /// Retry policy for transport failures
    pub retry_policy: RetryPolicy,
    /// Refuse plain-HTTP endpoints
    pub https_only: bool,
    pub user_agent: String,
}

impl FetcherConfig {
    pub fn new(base_url: Url) -> Self {
        let https_only = base_url.scheme() == "https";
        Self {
            base_url,
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            https_only,
            user_agent: format!("qrng-entropy-engine/{}", crate::VERSION),
        }
    }
}

/// Response body of the JSON API
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<u8>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the ANU-compatible quantum service
pub struct AnuClient {
    client: Client,
    config: FetcherConfig,
}

impl AnuClient {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(config.user_agent.clone())
            .use_rustls_tls()
            .https_only(config.https_only)
            .build()
            .map_err(Error::Network)?;

        Ok(Self { client, config })
    }

    /// Fetch `n_bytes` quantum bytes, retrying connection failures only
    #[instrument(skip(self), fields(endpoint = %self.config.base_url))]
    pub async fn fetch_bytes(&self, n_bytes: usize) -> Result<Vec<u8>> {
        self.config
            .retry_policy
            .execute_when("anu", is_connect_failure, || self.fetch_once(n_bytes))
            .await
    }

    async fn fetch_once(&self, n_bytes: usize) -> Result<Vec<u8>> {
        let url = self.build_request_url(n_bytes);

        debug!("Requesting {} bytes from {}", n_bytes, url);

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach {}: {}", url, e);
                transport_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP error {}: {}", status, body);
            return Err(Error::Upstream(format!("HTTP {}: {}", status, body)));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let parsed: ApiResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Upstream(format!("malformed response: {}", e)))?;

        Self::validate_response(parsed, n_bytes)
    }

    fn build_request_url(&self, n_bytes: usize) -> Url {
        let mut url = self.config.base_url.clone();
        url.query_pairs_mut()
            .append_pair("length", &n_bytes.to_string())
            .append_pair("type", "uint8");
        url
    }

    fn validate_response(response: ApiResponse, expected: usize) -> Result<Vec<u8>> {
        if !response.success {
            let reason = response
                .error
                .unwrap_or_else(|| "service reported failure".to_string());
            return Err(Error::Upstream(reason));
        }

        if response.data.is_empty() {
            return Err(Error::Upstream("service returned no data".to_string()));
        }

        if response.data.len() != expected {
            warn!(
                "Received {} bytes, expected {}",
                response.data.len(),
                expected
            );
        }

        if response.data.len() > 1 && response.data.iter().all(|&b| b == response.data[0]) {
            warn!("All bytes have the same value ({})", response.data[0]);
        }

        Ok(response.data)
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Network(e)
    }
}

/// Whether the request failed before reaching the service
fn is_connect_failure(error: &Error) -> bool {
    matches!(error, Error::Network(e) if e.is_connect() && !e.is_timeout())
}

#[async_trait]
impl QuantumUpstream for AnuClient {
    fn endpoint(&self) -> String {
        self.config.base_url.to_string()
    }

    async fn fetch(&self, n_bytes: usize) -> Result<Vec<u8>> {
        self.fetch_bytes(n_bytes).await
    }
}
