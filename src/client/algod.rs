//! algod REST client
//!
//! Thin reqwest wrapper over the two algod v2 endpoints the watcher uses:
//! `GET /v2/accounts/{address}` and `GET /v2/status`.

use super::{AccountClient, FetchError};
use crate::types::RawAccount;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Header carrying the node API token
pub const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Client for an Algorand node's REST API
#[derive(Debug, Clone)]
pub struct AlgodClient {
    base_url: Url,
    token: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AlgodClient {
    /// Create a client for `base_url`. An empty token sends no auth header
    /// (public endpoints such as algonode need none).
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid algod URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("algod URL cannot be used as a base: {}", base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            token: token.to_string(),
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Node status (`/v2/status`), used as a connectivity check
    pub async fn node_status(&self) -> Result<Value, FetchError> {
        self.get_json(&["v2", "status"]).await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json(&self, segments: &[&str]) -> Result<Value, FetchError> {
        let url = self.endpoint(segments);
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if !self.token.is_empty() {
            request = request.header(TOKEN_HEADER, &self.token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Remote {
                status: status.as_u16(),
                message: remote_message(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))
    }
}

/// algod error bodies look like `{"message": "..."}`; fall back to the raw text
fn remote_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl AccountClient for AlgodClient {
    async fn fetch_account(&self, address: &str) -> Result<RawAccount, FetchError> {
        self.get_json(&["v2", "accounts", address]).await
    }
}
