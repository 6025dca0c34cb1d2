//! Ledger account client
//!
//! `AccountClient` is the seam between the watcher and the remote node:
//! one call, one point-in-time raw account payload or a typed error.
//! No retries happen here; the next poll cycle is the retry.

pub mod algod;
#[cfg(test)]
pub mod mock;

pub use algod::AlgodClient;

use crate::types::RawAccount;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure to obtain an account payload
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, DNS or other transport-level failure
    #[error("{0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Node answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    /// Anything not classified above (bad payload, missing fields, ...).
    /// The detail is logged, never sent to API callers.
    #[error("Unexpected error")]
    Unexpected { detail: String },
}

impl FetchError {
    pub fn unexpected(detail: impl ToString) -> Self {
        FetchError::Unexpected {
            detail: detail.to_string(),
        }
    }

    /// True for network-level failures (including timeouts)
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Timeout(_))
    }

    /// Full description for logs, including unexpected-error detail
    pub fn log_detail(&self) -> String {
        match self {
            FetchError::Unexpected { detail } => format!("Unexpected error: {}", detail),
            other => other.to_string(),
        }
    }
}

impl FetchError {
    /// Classify a reqwest failure. `timeout` is the client's configured
    /// request timeout, reported when reqwest gives up waiting.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(timeout)
        } else if e.is_decode() {
            FetchError::unexpected(e)
        } else if let Some(status) = e.status() {
            FetchError::Remote {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Read-only access to account state on the ledger
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Fetch the raw `account_info` payload for an address
    async fn fetch_account(&self, address: &str) -> Result<RawAccount, FetchError>;
}

/// `fetch_account` bounded by `timeout`, so one slow address cannot stall a caller
pub async fn fetch_with_timeout(
    client: &dyn AccountClient,
    address: &str,
    timeout: Duration,
) -> Result<RawAccount, FetchError> {
    match tokio::time::timeout(timeout, client.fetch_account(address)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}
