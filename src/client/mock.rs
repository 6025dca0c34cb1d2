//! In-memory `AccountClient` for tests

use super::{AccountClient, FetchError};
use crate::types::{Address, RawAccount};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Canned responses per address; unknown addresses fail with a transport error
#[derive(Default)]
pub struct MockAccountClient {
    responses: DashMap<Address, Result<RawAccount, FetchError>>,
    delays: DashMap<Address, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAccountClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, address: &str, raw: RawAccount) {
        self.responses.insert(address.to_string(), Ok(raw));
    }

    pub fn set_error(&self, address: &str, error: FetchError) {
        self.responses.insert(address.to_string(), Err(error));
    }

    pub fn set_delay(&self, address: &str, delay: Duration) {
        self.delays.insert(address.to_string(), delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches seen running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountClient for MockAccountClient {
    async fn fetch_account(&self, address: &str) -> Result<RawAccount, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.delays.get(address).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.responses.get(address) {
            Some(response) => response.clone(),
            None => Err(FetchError::Transport(format!(
                "no route to host for {}",
                address
            ))),
        }
    }
}
