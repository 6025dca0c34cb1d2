//! Snapshot Store
//!
//! Thread-safe storage for the most recent normalized snapshot per address.
//! Written only by the poll scheduler, read by it and by the HTTP layer.

use crate::types::{AccountSnapshot, Address};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Last-known account state, keyed by address
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshots: Arc<DashMap<Address, AccountSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot for an address, if one has been captured
    pub fn get(&self, address: &str) -> Option<AccountSnapshot> {
        self.snapshots.get(address).map(|entry| entry.clone())
    }

    /// Overwrite the snapshot for an address, returning the one it replaced
    pub fn put(&self, address: impl Into<Address>, snapshot: AccountSnapshot) -> Option<AccountSnapshot> {
        let address = address.into();
        debug!("Storing snapshot for {}: amount={}", address, snapshot.amount);
        self.snapshots.insert(address, snapshot)
    }

    /// All cached snapshots, sorted by address.
    ///
    /// Background cache only; the live per-address fetch listing (with
    /// embedded fetch errors) is `api::live_listing`.
    pub fn list_all(&self) -> Vec<(Address, AccountSnapshot)> {
        let mut all: Vec<_> = self
            .snapshots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn contains(&self, address: &str) -> bool {
        self.snapshots.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
