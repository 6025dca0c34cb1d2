//! Watch Registry
//!
//! Thread-safe set of addresses under observation using DashMap.
//! Entries are only ever added; there is no unwatch.

use crate::types::Address;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Thread-safe watch list
///
/// Each address maps to the sequence number it was first added with, so
/// enumeration order is stable (first watched, first polled).
#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    entries: Arc<DashMap<Address, u64>>,
    next_seq: Arc<AtomicU64>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching an address. Idempotent; returns true if newly added.
    pub fn add(&self, address: impl Into<Address>) -> bool {
        let address = address.into();
        let mut inserted = false;
        self.entries.entry(address.clone()).or_insert_with(|| {
            inserted = true;
            self.next_seq.fetch_add(1, Ordering::Relaxed)
        });
        if inserted {
            debug!("Registry: added {}", address);
        }
        inserted
    }

    /// Point-in-time copy of the membership, in insertion order.
    /// Concurrent `add` calls are neither blocked nor reflected.
    pub fn snapshot_keys(&self) -> Vec<Address> {
        let mut keyed: Vec<(u64, Address)> = self
            .entries
            .iter()
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        keyed.sort_unstable_by_key(|(seq, _)| *seq);
        keyed.into_iter().map(|(_, address)| address).collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
