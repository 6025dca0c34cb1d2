//! Algorand Account Watcher Library
//!
//! Polls a set of watched accounts on an algod node, detects field-level
//! changes between consecutive snapshots and exposes the watch list over a
//! small HTTP control API.
//!
//! Created: 2026-10-19

pub mod api;
pub mod client;
pub mod config;
pub mod diff;
pub mod scheduler;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use client::{AccountClient, AlgodClient, FetchError};
pub use config::{load_config, WatcherConfig};
pub use diff::diff;
pub use scheduler::{ChangeEvent, CollectorStats, CycleReport, PollScheduler, SchedulerState};
pub use state::{SnapshotStore, WatchRegistry};
pub use types::{AccountSnapshot, Address, ChangeSet, FieldChange, FieldValue};
