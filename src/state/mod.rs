//! Shared watcher state
//!
//! Concurrency-safe registry of watched addresses and the store of their
//! last-known snapshots. Both are cheap `Clone` handles over one shared map,
//! injected into the scheduler and the HTTP handlers.

pub mod registry;
pub mod snapshots;

pub use registry::WatchRegistry;
pub use snapshots::SnapshotStore;
