//! Poll Scheduler
//!
//! Drives the collection loop: every cycle takes a stable copy of the watch
//! list, fetches each account, normalizes it, diffs it against the last
//! stored snapshot and overwrites the store.
//!
//! State machine:
//! - Idle → CycleRunning on start
//! - CycleRunning → Sleeping for max(0, interval - cycle time)
//! - Sleeping → CycleRunning
//! - → Stopped after `run_once`, or when the cancellation token fires
//!
//! Fetch failures are per address: logged, skipped, never fatal. There is no
//! retry inside a cycle; the next cycle is the retry.
//!
//! Created: 2026-10-19

use crate::client::{fetch_with_timeout, AccountClient, FetchError};
use crate::diff::diff;
use crate::state::{SnapshotStore, WatchRegistry};
use crate::types::{AccountSnapshot, Address, ChangeSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Capacity of the change-event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    CycleRunning,
    Sleeping,
    Stopped,
}

/// Change notification emitted when a watched account's state differs from
/// its previous snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub address: Address,
    pub changes: ChangeSet,
    pub observed_at: DateTime<Utc>,
}

/// Running counters, shared with the HTTP layer
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorStats {
    pub total_cycles: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub changes_detected: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

pub type StatsHandle = Arc<RwLock<CollectorStats>>;

/// Outcome of one pass over the watch list
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Addresses in the membership copy taken at cycle start
    pub polled: usize,
    /// Snapshots written (first observations included)
    pub stored: usize,
    /// First observations: stored, nothing to diff against
    pub baselines: usize,
    pub failures: Vec<(Address, FetchError)>,
    pub changes: Vec<ChangeEvent>,
    pub elapsed: Duration,
}

/// Background collector over the watch registry
pub struct PollScheduler {
    client: Arc<dyn AccountClient>,
    registry: WatchRegistry,
    store: SnapshotStore,
    poll_interval: Duration,
    fetch_timeout: Duration,
    stats_log_every: u64,
    stats: StatsHandle,
    state_tx: watch::Sender<SchedulerState>,
    events: broadcast::Sender<ChangeEvent>,
}

impl PollScheduler {
    pub fn new(
        client: Arc<dyn AccountClient>,
        registry: WatchRegistry,
        store: SnapshotStore,
        poll_interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            client,
            registry,
            store,
            poll_interval,
            fetch_timeout,
            stats_log_every: 0,
            stats: Arc::new(RwLock::new(CollectorStats {
                start_time: Some(Utc::now()),
                ..Default::default()
            })),
            state_tx,
            events,
        }
    }

    /// Log collector stats every `every` cycles (0 disables)
    pub fn with_stats_log_every(mut self, every: u64) -> Self {
        self.stats_log_every = every;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Receive every change event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    pub fn stats_handle(&self) -> StatsHandle {
        Arc::clone(&self.stats)
    }

    /// Run exactly one cycle, then stop
    pub async fn run_once(&self) -> CycleReport {
        let report = self.run_cycle(&CancellationToken::new()).await;
        self.set_state(SchedulerState::Stopped);
        report
    }

    /// Run cycles until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting poll scheduler (interval: {:?}, fetch timeout: {:?})",
            self.poll_interval, self.fetch_timeout
        );

        while !cancel.is_cancelled() {
            let report = self.run_cycle(&cancel).await;

            let sleep_for = sleep_duration(self.poll_interval, report.elapsed);
            self.set_state(SchedulerState::Sleeping);
            debug!("Cycle done in {:?}, sleeping {:?}", report.elapsed, sleep_for);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!("Poll scheduler stopped");
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        self.set_state(SchedulerState::CycleRunning);
        let started = Instant::now();

        // Stable membership: addresses watched mid-cycle wait for the next one
        let addresses = self.registry.snapshot_keys();
        let mut report = CycleReport {
            polled: addresses.len(),
            ..Default::default()
        };

        for address in addresses {
            if cancel.is_cancelled() {
                info!("Cycle interrupted by shutdown");
                break;
            }
            self.process_address(address, &mut report).await;
        }

        report.elapsed = started.elapsed();
        self.record_cycle(&report).await;
        report
    }

    async fn process_address(&self, address: Address, report: &mut CycleReport) {
        let snapshot = match self.fetch_snapshot(&address).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Error fetching account info for {}: {}", address, e.log_detail());
                report.failures.push((address, e));
                return;
            }
        };
        debug!("Fetched account info for {}", address);

        let previous = self.store.put(address.clone(), snapshot.clone());
        report.stored += 1;

        let Some(previous) = previous else {
            report.baselines += 1;
            return;
        };

        let changes = diff(&previous, &snapshot);
        if changes.is_empty() {
            return;
        }

        info!(
            address = %address,
            fields = ?changes.fields(),
            "State changes detected for {}: {}",
            address,
            changes
        );

        let event = ChangeEvent {
            address,
            changes,
            observed_at: Utc::now(),
        };
        // No subscribers is fine; the log line above is the record
        let _ = self.events.send(event.clone());
        report.changes.push(event);
    }

    async fn fetch_snapshot(&self, address: &str) -> Result<AccountSnapshot, FetchError> {
        let raw = fetch_with_timeout(self.client.as_ref(), address, self.fetch_timeout).await?;
        AccountSnapshot::normalize(&raw).map_err(FetchError::unexpected)
    }

    async fn record_cycle(&self, report: &CycleReport) {
        let mut stats = self.stats.write().await;
        stats.total_cycles += 1;
        stats.successful_fetches += report.stored as u64;
        stats.failed_fetches += report.failures.len() as u64;
        stats.changes_detected += report.changes.len() as u64;
        stats.last_cycle_at = Some(Utc::now());

        debug!(
            "Cycle {}: {} polled, {} stored, {} failed, {} changed",
            stats.total_cycles,
            report.polled,
            report.stored,
            report.failures.len(),
            report.changes.len()
        );

        if self.stats_log_every > 0 && stats.total_cycles % self.stats_log_every == 0 {
            info!(
                "Collector stats: {} cycles, {} fetched, {} failed, {} changes, {} snapshots",
                stats.total_cycles,
                stats.successful_fetches,
                stats.failed_fetches,
                stats.changes_detected,
                self.store.len()
            );
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state_tx.send_replace(state);
    }
}

/// Time left in the interval after a cycle; zero when the cycle overran it
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockAccountClient;
    use crate::types::{FieldChange, FieldValue};
    use serde_json::{json, Value};

    fn account_json(amount: u64) -> Value {
        json!({
            "amount": amount,
            "pending-rewards": 10,
            "status": "Online",
            "total-apps-opted-in": 2,
            "total-assets-opted-in": 3,
            "min-balance": 100,
            "rewards": 5
        })
    }

    fn create_test_scheduler(
        client: Arc<MockAccountClient>,
    ) -> (PollScheduler, WatchRegistry, SnapshotStore) {
        let registry = WatchRegistry::new();
        let store = SnapshotStore::new();
        let scheduler = PollScheduler::new(
            client,
            registry.clone(),
            store.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        (scheduler, registry, store)
    }

    #[tokio::test]
    async fn test_first_cycle_stores_baseline_without_changes() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1000));
        let (scheduler, registry, store) = create_test_scheduler(client);
        let mut events = scheduler.subscribe();

        registry.add("ADDR1");
        let report = scheduler.run_once().await;

        assert_eq!(report.stored, 1);
        assert_eq!(report.baselines, 1);
        assert!(report.changes.is_empty());
        assert!(events.try_recv().is_err());

        let stored = store.get("ADDR1").unwrap();
        assert_eq!(
            stored,
            AccountSnapshot {
                amount: 1000,
                pending_rewards: 10,
                status: "Online".to_string(),
                total_apps_opted_in: 2,
                total_assets_opted_in: 3,
                min_balance: 100,
                rewards: 5,
            }
        );
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_second_cycle_reports_amount_change() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1000));
        let (scheduler, registry, store) = create_test_scheduler(Arc::clone(&client));
        let mut events = scheduler.subscribe();

        registry.add("ADDR1");
        scheduler.run_once().await;

        client.set_account("ADDR1", account_json(1500));
        let report = scheduler.run_once().await;

        assert_eq!(report.changes.len(), 1);
        let event = &report.changes[0];
        assert_eq!(event.address, "ADDR1");
        assert_eq!(event.changes.len(), 1);
        assert_eq!(
            event.changes.get("amount"),
            Some(&FieldChange {
                previous: FieldValue::Int(1000),
                current: FieldValue::Int(1500),
            })
        );

        let received = events.try_recv().unwrap();
        assert_eq!(received.changes, event.changes);
        assert_eq!(store.get("ADDR1").unwrap().amount, 1500);
    }

    #[tokio::test]
    async fn test_unchanged_account_emits_nothing() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1000));
        let (scheduler, registry, _store) = create_test_scheduler(client);

        registry.add("ADDR1");
        scheduler.run_once().await;
        let report = scheduler.run_once().await;

        assert_eq!(report.stored, 1);
        assert_eq!(report.baselines, 0);
        assert!(report.changes.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_snapshot_and_continues() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1000));
        client.set_account("ADDR2", account_json(2000));
        let (scheduler, registry, store) = create_test_scheduler(Arc::clone(&client));

        registry.add("ADDR1");
        registry.add("ADDR2");
        scheduler.run_once().await;

        client.set_error("ADDR1", FetchError::Transport("connection reset".to_string()));
        client.set_account("ADDR2", account_json(2500));
        let report = scheduler.run_once().await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "ADDR1");
        assert_eq!(store.get("ADDR1").unwrap().amount, 1000);

        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].address, "ADDR2");
        assert_eq!(store.get("ADDR2").unwrap().amount, 2500);

        // Baseline after a failed cycle is still the last successful snapshot
        client.set_account("ADDR1", account_json(1200));
        let report = scheduler.run_once().await;
        let change = &report.changes[0];
        assert_eq!(change.address, "ADDR1");
        assert_eq!(
            change.changes.get("amount").map(|c| c.previous.clone()),
            Some(FieldValue::Int(1000))
        );
    }

    #[tokio::test]
    async fn test_unnormalizable_payload_is_skipped() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", json!({ "status": "Online" }));
        let (scheduler, registry, store) = create_test_scheduler(client);

        registry.add("ADDR1");
        let report = scheduler.run_once().await;

        assert!(matches!(
            report.failures[0].1,
            FetchError::Unexpected { .. }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("SLOW", account_json(1));
        client.set_delay("SLOW", Duration::from_secs(30));
        client.set_account("FAST", account_json(2));

        let registry = WatchRegistry::new();
        let store = SnapshotStore::new();
        let scheduler = PollScheduler::new(
            client,
            registry.clone(),
            store.clone(),
            Duration::from_secs(60),
            Duration::from_millis(50),
        );

        registry.add("SLOW");
        registry.add("FAST");
        let report = scheduler.run_once().await;

        assert_eq!(
            report.failures,
            vec![("SLOW".to_string(), FetchError::Timeout(Duration::from_millis(50)))]
        );
        assert!(store.contains("FAST"));
        assert!(!store.contains("SLOW"));
    }

    #[tokio::test]
    async fn test_only_watched_addresses_are_polled() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1));
        client.set_account("OTHER", account_json(2));
        let (scheduler, registry, store) = create_test_scheduler(Arc::clone(&client));

        let report = scheduler.run_once().await;
        assert_eq!(report.polled, 0);
        assert_eq!(client.calls(), 0);

        registry.add("ADDR1");
        scheduler.run_once().await;
        assert!(store.contains("ADDR1"));
        assert!(!store.contains("OTHER"));
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1000));
        let (scheduler, registry, _store) = create_test_scheduler(Arc::clone(&client));
        registry.add("ADDR1");
        registry.add("MISSING");

        scheduler.run_once().await;
        client.set_account("ADDR1", account_json(900));
        scheduler.run_once().await;

        let stats = scheduler.stats_handle().read().await.clone();
        assert_eq!(stats.total_cycles, 2);
        assert_eq!(stats.successful_fetches, 2);
        assert_eq!(stats.failed_fetches, 2);
        assert_eq!(stats.changes_detected, 1);
        assert!(stats.last_cycle_at.is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1000));
        let (scheduler, registry, store) = create_test_scheduler(client);
        registry.add("ADDR1");

        let scheduler = Arc::new(scheduler);
        let mut state = scheduler.watch_state();
        let cancel = CancellationToken::new();

        let task = {
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        // First cycle completes, then the loop sleeps for the 60s interval
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == SchedulerState::Sleeping),
        )
        .await
        .expect("scheduler never reached Sleeping")
        .unwrap();
        assert!(store.contains("ADDR1"));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }
    #[test]
    fn test_sleep_duration() {
        let interval = Duration::from_secs(60);
        assert_eq!(sleep_duration(interval, Duration::from_secs(15)), Duration::from_secs(45));
        assert_eq!(sleep_duration(interval, interval), Duration::ZERO);
        assert_eq!(sleep_duration(interval, Duration::from_secs(90)), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_address_added_mid_cycle_waits_for_next_cycle() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("A", account_json(1));
        client.set_delay("A", Duration::from_millis(200));
        client.set_account("B", account_json(2));
        let (scheduler, registry, store) = create_test_scheduler(client);
        registry.add("A");

        let adder = {
            let registry = registry.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                registry.add("B");
            }
        };
        let (report, _) = tokio::join!(scheduler.run_once(), adder);

        assert_eq!(report.polled, 1);
        assert!(store.contains("A"));
        assert!(!store.contains("B"));

        let report = scheduler.run_once().await;
        assert_eq!(report.polled, 2);
        assert!(store.contains("B"));
    }

    #[tokio::test]
    async fn test_cycles_start_at_interval_cadence() {
        let client = Arc::new(MockAccountClient::new());
        client.set_account("ADDR1", account_json(1000));
        client.set_delay("ADDR1", Duration::from_millis(300));

        let registry = WatchRegistry::new();
        let scheduler = Arc::new(PollScheduler::new(
            client,
            registry.clone(),
            SnapshotStore::new(),
            Duration::from_millis(600),
            Duration::from_secs(5),
        ));
        registry.add("ADDR1");

        let cancel = CancellationToken::new();
        let started = Instant::now();
        let task = {
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        // Cycles begin at 0, 600 and 1200 ms so the third ends near 1.5 s;
        // sleeping the full interval after each fetch would push it to 2.1 s
        let stats = scheduler.stats_handle();
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.read().await.total_cycles < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("three cycles never completed");
        let elapsed = started.elapsed();

        cancel.cancel();
        task.await.unwrap();

        assert!(elapsed >= Duration::from_millis(1400), "too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1950), "sleep ignored cycle time: {:?}", elapsed);
    }
}
