//! The sync coordinator.
//!
//! A single actor task owns the whole sync state machine: debounce gate,
//! single-flight executor with a coalesced pending slot, and the periodic
//! trigger. Everything that can start or suppress a sync flows through one
//! message channel, so there is exactly one writer of the state.
//!
//! Timing is driven by the tokio clock (`tokio::time::Instant`), which keeps
//! the machine fully deterministic under a paused test clock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::application::backup_service::{
    build_payload, effective_prefix, execute_upload, sync_file_name, BackupTarget,
};
use crate::application::change_detector;
use crate::application::status::StatusSink;
use crate::domain::{
    ChangeEvent, ChangeReason, PendingChange, Result, SyncError, SyncPhase, SyncState, SyncTuning,
};
use crate::infrastructure::memo_store::MemoStore;

/// Ceiling on the periodic check cadence, in milliseconds.
const MAX_CHECK_MS: u64 = 60_000;

/// Messages accepted by the coordinator.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// A watched key changed.
    Change(ChangeEvent),
    /// User-requested sync; bypasses the enabled flag.
    SyncNow,
    /// Turn auto-sync on or off; persisted to the store.
    SetEnabled(bool),
    /// Change the periodic interval; persisted to the store.
    SetIntervalMs(u64),
    /// Stop the coordinator. An in-flight attempt is drained, not cancelled.
    Shutdown,
}

/// Cheap cloneable handle to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
}

impl CoordinatorHandle {
    /// Report a change of the watched data.
    pub fn change(&self, event: ChangeEvent) {
        let _ = self.tx.send(CoordinatorMessage::Change(event));
    }

    /// Request an immediate sync.
    pub fn sync_now(&self) {
        let _ = self.tx.send(CoordinatorMessage::SyncNow);
    }

    /// Toggle auto-sync.
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(CoordinatorMessage::SetEnabled(enabled));
    }

    /// Change the periodic interval.
    pub fn set_interval_ms(&self, interval_ms: u64) {
        let _ = self.tx.send(CoordinatorMessage::SetIntervalMs(interval_ms));
    }

    /// Stop the coordinator after draining any in-flight attempt.
    pub fn shutdown(&self) {
        let _ = self.tx.send(CoordinatorMessage::Shutdown);
    }
}

/// An armed debounce timer.
struct Debounce {
    deadline: Instant,
    reason: ChangeReason,
    key: Option<String>,
}

/// The single in-flight attempt.
struct InFlight {
    fut: Pin<Box<dyn Future<Output = std::result::Result<(), SyncError>> + Send>>,
    content_hash: String,
    file_name: String,
}

/// What the select loop decided to do this iteration.
enum Step {
    Msg(Option<CoordinatorMessage>),
    DebounceFired,
    AttemptDone(std::result::Result<(), SyncError>),
    PeriodicTick,
}

async fn poll_attempt(in_flight: &mut Option<InFlight>) -> std::result::Result<(), SyncError> {
    match in_flight {
        Some(attempt) => attempt.fut.as_mut().await,
        None => std::future::pending().await,
    }
}

/// The sync coordinator actor.
pub struct SyncCoordinator {
    store: Arc<MemoStore>,
    target: Arc<dyn BackupTarget>,
    sink: Arc<dyn StatusSink>,
    tuning: SyncTuning,
    rx: mpsc::UnboundedReceiver<CoordinatorMessage>,

    state: SyncState,
    debounce: Option<Debounce>,
    pending: Option<PendingChange>,
    in_flight: Option<InFlight>,

    /// Monotonic time of the last confirmed sync, for the periodic trigger.
    last_sync_instant: Option<Instant>,
    next_periodic_check: Instant,
}

impl SyncCoordinator {
    /// Create a coordinator, loading persisted sync state from the store.
    ///
    /// # Errors
    /// Returns error if the persisted state cannot be read.
    pub fn new(
        store: Arc<MemoStore>,
        target: Arc<dyn BackupTarget>,
        sink: Arc<dyn StatusSink>,
        tuning: SyncTuning,
    ) -> Result<(Self, CoordinatorHandle)> {
        let state = store.load_sync_state()?;
        let (tx, rx) = mpsc::unbounded_channel();

        // Map the persisted wall-clock timestamp onto the monotonic clock so
        // the periodic trigger honors syncs from previous runs.
        let last_sync_instant = state.last_sync_at.and_then(|at| {
            let elapsed = (Utc::now() - at).to_std().unwrap_or_default();
            Instant::now().checked_sub(elapsed)
        });

        let check = Self::check_period_for(state.interval_ms);
        let coordinator = Self {
            store,
            target,
            sink,
            tuning,
            rx,
            state,
            debounce: None,
            pending: None,
            in_flight: None,
            last_sync_instant,
            next_periodic_check: Instant::now() + check,
        };

        Ok((coordinator, CoordinatorHandle { tx }))
    }

    /// Run the coordinator until shutdown.
    pub async fn run(mut self) {
        info!(
            enabled = self.state.enabled,
            interval_ms = self.state.interval_ms,
            target = %self.target.describe(),
            "sync coordinator started"
        );

        loop {
            let debounce_deadline = self.debounce.as_ref().map(|d| d.deadline);
            let has_in_flight = self.in_flight.is_some();
            let park = Instant::now() + Duration::from_secs(3600);

            let step = tokio::select! {
                msg = self.rx.recv() => Step::Msg(msg),
                () = sleep_until(debounce_deadline.unwrap_or(park)),
                    if debounce_deadline.is_some() => Step::DebounceFired,
                res = poll_attempt(&mut self.in_flight),
                    if has_in_flight => Step::AttemptDone(res),
                () = sleep_until(self.next_periodic_check) => Step::PeriodicTick,
            };

            match step {
                Step::Msg(None | Some(CoordinatorMessage::Shutdown)) => break,
                Step::Msg(Some(CoordinatorMessage::Change(event))) => self.on_change(&event),
                Step::Msg(Some(CoordinatorMessage::SyncNow)) => self.on_manual(),
                Step::Msg(Some(CoordinatorMessage::SetEnabled(enabled))) => {
                    self.on_set_enabled(enabled);
                }
                Step::Msg(Some(CoordinatorMessage::SetIntervalMs(ms))) => self.on_set_interval(ms),
                Step::DebounceFired => self.on_debounce_fired(),
                Step::AttemptDone(result) => self.on_attempt_done(result),
                Step::PeriodicTick => self.on_periodic_tick(),
            }
        }

        // An upload already on the wire is never abandoned.
        if let Some(mut attempt) = self.in_flight.take() {
            debug!(file_name = %attempt.file_name, "draining in-flight sync before shutdown");
            let result = attempt.fut.as_mut().await;
            self.in_flight = Some(attempt);
            self.on_attempt_done(result);
        }

        info!("sync coordinator stopped");
    }

    fn check_period_for(interval_ms: u64) -> Duration {
        if interval_ms == 0 {
            Duration::from_millis(MAX_CHECK_MS)
        } else {
            Duration::from_millis(interval_ms.min(MAX_CHECK_MS))
        }
    }

    fn current_hash(&self) -> Option<String> {
        match change_detector::current_hash(&self.store) {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!(error = %err, "failed to hash watched data");
                None
            }
        }
    }

    /// Pick up settings another process may have written to the store.
    fn refresh_settings(&mut self) {
        let Ok(state) = self.store.load_sync_state() else {
            return;
        };
        if state.interval_ms != self.state.interval_ms {
            self.state.interval_ms = state.interval_ms;
            self.next_periodic_check =
                Instant::now() + Self::check_period_for(state.interval_ms);
        }
        if state.enabled != self.state.enabled {
            self.state.enabled = state.enabled;
            if !state.enabled {
                self.debounce = None;
                self.pending = None;
            }
        }
    }

    fn on_change(&mut self, event: &ChangeEvent) {
        self.refresh_settings();
        let Some(hash) = self.current_hash() else {
            return;
        };
        if !self.state.enabled {
            debug!(reason = %event.reason, "auto-sync disabled, ignoring change");
            return;
        }
        if self.state.already_synced(&hash) {
            debug!("content unchanged since last sync, nothing to do");
            return;
        }

        if self.in_flight.is_some() {
            // Latest change wins; earlier pending is superseded.
            self.pending = Some(PendingChange {
                reason: event.reason,
                key: event.key.clone(),
                content_hash: hash,
                observed_at: event.observed_at,
            });
            debug!(reason = %event.reason, "change queued behind in-flight sync");
        } else {
            self.arm_debounce(event.reason, event.key.clone(), self.tuning.debounce());
        }
    }

    fn on_manual(&mut self) {
        let Some(hash) = self.current_hash() else {
            return;
        };
        if self.state.already_synced(&hash) {
            info!("manual sync requested, content already synced");
            return;
        }

        if self.in_flight.is_some() {
            self.pending = Some(PendingChange {
                reason: ChangeReason::Manual,
                key: None,
                content_hash: hash,
                observed_at: Utc::now(),
            });
            return;
        }

        // Manual sync is immediate; a pending debounce is superseded.
        self.debounce = None;
        self.begin_attempt(ChangeReason::Manual);
    }

    fn on_set_enabled(&mut self, enabled: bool) {
        if let Err(err) = self.store.set_auto_sync_enabled(enabled) {
            warn!(error = %err, "failed to persist enabled flag");
        }
        self.state.enabled = enabled;

        if enabled {
            info!("auto-sync enabled");
            if let Some(hash) = self.current_hash() {
                if !self.state.already_synced(&hash) && self.in_flight.is_none() {
                    self.arm_debounce(ChangeReason::Enabled, None, self.tuning.debounce());
                }
            }
        } else {
            info!("auto-sync disabled");
            self.debounce = None;
            self.pending = None;
        }
    }

    fn on_set_interval(&mut self, interval_ms: u64) {
        if let Err(err) = self.store.set_sync_interval_ms(interval_ms) {
            warn!(error = %err, "failed to persist sync interval");
        }
        self.state.interval_ms = interval_ms;
        self.next_periodic_check = Instant::now() + Self::check_period_for(interval_ms);
        info!(interval_ms, "sync interval updated");
    }

    fn on_debounce_fired(&mut self) {
        let Some(armed) = self.debounce.take() else {
            return;
        };

        if !self.state.enabled && armed.reason != ChangeReason::Manual {
            return;
        }

        // Content may have settled back to the synced state during the
        // quiet period.
        let Some(hash) = self.current_hash() else {
            return;
        };
        if self.state.already_synced(&hash) {
            debug!("content settled back to synced state, skipping");
            return;
        }

        if self.in_flight.is_some() {
            self.pending = Some(PendingChange {
                reason: armed.reason,
                key: armed.key,
                content_hash: hash,
                observed_at: Utc::now(),
            });
            return;
        }

        self.begin_attempt(armed.reason);
    }

    fn on_periodic_tick(&mut self) {
        self.refresh_settings();
        self.next_periodic_check = Instant::now() + Self::check_period_for(self.state.interval_ms);

        if !self.state.enabled || self.state.interval_ms == 0 || self.in_flight.is_some() {
            return;
        }

        let due = self.last_sync_instant.map_or(true, |at| {
            at.elapsed() >= Duration::from_millis(self.state.interval_ms)
        });
        if !due {
            return;
        }

        let Some(hash) = self.current_hash() else {
            return;
        };
        if self.state.already_synced(&hash) {
            return;
        }

        debug!("periodic sync due");
        self.begin_attempt(ChangeReason::Periodic);
    }

    fn arm_debounce(&mut self, reason: ChangeReason, key: Option<String>, delay: Duration) {
        self.debounce = Some(Debounce {
            deadline: Instant::now() + delay,
            reason,
            key,
        });
        debug!(reason = %reason, delay_ms = delay.as_millis(), "debounce armed");
    }

    fn begin_attempt(&mut self, reason: ChangeReason) {
        let prepared = match build_payload(&self.store) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.sink.report(
                    SyncPhase::Error,
                    "failed to prepare backup",
                    Some(&err.to_string()),
                );
                return;
            }
        };
        let prefix = match effective_prefix(&self.store) {
            Ok(prefix) => prefix,
            Err(err) => {
                self.sink.report(
                    SyncPhase::Error,
                    "failed to read file name prefix",
                    Some(&err.to_string()),
                );
                return;
            }
        };

        let file_name = sync_file_name(&prefix, reason, Local::now());
        self.sink
            .report(SyncPhase::Syncing, "syncing", Some(&file_name));

        let target = Arc::clone(&self.target);
        let sink = Arc::clone(&self.sink);
        let tuning = self.tuning.clone();
        let body = prepared.body;
        let name = file_name.clone();
        let fut = Box::pin(async move {
            execute_upload(&target, &sink, &tuning, &name, &body).await
        });

        self.in_flight = Some(InFlight {
            fut,
            content_hash: prepared.content_hash,
            file_name,
        });
    }

    fn on_attempt_done(&mut self, result: std::result::Result<(), SyncError>) {
        let Some(attempt) = self.in_flight.take() else {
            return;
        };

        match result {
            Ok(()) => {
                let now = Utc::now();
                if let Err(err) = self.store.commit_sync_success(&attempt.content_hash, now) {
                    warn!(error = %err, "failed to persist sync state");
                }
                self.state.last_synced_hash = Some(attempt.content_hash);
                self.state.last_sync_at = Some(now);
                self.last_sync_instant = Some(Instant::now());
                self.sink.report(
                    SyncPhase::Synced,
                    "sync complete",
                    Some(&attempt.file_name),
                );
            }
            Err(SyncError::NotConnected) => {
                self.sink.report(
                    SyncPhase::Error,
                    "connection required",
                    Some(&self.target.describe()),
                );
            }
            Err(err) => {
                self.sink
                    .report(SyncPhase::Error, "sync failed", Some(&err.to_string()));
            }
        }

        // A change recorded during the attempt gets its own follow-up pass
        // after a cooldown, unless the attempt already covered it.
        if let Some(pending) = self.pending.take() {
            let covered = self.state.already_synced(&pending.content_hash);
            let allowed = self.state.enabled || pending.reason == ChangeReason::Manual;
            if !covered && allowed {
                debug!(
                    reason = %pending.reason,
                    observed_at = %pending.observed_at,
                    "scheduling follow-up for queued change"
                );
                self.arm_debounce(pending.reason, pending.key, self.tuning.cooldown());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::domain::UploadError;
    use crate::infrastructure::memo_store::WATCHED_KEY;

    struct MockTarget {
        connected: AtomicBool,
        delay: Mutex<Duration>,
        failures: Mutex<VecDeque<UploadError>>,
        uploads: Mutex<Vec<(String, String)>>,
    }

    impl MockTarget {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                delay: Mutex::new(Duration::ZERO),
                failures: Mutex::new(VecDeque::new()),
                uploads: Mutex::new(Vec::new()),
            })
        }

        fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        fn queue_failures(&self, errors: impl IntoIterator<Item = UploadError>) {
            self.failures.lock().unwrap().extend(errors);
        }

        fn uploads(&self) -> Vec<(String, String)> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BackupTarget for MockTarget {
        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn upload(
            &self,
            file_name: &str,
            body: &str,
        ) -> std::result::Result<(), UploadError> {
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.uploads
                .lock()
                .unwrap()
                .push((file_name.to_string(), body.to_string()));
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(())
        }

        fn describe(&self) -> String {
            "mock".into()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(SyncPhase, String)>>,
    }

    impl RecordingSink {
        fn phases(&self) -> Vec<SyncPhase> {
            self.events.lock().unwrap().iter().map(|(p, _)| *p).collect()
        }
    }

    impl StatusSink for RecordingSink {
        fn report(&self, phase: SyncPhase, message: &str, _detail: Option<&str>) {
            self.events
                .lock()
                .unwrap()
                .push((phase, message.to_string()));
        }
    }

    struct Harness {
        store: Arc<MemoStore>,
        target: Arc<MockTarget>,
        sink: Arc<RecordingSink>,
        handle: CoordinatorHandle,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn start() -> Self {
            let store = Arc::new(MemoStore::open_in_memory().unwrap());
            Self::start_with(store)
        }

        fn start_with(store: Arc<MemoStore>) -> Self {
            let target = MockTarget::new();
            let sink = Arc::new(RecordingSink::default());
            let (coordinator, handle) = SyncCoordinator::new(
                Arc::clone(&store),
                Arc::clone(&target) as Arc<dyn BackupTarget>,
                Arc::clone(&sink) as Arc<dyn StatusSink>,
                SyncTuning::default(),
            )
            .unwrap();
            let task = tokio::spawn(coordinator.run());
            Self {
                store,
                target,
                sink,
                handle,
                task,
            }
        }

        fn touch(&self, content: &str) {
            self.store.set(WATCHED_KEY, content).unwrap();
            self.handle.change(ChangeEvent::new(
                ChangeReason::Modified,
                Some(WATCHED_KEY.into()),
            ));
        }

        async fn stop(self) {
            self.handle.shutdown();
            self.task.await.unwrap();
        }
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_coalesce_into_one_sync() {
        let h = Harness::start();

        h.touch("{\"2025-08-25\":[\"a\"]}");
        settle(1000).await;
        h.touch("{\"2025-08-25\":[\"a\",\"b\"]}");
        settle(1000).await;
        h.touch("{\"2025-08-25\":[\"a\",\"b\",\"c\"]}");
        settle(5000).await;

        let uploads = h.target.uploads();
        assert_eq!(uploads.len(), 1, "bursts must coalesce into one upload");
        assert!(uploads[0].1.contains("\"c\""), "upload carries latest content");

        let expected = change_detector::content_hash("{\"2025-08-25\":[\"a\",\"b\",\"c\"]}");
        assert_eq!(
            h.store.last_synced_hash().unwrap().as_deref(),
            Some(expected.as_str())
        );
        assert!(h.store.last_sync_time().unwrap().is_some());

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn changes_during_flight_queue_one_followup() {
        let h = Harness::start();
        h.target.set_delay(Duration::from_secs(5));

        h.touch("v1");
        settle(3100).await; // debounce fired, upload now in flight

        h.touch("v2");
        settle(500).await;
        h.touch("v3");
        settle(20_000).await; // first attempt lands, cooldown, follow-up lands

        let uploads = h.target.uploads();
        assert_eq!(uploads.len(), 2, "one in-flight plus one follow-up");
        assert!(uploads[1].1.contains("v3"), "follow-up carries latest content");

        assert_eq!(
            h.store.last_synced_hash().unwrap(),
            Some(change_detector::content_hash("v3"))
        );

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_content_is_a_no_op() {
        let h = Harness::start();

        h.touch("same");
        settle(4000).await;
        assert_eq!(h.target.uploads().len(), 1);

        // Change event without a content change
        h.handle.change(ChangeEvent::new(
            ChangeReason::Modified,
            Some(WATCHED_KEY.into()),
        ));
        settle(10_000).await;

        assert_eq!(h.target.uploads().len(), 1, "identical content never re-syncs");

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_retry_then_recover() {
        let h = Harness::start();
        h.target.queue_failures([
            UploadError::Network("connection reset".into()),
            UploadError::Server(503),
        ]);

        h.touch("content");
        settle(15_000).await;

        assert_eq!(h.target.uploads().len(), 3, "two retries then success");
        let phases = h.sink.phases();
        assert_eq!(
            phases,
            vec![
                SyncPhase::Syncing,
                SyncPhase::Retrying,
                SyncPhase::Retrying,
                SyncPhase::Synced
            ]
        );

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_bounded() {
        let h = Harness::start();
        h.target.queue_failures([
            UploadError::Timeout,
            UploadError::Timeout,
            UploadError::Timeout,
            UploadError::Timeout,
            UploadError::Timeout,
        ]);

        h.touch("content");
        settle(30_000).await;

        // max_retries = 3: the initial try plus three retries, never more
        assert_eq!(h.target.uploads().len(), 4);
        assert_eq!(h.sink.phases().last(), Some(&SyncPhase::Error));
        assert!(h.store.last_synced_hash().unwrap().is_none());

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_is_terminal() {
        let h = Harness::start();
        h.target.queue_failures([UploadError::Rejected(401)]);

        h.touch("content");
        settle(15_000).await;

        assert_eq!(h.target.uploads().len(), 1, "4xx is never retried");
        assert_eq!(h.sink.phases(), vec![SyncPhase::Syncing, SyncPhase::Error]);
        assert!(h.store.last_synced_hash().unwrap().is_none());

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_trigger_respects_interval() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());
        store.set_sync_interval_ms(120_000).unwrap();
        let h = Harness::start_with(store);

        h.touch("v1");
        settle(4000).await;
        assert_eq!(h.target.uploads().len(), 1);

        // Mutate the store without telling the coordinator, as another
        // process would.
        h.store.set(WATCHED_KEY, "\"v2\"").unwrap();

        settle(110_000).await;
        assert_eq!(h.target.uploads().len(), 1, "interval not yet elapsed");

        settle(70_000).await;
        let uploads = h.target.uploads();
        assert_eq!(uploads.len(), 2, "periodic sync fires once interval elapses");
        assert!(
            uploads[1].0.contains("-other-"),
            "periodic backups use the generic label"
        );

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disable_cancels_armed_debounce() {
        let h = Harness::start();

        h.touch("content");
        settle(1000).await;
        h.handle.set_enabled(false);
        settle(30_000).await;

        assert!(h.target.uploads().is_empty(), "disable cancels the quiet period");
        assert_eq!(
            h.store.get("autoSyncEnabled").unwrap().as_deref(),
            Some("false")
        );

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_coordinator_ignores_changes() {
        let h = Harness::start();
        h.handle.set_enabled(false);
        settle(10).await;

        h.touch("content");
        settle(30_000).await;

        assert!(h.target.uploads().is_empty());

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn enabling_syncs_content_changed_while_off() {
        let h = Harness::start();
        h.handle.set_enabled(false);
        settle(10).await;

        h.store.set(WATCHED_KEY, "\"offline edit\"").unwrap();
        h.handle.set_enabled(true);
        settle(5000).await;

        let uploads = h.target.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].0.contains("-other-"));

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_sync_bypasses_disabled_flag() {
        let h = Harness::start();
        h.handle.set_enabled(false);
        settle(10).await;

        h.store.set(WATCHED_KEY, "\"edited\"").unwrap();
        h.handle.sync_now();
        settle(1000).await;

        let uploads = h.target.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].0.contains("-manual-"));

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_sync_skips_when_already_synced() {
        let h = Harness::start();

        h.touch("content");
        settle(4000).await;
        assert_eq!(h.target.uploads().len(), 1);

        h.handle.sync_now();
        settle(5000).await;
        assert_eq!(h.target.uploads().len(), 1);

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_target_reports_error_without_upload() {
        let h = Harness::start();
        h.target.connected.store(false, Ordering::SeqCst);

        h.touch("content");
        settle(5000).await;

        assert!(h.target.uploads().is_empty());
        assert_eq!(h.sink.phases(), vec![SyncPhase::Syncing, SyncPhase::Error]);
        assert!(h.store.last_synced_hash().unwrap().is_none());

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_takes_effect() {
        let h = Harness::start();

        h.touch("v1");
        settle(4000).await;
        assert_eq!(h.target.uploads().len(), 1);

        h.handle.set_interval_ms(30_000);
        settle(10).await;
        assert_eq!(h.store.sync_interval_ms().unwrap(), 30_000);

        h.store.set(WATCHED_KEY, "\"v2\"").unwrap();
        settle(40_000).await;

        assert_eq!(h.target.uploads().len(), 2, "shorter interval fires sooner");

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_in_flight_attempt() {
        let h = Harness::start();
        h.target.set_delay(Duration::from_secs(5));

        h.touch("content");
        settle(3100).await; // attempt in flight

        h.handle.shutdown();
        h.task.await.unwrap();

        assert_eq!(h.target.uploads().len(), 1, "in-flight upload completes");
        assert!(h.store.last_synced_hash().unwrap().is_some());
    }
}
