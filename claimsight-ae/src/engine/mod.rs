//! Analysis engine loop
//!
//! A continuously-running, self-scheduling loop that pulls pending records
//! from the records backend, fans them out into concurrent AI-analysis
//! sub-batches, persists results, and applies failure/backoff policy.
//!
//! The loop owns all mutable engine state in named fields (local queue,
//! counters, re-entrancy guard); the rest of the service only sees the
//! read-only projection published on a watch channel and the event bus.
//!
//! Scheduling discipline: one cycle executes immediately on entering the
//! Running state, then the timer fires at a fixed interval regardless of how
//! long the previous cycle took. The `cycle_in_flight` guard makes a tick
//! that lands mid-cycle a no-op, so at most one cycle body is ever running.
//! Stopping the engine does not cancel in-flight sub-batches; it only keeps
//! the next tick from launching a new cycle.

mod handle;
mod log_sink;

pub use handle::EngineHandle;
pub use log_sink::LogSink;

use crate::gateway::BackendGateway;
use chrono::Utc;
use claimsight_common::events::{ClaimsightEvent, EventBus};
use claimsight_common::types::{EngineMetrics, LogLevel, PendingRecord};
use claimsight_common::Result;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Tunable scheduling policy. These are knobs, not contract: the defaults
/// match the original deployment (35-record sub-batches, 7 in flight,
/// 5 second tick).
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    /// Records per analyze/save sub-batch
    pub batch_size: usize,
    /// Sub-batches dispatched concurrently within one cycle
    pub max_concurrent_batches: usize,
    /// Fixed tick between cycle attempts
    pub cycle_interval: Duration,
    /// Consecutive empty fetches before a graceful stop
    pub max_empty_fetches: u32,
    /// Consecutive zero-save cycles before a critical stop
    pub max_cycle_failures: u32,
}

impl EnginePolicy {
    /// Records fetched or drained per cycle
    pub fn cycle_capacity(&self) -> usize {
        self.batch_size * self.max_concurrent_batches
    }
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            batch_size: 35,
            max_concurrent_batches: 7,
            cycle_interval: Duration::from_secs(5),
            max_empty_fetches: 3,
            max_cycle_failures: 5,
        }
    }
}

/// Read-only projection of engine state for the facade and the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    /// Distinguishes a backend/AI connectivity fault from a benign pause
    pub critical_error: bool,
    /// Derived percentage, 0-100, never authoritative
    pub progress: u8,
    /// Last-known backend counters (refreshed opportunistically)
    pub metrics: Option<EngineMetrics>,
    pub ai_provider: String,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            running: false,
            critical_error: false,
            progress: 0,
            metrics: None,
            ai_provider: "gemini".to_string(),
        }
    }
}

/// State owned exclusively by the cycle body, behind one async mutex.
struct CycleState {
    /// Fetched-but-not-yet-processed records, consumed from the front.
    /// Items leave only after their results were durably saved; failed
    /// sub-batch records stay and are retried implicitly on later cycles.
    local_queue: VecDeque<PendingRecord>,
    /// Baseline captured once per run-session, used only for progress
    initial_pending: u64,
    consecutive_empty_fetches: u32,
    consecutive_cycle_failures: u32,
}

/// Outcome of one sub-batch pipeline (analyze then save).
#[derive(Default)]
struct SubBatchOutcome {
    saved_ids: Vec<String>,
    /// Opportunistic metrics refresh taken after a successful save
    metrics: Option<EngineMetrics>,
}

/// The engine core. Construct via [`EngineHandle::new`].
pub(crate) struct AnalysisEngine {
    gateway: Arc<dyn BackendGateway>,
    policy: EnginePolicy,
    logs: LogSink,
    events: EventBus,
    state: Mutex<CycleState>,
    /// Re-entrancy guard: at most one cycle body runs at a time
    cycle_in_flight: AtomicBool,
    status_tx: watch::Sender<EngineStatus>,
    /// Wakes the run loop for an immediate cycle on start
    wake: Notify,
}

impl AnalysisEngine {
    pub(crate) fn new(
        gateway: Arc<dyn BackendGateway>,
        events: EventBus,
        policy: EnginePolicy,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(EngineStatus::default());
        Arc::new(Self {
            gateway,
            policy,
            logs: LogSink::new(events.clone()),
            events,
            state: Mutex::new(CycleState {
                local_queue: VecDeque::new(),
                initial_pending: 0,
                consecutive_empty_fetches: 0,
                consecutive_cycle_failures: 0,
            }),
            cycle_in_flight: AtomicBool::new(false),
            status_tx,
            wake: Notify::new(),
        })
    }

    pub(crate) fn logs(&self) -> &LogSink {
        &self.logs
    }

    pub(crate) fn status(&self) -> EngineStatus {
        self.status_tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    fn is_running(&self) -> bool {
        self.status_tx.borrow().running
    }

    /// Enter the Running state. Idempotent: a start while already running
    /// only clears a stale critical flag.
    pub(crate) async fn start(&self) {
        let mut was_running = false;
        self.status_tx.send_modify(|s| {
            was_running = s.running;
            s.running = true;
            // A fresh attempt must not carry over a stale fault indicator
            s.critical_error = false;
        });
        if was_running {
            return;
        }

        {
            // Capture the progress baseline from the latest metrics snapshot,
            // unless a previous session's baseline is still being consumed.
            let mut state = self.state.lock().await;
            let (progress, pending) = {
                let status = self.status_tx.borrow();
                (
                    status.progress,
                    status.metrics.as_ref().map(|m| m.pending_count).unwrap_or(0),
                )
            };
            if pending > 0 && (state.initial_pending == 0 || progress == 100) {
                state.initial_pending = pending;
                self.status_tx.send_modify(|s| s.progress = 0);
            }
        }

        self.logs
            .append(LogLevel::Info, "Analysis engine started (queue mode).");
        self.events.emit_lossy(ClaimsightEvent::EngineStarted {
            timestamp: Utc::now(),
        });
        self.wake.notify_one();
    }

    /// Leave the Running state. Idempotent: a stop while already stopped is
    /// a no-op. In-flight sub-batches are not cancelled.
    pub(crate) async fn stop(&self) {
        let mut was_running = false;
        self.status_tx.send_modify(|s| {
            was_running = s.running;
            s.running = false;
        });
        if !was_running {
            return;
        }

        self.logs
            .append(LogLevel::Info, "Analysis engine paused by operator.");
        self.events.emit_lossy(ClaimsightEvent::EngineStopped {
            critical: false,
            reason: "operator stop".to_string(),
            timestamp: Utc::now(),
        });
    }

    pub(crate) async fn toggle(&self) {
        if self.is_running() {
            self.stop().await;
        } else {
            self.start().await;
        }
    }

    /// Internal stop used by the cycle body for threshold and fault stops.
    fn transition_to_stopped(&self, critical: bool, reason: &str) {
        self.status_tx.send_modify(|s| {
            s.running = false;
            if critical {
                s.critical_error = true;
            }
        });
        self.events.emit_lossy(ClaimsightEvent::EngineStopped {
            critical,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Fetch the initial metrics snapshot and AI provider setting.
    ///
    /// A metrics failure here raises the critical flag immediately: the
    /// dashboard should show a fault, not silently missing counters. A
    /// settings failure retains the defaults.
    pub(crate) async fn bootstrap(&self) {
        match self.gateway.get_metrics().await {
            Ok(metrics) => {
                self.publish_metrics(metrics);
                self.logs.append(
                    LogLevel::Info,
                    "AI analysis system initialized in background.",
                );
            }
            Err(e) => {
                self.logs.append(
                    LogLevel::Error,
                    format!("Critical failure connecting to the records backend: {}", e),
                );
                self.status_tx.send_modify(|s| s.critical_error = true);
            }
        }
        self.refresh_settings().await;
    }

    /// (Re)load the AI provider setting from the backend. Failures keep the
    /// current value.
    pub(crate) async fn refresh_settings(&self) {
        match self.gateway.get_settings().await {
            Ok(settings) => {
                self.status_tx
                    .send_modify(|s| s.ai_provider = settings.ai_provider.clone());
                self.events.emit_lossy(ClaimsightEvent::SettingsRefreshed {
                    ai_provider: settings.ai_provider,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                tracing::warn!("Settings refresh failed, keeping current provider: {}", e);
            }
        }
    }

    /// Timer-driven run loop. One cycle immediately on start, then every
    /// tick while running. Lives until `shutdown` is cancelled.
    pub(crate) async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.policy.cycle_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = ticker.tick() => {}
            }

            if !self.is_running() {
                continue;
            }

            // A tick that lands while the previous cycle is still in flight
            // is a no-op; the timer keeps firing on its own schedule.
            if self.cycle_in_flight.swap(true, Ordering::SeqCst) {
                continue;
            }

            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                engine.cycle().await;
                engine.cycle_in_flight.store(false, Ordering::SeqCst);
            });
        }
    }

    /// Execute one cycle immediately if none is in flight.
    ///
    /// Returns false when the engine is stopped or a cycle is already
    /// running. Used by the run loop indirectly (via the timer), by the
    /// manual-trigger API, and by tests.
    pub(crate) async fn run_cycle_now(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        if self.cycle_in_flight.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cycle().await;
        self.cycle_in_flight.store(false, Ordering::SeqCst);
        true
    }

    /// Cycle boundary: no failure escapes. Anything the cycle body did not
    /// absorb itself becomes an ERROR log entry plus a critical stop.
    async fn cycle(&self) {
        if let Err(e) = self.cycle_body().await {
            self.logs.append(
                LogLevel::Error,
                format!("Cycle aborted by unexpected error: {}", e),
            );
            self.transition_to_stopped(true, "unexpected cycle error");
        }
    }

    /// One cycle body: refill check, partition, parallel dispatch,
    /// settle-all join, reconciliation.
    async fn cycle_body(&self) -> Result<()> {
        let capacity = self.policy.cycle_capacity();

        // Step 1: refill the local queue when it is empty.
        {
            let mut state = self.state.lock().await;
            if state.local_queue.is_empty() {
                self.logs.append(
                    LogLevel::AiEngine,
                    format!("Fetching new batch of pending records ({} items)...", capacity),
                );
                match self.gateway.fetch_pending(capacity).await {
                    Err(e) => {
                        self.logs.append(
                            LogLevel::Error,
                            format!("Failed to fetch pending records: {}", e),
                        );
                        self.transition_to_stopped(true, "fetch failure");
                        return Ok(());
                    }
                    Ok(batch) if batch.is_empty() => {
                        state.consecutive_empty_fetches += 1;
                        let attempt = state.consecutive_empty_fetches;

                        if attempt >= self.policy.max_empty_fetches {
                            state.consecutive_empty_fetches = 0;
                            self.logs.append(
                                LogLevel::Warning,
                                "Analysis engine paused: no pending records left.",
                            );
                            self.transition_to_stopped(false, "no pending records");
                            return Ok(());
                        }

                        self.logs.append(
                            LogLevel::Info,
                            format!(
                                "No pending records found. Attempt {}/{}. Waiting...",
                                attempt, self.policy.max_empty_fetches
                            ),
                        );
                        // Caught up with the backend for now
                        self.set_progress(100);
                        return Ok(());
                    }
                    Ok(batch) => {
                        state.consecutive_empty_fetches = 0;
                        state.local_queue.extend(batch);
                        self.logs.append(
                            LogLevel::Info,
                            format!("Local queue refilled with {} records.", state.local_queue.len()),
                        );
                    }
                }
            }
        }

        // Step 2: take up to one cycle's capacity from the front of the
        // queue and split into fixed-size sub-batches, order preserved.
        // Items are NOT removed here; removal happens at reconciliation,
        // keyed by the ids that were actually saved.
        let chunks: Vec<Vec<PendingRecord>> = {
            let state = self.state.lock().await;
            let take = capacity.min(state.local_queue.len());
            state
                .local_queue
                .iter()
                .take(take)
                .cloned()
                .collect::<Vec<_>>()
                .chunks(self.policy.batch_size)
                .map(|c| c.to_vec())
                .collect()
        };

        if chunks.is_empty() {
            return Ok(());
        }

        self.logs.append(
            LogLevel::Info,
            format!(
                "Starting parallel dispatch: {} sub-batches of up to {} records.",
                chunks.len(),
                self.policy.batch_size
            ),
        );

        // Steps 3-4: dispatch all sub-batch pipelines concurrently, then
        // settle-all join. An individual failure never cancels siblings and
        // never rejects the join.
        let mut join_set = JoinSet::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let logs = self.logs.clone();
            join_set.spawn(async move { process_sub_batch(index + 1, chunk, gateway, logs).await });
        }

        let mut saved_ids: HashSet<String> = HashSet::new();
        let mut total_saved = 0usize;
        let mut refreshed_metrics: Option<EngineMetrics> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    total_saved += outcome.saved_ids.len();
                    saved_ids.extend(outcome.saved_ids);
                    if let Some(metrics) = outcome.metrics {
                        refreshed_metrics = Some(metrics);
                    }
                }
                Err(e) => {
                    self.logs
                        .append(LogLevel::Warning, format!("Sub-batch task failed: {}", e));
                }
            }
        }
        if let Some(metrics) = refreshed_metrics {
            self.publish_metrics(metrics);
        }

        // Step 5: reconciliation.
        let mut state = self.state.lock().await;
        if total_saved > 0 {
            state.consecutive_cycle_failures = 0;

            // Set-membership filter: only durably saved ids leave the queue;
            // duplicate ids across sub-batches collapse to one removal.
            state.local_queue.retain(|record| !saved_ids.contains(&record.id));

            self.logs.append(
                LogLevel::Success,
                format!(
                    "Cycle complete: {} results saved, {} records remaining in local queue.",
                    total_saved,
                    state.local_queue.len()
                ),
            );
            self.events.emit_lossy(ClaimsightEvent::CycleCompleted {
                saved: total_saved,
                remaining_queue: state.local_queue.len(),
                timestamp: Utc::now(),
            });

            // Final metrics sync and progress recomputation. A metrics
            // failure skips the refresh only; it never fails the cycle.
            match self.gateway.get_metrics().await {
                Ok(metrics) => {
                    if state.initial_pending > 0 {
                        let processed =
                            state.initial_pending.saturating_sub(metrics.pending_count);
                        let pct = (processed as f64 / state.initial_pending as f64) * 100.0;
                        self.set_progress(pct.round().clamp(0.0, 100.0) as u8);
                    }
                    self.publish_metrics(metrics);
                }
                Err(e) => {
                    tracing::debug!("Metrics refresh failed after cycle: {}", e);
                }
            }
        } else {
            state.consecutive_cycle_failures += 1;
            let failures = state.consecutive_cycle_failures;
            self.logs.append(
                LogLevel::Warning,
                format!(
                    "Cycle finished without successful saves. Consecutive failures: {}",
                    failures
                ),
            );

            if failures >= self.policy.max_cycle_failures {
                state.consecutive_cycle_failures = 0;
                self.logs.append(
                    LogLevel::Error,
                    "Engine stopped: too many consecutive failed cycles.",
                );
                self.transition_to_stopped(true, "consecutive cycle failures");
            }
        }

        Ok(())
    }

    fn set_progress(&self, progress: u8) {
        self.status_tx.send_modify(|s| s.progress = progress);

        let (pending, processed) = {
            let status = self.status_tx.borrow();
            status
                .metrics
                .as_ref()
                .map(|m| (m.pending_count, m.processed_count))
                .unwrap_or((0, 0))
        };
        self.events.emit_lossy(ClaimsightEvent::AnalysisProgress {
            progress,
            pending,
            processed,
            timestamp: Utc::now(),
        });
    }

    fn publish_metrics(&self, metrics: EngineMetrics) {
        self.status_tx
            .send_modify(|s| s.metrics = Some(metrics.clone()));
        self.events.emit_lossy(ClaimsightEvent::MetricsRefreshed {
            metrics,
            timestamp: Utc::now(),
        });
    }
}

/// One sub-batch pipeline: analyze, then save immediately.
///
/// Every failure is absorbed here as a log entry; the records of a failed
/// sub-batch simply stay in the local queue for a later cycle.
async fn process_sub_batch(
    batch_no: usize,
    records: Vec<PendingRecord>,
    gateway: Arc<dyn BackendGateway>,
    logs: LogSink,
) -> SubBatchOutcome {
    let results = match gateway.analyze_batch(&records).await {
        Err(e) => {
            logs.append(
                LogLevel::Warning,
                format!("[Batch {}] analysis request failed: {}", batch_no, e),
            );
            return SubBatchOutcome::default();
        }
        Ok(None) => {
            logs.append(
                LogLevel::Warning,
                format!("[Batch {}] AI request returned no result.", batch_no),
            );
            return SubBatchOutcome::default();
        }
        Ok(Some(results)) if results.is_empty() => {
            logs.append(
                LogLevel::Warning,
                format!("[Batch {}] AI returned no valid classifications.", batch_no),
            );
            return SubBatchOutcome::default();
        }
        Ok(Some(results)) => results,
    };

    match gateway.save_results(&results).await {
        Ok(saved_ids) if saved_ids.is_empty() => {
            logs.append(
                LogLevel::Error,
                format!("[Batch {}] backend persisted no results.", batch_no),
            );
            SubBatchOutcome::default()
        }
        // Only ids the gateway reports as persisted count as saved; a
        // result the backend could not key leaves its record queued.
        Ok(saved_ids) => {
            logs.append(
                LogLevel::Success,
                format!("[Batch {}] saved {} results.", batch_no, saved_ids.len()),
            );
            // Opportunistic refresh so the dashboard moves as each
            // sub-batch lands; a failure here is swallowed.
            let metrics = gateway.get_metrics().await.ok();
            SubBatchOutcome { saved_ids, metrics }
        }
        Err(e) => {
            logs.append(
                LogLevel::Error,
                format!("[Batch {}] save request failed: {}", batch_no, e),
            );
            SubBatchOutcome::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_capacity_is_batch_size_times_concurrency() {
        let policy = EnginePolicy::default();
        assert_eq!(policy.cycle_capacity(), 245);
    }

    #[test]
    fn default_status_is_stopped_without_fault() {
        let status = EngineStatus::default();
        assert!(!status.running);
        assert!(!status.critical_error);
        assert_eq!(status.progress, 0);
        assert_eq!(status.ai_provider, "gemini");
    }
}
