//! Engine facade
//!
//! `EngineHandle` is the only way the rest of the service (HTTP layer, main,
//! tests) interacts with the engine. It is cheap to clone and hides the
//! engine's internal locking entirely.

use super::{AnalysisEngine, EnginePolicy, EngineStatus};
use crate::gateway::BackendGateway;
use claimsight_common::events::EventBus;
use claimsight_common::types::EngineLogEntry;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Cloneable handle to a single shared engine instance.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<AnalysisEngine>,
}

impl EngineHandle {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        events: EventBus,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            inner: AnalysisEngine::new(gateway, events, policy),
        }
    }

    /// Fetch the initial metrics/settings snapshot from the backend.
    /// Called once at service startup, before the run loop is spawned.
    pub async fn bootstrap(&self) {
        self.inner.bootstrap().await;
    }

    /// Spawn the timer-driven run loop. Returns immediately; the loop runs
    /// until `shutdown` is cancelled.
    pub fn spawn_run_loop(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(&self.inner);
        tokio::spawn(engine.run(shutdown))
    }

    pub async fn start(&self) {
        self.inner.start().await;
    }

    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    pub async fn toggle(&self) {
        self.inner.toggle().await;
    }

    /// Run one cycle immediately. Returns false if the engine is stopped or
    /// a cycle is already in flight.
    pub async fn run_cycle_now(&self) -> bool {
        self.inner.run_cycle_now().await
    }

    pub async fn refresh_settings(&self) {
        self.inner.refresh_settings().await;
    }

    /// Current status snapshot.
    pub fn status(&self) -> EngineStatus {
        self.inner.status()
    }

    /// Watch-channel subscription for status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.inner.subscribe()
    }

    /// Snapshot of the bounded engine log, oldest first.
    pub fn logs(&self) -> Vec<EngineLogEntry> {
        self.inner.logs().snapshot()
    }
}
