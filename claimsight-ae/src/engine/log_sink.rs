//! Bounded engine log
//!
//! Append-only, level-tagged event log for operator visibility. Entries are
//! retained in arrival order; when the sink grows past its high-water mark
//! (500 entries) it truncates to the most recent window (200 entries) to
//! bound memory across long-running sessions.

use chrono::Utc;
use claimsight_common::events::{ClaimsightEvent, EventBus};
use claimsight_common::types::{EngineLogEntry, LogLevel};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const MAX_ENTRIES: usize = 500;
const RETAIN_ENTRIES: usize = 200;

/// Append-only bounded log sink.
///
/// Cheap to clone; clones share the same buffer. Appends never fail and are
/// safe from concurrently running sub-batch tasks.
#[derive(Clone)]
pub struct LogSink {
    entries: Arc<Mutex<VecDeque<EngineLogEntry>>>,
    events: EventBus,
    max_entries: usize,
    retain_entries: usize,
}

impl LogSink {
    pub fn new(events: EventBus) -> Self {
        Self::with_limits(events, MAX_ENTRIES, RETAIN_ENTRIES)
    }

    /// Construct with explicit limits (tests use small windows).
    pub fn with_limits(events: EventBus, max_entries: usize, retain_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            events,
            max_entries,
            retain_entries,
        }
    }

    /// Append one entry. Level is advisory metadata only.
    ///
    /// Each entry is mirrored to `tracing` for service logs and broadcast on
    /// the event bus for SSE subscribers.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();

        match level {
            LogLevel::Error => tracing::error!(target: "engine", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "engine", "{}", message),
            _ => tracing::info!(target: "engine", "{}", message),
        }

        let entry = EngineLogEntry {
            timestamp: Utc::now(),
            level,
            message: message.clone(),
        };

        {
            let mut entries = self.entries.lock().expect("log sink lock poisoned");
            entries.push_back(entry.clone());
            if entries.len() > self.max_entries {
                let excess = entries.len() - self.retain_entries;
                entries.drain(..excess);
            }
        }

        self.events.emit_lossy(ClaimsightEvent::EngineLog {
            level,
            message,
            timestamp: entry.timestamp,
        });
    }

    /// Read-only snapshot in arrival order.
    pub fn snapshot(&self) -> Vec<EngineLogEntry> {
        self.entries
            .lock()
            .expect("log sink lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("log sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
