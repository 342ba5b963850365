//! Event types for the Claimsight event system
//!
//! Provides shared event definitions and the EventBus used to bridge engine
//! state changes to SSE subscribers (the dashboard) without coupling the
//! engine loop to any presentation concern.

use crate::types::{EngineMetrics, LogLevel};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Claimsight event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// All events carry a UTC timestamp so the dashboard can order them without
/// trusting delivery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaimsightEvent {
    /// Analysis engine entered the Running state
    EngineStarted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis engine left the Running state
    ///
    /// `critical` distinguishes a backend/AI connectivity fault from a
    /// benign pause (operator stop or no pending work).
    EngineStopped {
        critical: bool,
        /// Human-readable cause, mirrored in the engine log
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One engine log entry was appended
    EngineLog {
        level: LogLevel,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One processing cycle finished its reconciliation step
    CycleCompleted {
        /// Results durably saved during this cycle
        saved: usize,
        /// Records still buffered in the local queue
        remaining_queue: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress percentage recomputed against refreshed backend metrics
    AnalysisProgress {
        /// 0-100, derived, never authoritative
        progress: u8,
        pending: u64,
        processed: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Backend metrics snapshot refreshed
    MetricsRefreshed {
        metrics: EngineMetrics,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// AI provider setting (re)loaded from the backend
    SettingsRefreshed {
        ai_provider: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ClaimsightEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &str {
        match self {
            ClaimsightEvent::EngineStarted { .. } => "EngineStarted",
            ClaimsightEvent::EngineStopped { .. } => "EngineStopped",
            ClaimsightEvent::EngineLog { .. } => "EngineLog",
            ClaimsightEvent::CycleCompleted { .. } => "CycleCompleted",
            ClaimsightEvent::AnalysisProgress { .. } => "AnalysisProgress",
            ClaimsightEvent::MetricsRefreshed { .. } => "MetricsRefreshed",
            ClaimsightEvent::SettingsRefreshed { .. } => "SettingsRefreshed",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine loop)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClaimsightEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ClaimsightEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscriber is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ClaimsightEvent,
    ) -> Result<usize, broadcast::error::SendError<ClaimsightEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// The engine loop uses this for all its events: engine correctness
    /// never depends on an attached dashboard.
    pub fn emit_lossy(&self, event: ClaimsightEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eventbus_new_reports_capacity() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn eventbus_emit_delivers_to_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(ClaimsightEvent::EngineStarted {
            timestamp: chrono::Utc::now(),
        })
        .expect("emit should succeed");

        let received = rx.try_recv().expect("should receive event");
        assert_eq!(received.event_type(), "EngineStarted");
    }

    #[test]
    fn eventbus_emit_lossy_never_panics_without_subscribers() {
        let bus = EventBus::new(2);

        for i in 0..10 {
            bus.emit_lossy(ClaimsightEvent::AnalysisProgress {
                progress: (i * 10) as u8,
                pending: 100 - i,
                processed: i,
                timestamp: chrono::Utc::now(),
            });
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn eventbus_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(ClaimsightEvent::EngineStopped {
            critical: false,
            reason: "operator stop".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .expect("emit should succeed");

        assert_eq!(rx1.try_recv().unwrap().event_type(), "EngineStopped");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "EngineStopped");
    }

    #[test]
    fn events_serialize_with_type_tag_for_sse() {
        let event = ClaimsightEvent::CycleCompleted {
            saved: 35,
            remaining_queue: 210,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"CycleCompleted\""));
        assert!(json.contains("\"saved\":35"));

        let back: ClaimsightEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "CycleCompleted");
    }
}
