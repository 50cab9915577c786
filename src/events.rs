use crate::backend::{BackendAvailability, ScannerBackendKind};
use crate::status::{ErrorPayload, StatusSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Events emitted by the scanner session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScannerEvent {
    /// Snapshot emitted at the end of every transition
    StatusChanged { status: StatusSnapshot },
    /// A backend was chosen during prepare
    BackendSelected {
        backend: ScannerBackendKind,
        availability: BackendAvailability,
    },
    /// The primary engine was replaced by the fallback engine
    FallbackTransition {
        from: ScannerBackendKind,
        to: ScannerBackendKind,
        reason: String,
    },
    /// A scan request resolved with a decoded value
    ScanCompleted {
        backend: ScannerBackendKind,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    /// A scan request resolved with an error
    ScanFailed { error: ErrorPayload },
    /// The host reported memory pressure
    MemoryPressure,
}

impl ScannerEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScannerEvent::StatusChanged { status } => format!(
                "Status changed (prepared={}, scanning={}, backend={})",
                status.prepared, status.scanning, status.active_backend
            ),
            ScannerEvent::BackendSelected { backend, .. } => {
                format!("Backend selected: {}", backend)
            }
            ScannerEvent::FallbackTransition { from, to, reason } => {
                format!("Fallback from {} to {}: {}", from, to, reason)
            }
            ScannerEvent::ScanCompleted {
                backend,
                duration_ms,
                ..
            } => format!("Scan completed by {} in {} ms", backend, duration_ms),
            ScannerEvent::ScanFailed { error } => {
                format!("Scan failed: {} ({})", error.name, error.message)
            }
            ScannerEvent::MemoryPressure => "Memory pressure".to_string(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScannerEvent::StatusChanged { .. } => "status_changed",
            ScannerEvent::BackendSelected { .. } => "backend_selected",
            ScannerEvent::FallbackTransition { .. } => "fallback_transition",
            ScannerEvent::ScanCompleted { .. } => "scan_completed",
            ScannerEvent::ScanFailed { .. } => "scan_failed",
            ScannerEvent::MemoryPressure => "memory_pressure",
        }
    }
}

/// Broadcast bus for session events
pub struct EventBus {
    sender: broadcast::Sender<ScannerEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.sender.subscribe()
    }

    /// Publish to all subscribers. Returns how many received the event;
    /// having no subscribers is normal.
    pub fn publish(&self, event: ScannerEvent) -> usize {
        match &event {
            ScannerEvent::FallbackTransition { from, to, reason } => {
                warn!("Scanner fallback {} -> {}: {}", from, to, reason);
            }
            ScannerEvent::ScanFailed { error } => {
                info!("Scan failed with {} ({})", error.name, error.code);
            }
            ScannerEvent::MemoryPressure => warn!("Memory pressure reported by host"),
            ScannerEvent::StatusChanged { .. } => trace!("Event: {}", event.description()),
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(ScannerEvent::MemoryPressure), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(4);
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let delivered = bus.publish(ScannerEvent::FallbackTransition {
            from: ScannerBackendKind::PrimaryEngine,
            to: ScannerBackendKind::FallbackEngine,
            reason: "decode pipeline crashed".to_string(),
        });
        assert_eq!(delivered, 1);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "fallback_transition");
        assert!(event.description().contains("PrimaryEngine"));
    }
}
