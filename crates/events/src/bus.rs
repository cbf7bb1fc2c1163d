//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`TrackerEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` between the sync driver and
//! whatever surfaces notifications to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use worktrack_core::types::EntityId;

// ---------------------------------------------------------------------------
// TrackerEvent
// ---------------------------------------------------------------------------

/// Something the engine did that a user-facing surface may want to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A derived or explicit status change was applied locally.
    StatusChanged {
        entity_id: EntityId,
        from: String,
        to: String,
        progress: Option<u8>,
    },

    /// A completed action promoted its project's status.
    AutoTriggered {
        project_id: EntityId,
        action_id: EntityId,
        status: String,
    },

    /// A persistence call failed; local state was kept.
    PersistFailed { entity_id: EntityId, message: String },

    /// An independent external change replaced local state.
    ExternalAdopted {
        project_id: EntityId,
        collection: String,
    },

    /// Focus moved on to the next incomplete asset.
    FocusAdvanced {
        project_id: EntityId,
        from_asset_id: EntityId,
        to_asset_id: Option<EntityId>,
    },
}

impl TrackerEvent {
    /// Dot-separated event name, e.g. `"status.changed"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "status.changed",
            Self::AutoTriggered { .. } => "status.auto_triggered",
            Self::PersistFailed { .. } => "persist.failed",
            Self::ExternalAdopted { .. } => "sync.external_adopted",
            Self::FocusAdvanced { .. } => "focus.advanced",
        }
    }
}

/// A [`TrackerEvent`] stamped with the time it was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerEventEnvelope {
    #[serde(flatten)]
    pub event: TrackerEvent,

    /// When the event was published (UTC).
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use worktrack_events::bus::{EventBus, TrackerEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(TrackerEvent::PersistFailed {
///     entity_id: "p1".into(),
///     message: "offline".into(),
/// });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<TrackerEventEnvelope>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: TrackerEvent) {
        tracing::trace!(event_type = event.event_type(), "Publishing tracker event");
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(TrackerEventEnvelope {
            event,
            timestamp: Utc::now(),
        });
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEventEnvelope> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(entity_id: &str) -> TrackerEvent {
        TrackerEvent::PersistFailed {
            entity_id: entity_id.into(),
            message: "offline".into(),
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(TrackerEvent::StatusChanged {
            entity_id: "p1".into(),
            from: "Not Started".into(),
            to: "In Progress".into(),
            progress: Some(50),
        });

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event.event_type(), "status.changed");
        match received.event {
            TrackerEvent::StatusChanged { to, progress, .. } => {
                assert_eq!(to, "In Progress");
                assert_eq!(progress, Some(50));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(failed("a1"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.event, failed("a1"));
        assert_eq!(e2.event, failed("a1"));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(failed("orphan"));
    }

    #[test]
    fn envelope_serializes_with_type_tag() {
        let envelope = TrackerEventEnvelope {
            event: TrackerEvent::FocusAdvanced {
                project_id: "p1".into(),
                from_asset_id: "a1".into(),
                to_asset_id: None,
            },
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&envelope).expect("serialization should succeed");
        assert_eq!(json["type"], "focus_advanced");
        assert_eq!(json["from_asset_id"], "a1");
        assert!(json["to_asset_id"].is_null());
        assert!(json["timestamp"].is_string());
    }
}
