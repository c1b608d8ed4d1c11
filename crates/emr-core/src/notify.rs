//! Event publication.
//!
//! Core code announces state changes through an [`EventPublisher`]; the
//! transport (SSE, sockets, nothing at all) is the host's choice. Events are
//! published after the writes they describe have committed.

use std::sync::Mutex;

use serde_json::Value;

pub const PHARMACY_QUEUE_UPDATED: &str = "pharmacy_queue.updated";
pub const VISIT_UPDATED: &str = "visit.updated";

/// Fire-and-forget sink for domain events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &str, payload: Value);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: &str, _payload: Value) {}
}

/// Keeps published events in memory, in publication order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Names of the events published so far.
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.to_string(), payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        publisher.publish(VISIT_UPDATED, json!({"id": "v1"}));
        publisher.publish(PHARMACY_QUEUE_UPDATED, json!({"id": "q1"}));

        assert_eq!(publisher.names(), vec![VISIT_UPDATED, PHARMACY_QUEUE_UPDATED]);
        assert_eq!(publisher.events()[0].1["id"], "v1");
    }

    #[test]
    fn test_noop_publisher_is_object_safe() {
        let publisher: &dyn EventPublisher = &NoopPublisher;
        publisher.publish(VISIT_UPDATED, Value::Null);
    }
}
