//! Shared application state.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use emr_core::{Database, EventPublisher};

use crate::config::Config;
use crate::errors::{ApiError, ApiResult};

/// An event as delivered to stream subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    pub event: String,
    pub payload: Value,
}

/// Fans published events out to every live subscriber.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<PublishedEvent>,
}

impl BroadcastPublisher {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: &str, payload: Value) {
        // No subscribers is not an error.
        let receivers = self
            .tx
            .send(PublishedEvent {
                event: event.to_string(),
                payload,
            })
            .unwrap_or(0);
        tracing::debug!(event, receivers, "event published");
    }
}

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Database>>,
    events: BroadcastPublisher,
}

impl AppState {
    pub fn new(db: Database, event_buffer: usize) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            events: BroadcastPublisher::new(event_buffer),
        }
    }

    /// Open the configured store.
    pub fn open(config: &Config) -> ApiResult<Self> {
        let db = if config.is_in_memory() {
            Database::open_in_memory()?
        } else {
            Database::open(&config.database_path)?
        };
        tracing::info!(path = %config.database_path, "database opened");
        Ok(Self::new(db, config.event_buffer))
    }

    /// Lock the database for the duration of one request.
    pub fn db(&self) -> ApiResult<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| ApiError::Poisoned)
    }

    pub fn publisher(&self) -> &BroadcastPublisher {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }
}
