//! Append-only diagnostic log persisted under `eventLogs`.
//!
//! Every entry is mirrored to `tracing` at info level. The persisted copy is
//! what the popup shows; appends are serialized so concurrent event handlers
//! never drop each other's lines.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tabsync_protocol::keys;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::store::StoreClient;

#[derive(Clone)]
pub struct EventLog {
    store: StoreClient,
    capacity: usize,
    append_lock: Arc<Mutex<()>>,
}

impl EventLog {
    pub fn new(store: StoreClient, capacity: usize) -> Self {
        Self {
            store,
            capacity,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends a timestamped line. Failures are logged, never returned.
    pub async fn record(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "tabsync::event_log", "{}", message);
        if let Err(err) = self.append(&message).await {
            tracing::warn!(error = %err, "Failed to persist event log entry");
        }
    }

    async fn append(&self, message: &str) -> Result<()> {
        let _guard = self.append_lock.lock().await;
        let mut entries = self.entries().await?;
        entries.push(format!(
            "{} - {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message
        ));
        if entries.len() > self.capacity {
            let overflow = entries.len() - self.capacity;
            entries.drain(..overflow);
        }
        self.store.set(keys::EVENT_LOGS, &entries).await?;
        Ok(())
    }

    /// Oldest first.
    pub async fn entries(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .get::<Vec<String>>(keys::EVENT_LOGS)
            .await?
            .unwrap_or_default())
    }
}
