use async_trait::async_trait;

use crate::models::ChangeEvent;

/// Outbound membership-change notifications. Publishing happens after the
/// graph mutation commits; a lost event never rolls the mutation back.
#[async_trait]
pub trait ChangeEventPublisher: Send + Sync {
    async fn publish(&self, events: &[ChangeEvent]) -> Result<(), anyhow::Error>;
}

/// Default publisher: one structured log line per event.
pub struct LoggingEventPublisher;

#[async_trait]
impl ChangeEventPublisher for LoggingEventPublisher {
    async fn publish(&self, events: &[ChangeEvent]) -> Result<(), anyhow::Error> {
        for event in events {
            let payload = serde_json::to_string(event)
                .map_err(|e| anyhow::anyhow!("Failed to serialize change event: {}", e))?;
            tracing::info!(event_id = %event.event_id, kind = ?event.kind, payload = %payload, "Publishing change event");
        }
        Ok(())
    }
}

/// Captures published events for assertions.
pub struct RecordingEventPublisher {
    pub events: std::sync::Mutex<Vec<ChangeEvent>>,
}

impl Default for RecordingEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChangeEventPublisher for RecordingEventPublisher {
    async fn publish(&self, events: &[ChangeEvent]) -> Result<(), anyhow::Error> {
        self.events
            .lock()
            .map_err(|e| anyhow::anyhow!("Recording publisher mutex poisoned: {}", e))?
            .extend_from_slice(events);
        Ok(())
    }
}
