use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::ports::EventPublisher;
use crate::workflow::EventEnvelope;

/// Default topic used by `publish`.
pub const DEFAULT_TOPIC: &str = "workflow.events";

/// Publisher that records every envelope for later assertions.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, EventEnvelope)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published envelopes in publication order.
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Event type names in publication order.
    pub fn event_types(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.event_type.clone())
            .collect()
    }

    /// Envelopes published for one aggregate, in order.
    pub fn published_for(&self, aggregate_id: &str) -> Vec<EventEnvelope> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.aggregate_id == aggregate_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        self.publish_to(DEFAULT_TOPIC, envelope).await
    }

    async fn publish_to(&self, topic: &str, envelope: &EventEnvelope) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), envelope.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowEvent;
    use chrono::Utc;

    #[tokio::test]
    async fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        let now = Utc::now();

        for i in 0..3 {
            let envelope = EventEnvelope::new(
                "w1",
                i,
                now,
                WorkflowEvent::Retried {
                    workflow_id: "w1".into(),
                    retry_count: i as u32,
                    at: now,
                },
            );
            publisher.publish(&envelope).await.unwrap();
        }

        let versions: Vec<u64> = publisher.published().iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![0, 1, 2]);
        assert_eq!(publisher.published_for("w1").len(), 3);
        assert_eq!(publisher.published_for("other").len(), 0);
    }
}
