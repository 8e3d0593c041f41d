use async_trait::async_trait;

use crate::error::Result;
use crate::workflow::EventEnvelope;

/// Outbound port for domain events.
///
/// Delivery is at-least-once: consumers deduplicate on the envelope's
/// `event_id`. Publication order within one workflow follows emission
/// order because the execution service publishes the drained outbox
/// sequentially after each commit.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish to the default topic.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()>;

    /// Publish to a named topic.
    async fn publish_to(&self, topic: &str, envelope: &EventEnvelope) -> Result<()>;
}
