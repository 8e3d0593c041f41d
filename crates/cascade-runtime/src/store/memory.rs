use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use cascade_core::workflow::{
    EventEnvelope, Workflow, WorkflowDocument, WorkflowKind, WorkflowStatus,
};
use cascade_core::{CascadeError, Clock, EventPublisher, LockManager, Result, WorkflowRepository};

/// In-memory workflow repository with an atomic version check.
pub struct MemoryRepository {
    clock: Arc<dyn Clock>,
    documents: Mutex<HashMap<String, WorkflowDocument>>,
}

impl MemoryRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn all_matching<F>(&self, predicate: F) -> Vec<Workflow>
    where
        F: Fn(&WorkflowDocument) -> bool,
    {
        let mut matched: Vec<WorkflowDocument> = self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|doc| predicate(doc))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched.into_iter().map(Workflow::from_document).collect()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryRepository {
    async fn save(&self, workflow: Workflow) -> Result<Workflow> {
        let mut doc = workflow.to_document();
        let mut documents = self.documents.lock().unwrap();

        if let Some(stored) = documents.get(&doc.id) {
            if stored.version != doc.version {
                return Err(CascadeError::VersionConflict {
                    expected: doc.version,
                    stored: stored.version,
                });
            }
        }

        doc.version += 1;
        doc.updated_at = self.clock.now();
        documents.insert(doc.id.clone(), doc.clone());
        Ok(Workflow::from_document(doc))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .map(Workflow::from_document))
    }

    async fn find_by_status(&self, status: WorkflowStatus) -> Result<Vec<Workflow>> {
        Ok(self.all_matching(|doc| doc.status == status))
    }

    async fn find_by_kind(&self, kind: WorkflowKind) -> Result<Vec<Workflow>> {
        Ok(self.all_matching(|doc| doc.kind == kind))
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Vec<Workflow>> {
        Ok(self.all_matching(|doc| doc.correlation_id.as_deref() == Some(correlation_id)))
    }

    async fn find_active(&self) -> Result<Vec<Workflow>> {
        Ok(self.all_matching(|doc| doc.status.is_active()))
    }

    async fn find_pending(&self, limit: usize) -> Result<Vec<Workflow>> {
        let mut pending = self.all_matching(|doc| doc.status == WorkflowStatus::Pending);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn find_for_retry(&self, limit: usize) -> Result<Vec<Workflow>> {
        let mut retryable = self.all_matching(|doc| {
            doc.status == WorkflowStatus::Failed && doc.retry_count < doc.max_retries
        });
        retryable.truncate(limit);
        Ok(retryable)
    }

    async fn find_for_waveless(&self, limit: usize) -> Result<Vec<Workflow>> {
        let mut eligible = self.all_matching(|doc| {
            doc.status == WorkflowStatus::Pending
                && (doc.priority == cascade_core::Priority::High || doc.kind.supports_waveless())
        });
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn find_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Workflow>> {
        Ok(self.all_matching(|doc| doc.created_at >= from && doc.created_at <= to))
    }

    async fn count_by_status(&self, status: WorkflowStatus) -> Result<u64> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|doc| doc.status == status)
            .count() as u64)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.documents.lock().unwrap().contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.documents.lock().unwrap().remove(id);
        Ok(())
    }

    async fn update_status(&self, id: &str, status: WorkflowStatus) -> Result<()> {
        let mut documents = self.documents.lock().unwrap();
        match documents.get_mut(id) {
            Some(doc) => {
                doc.status = status;
                doc.updated_at = self.clock.now();
                Ok(())
            }
            None => Err(CascadeError::NotFound(format!("workflow '{}'", id))),
        }
    }
}

/// In-memory TTL lock manager keyed by workflow id.
///
/// Leases expire through the injected clock, mirroring the cache-with-TTL
/// lock store the production adapter wraps.
pub struct MemoryLockManager {
    clock: Arc<dyn Clock>,
    leases: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryLockManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            leases: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| CascadeError::Internal(format!("lock ttl out of range: {}", e)))?;
        let mut leases = self.leases.lock().unwrap();
        match leases.get(key) {
            Some(lease) if *lease > now => Ok(false),
            _ => {
                leases.insert(key.to_string(), expires);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.leases.lock().unwrap().remove(key);
        Ok(())
    }

    async fn extend(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| CascadeError::Internal(format!("lock ttl out of range: {}", e)))?;
        let mut leases = self.leases.lock().unwrap();
        match leases.get_mut(key) {
            Some(lease) if *lease > now => {
                *lease = expires;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_held(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .leases
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|lease| *lease > now))
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .leases
            .lock()
            .unwrap()
            .get(key)
            .and_then(|lease| (*lease - now).to_std().ok()))
    }
}

/// Default topic events land on.
pub const EVENTS_TOPIC: &str = "workflow.events";

/// In-memory event bus: keeps an ordered log and fans out to live
/// subscribers over a broadcast channel.
pub struct MemoryEventBus {
    log: Mutex<Vec<(String, EventEnvelope)>>,
    sender: broadcast::Sender<EventEnvelope>,
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            log: Mutex::new(Vec::new()),
            sender,
        }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.log.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Event type names in publication order.
    pub fn event_types(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.event_type.clone())
            .collect()
    }

    /// Envelopes published for one aggregate, in order.
    pub fn published_for(&self, aggregate_id: &str) -> Vec<EventEnvelope> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.aggregate_id == aggregate_id)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        self.publish_to(EVENTS_TOPIC, envelope).await
    }

    async fn publish_to(&self, topic: &str, envelope: &EventEnvelope) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((topic.to_string(), envelope.clone()));
        // No live subscribers is fine; the log is the source of truth.
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }
}
