use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::workflow::{Workflow, WorkflowKind, WorkflowStatus};

/// Persistence port for workflow aggregates.
///
/// `save` must perform an atomic compare-and-set on the stored version and
/// fail with `VersionConflict` when the stored version differs from the
/// aggregate's; on success the returned view carries the incremented
/// version and refreshed audit stamps.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn save(&self, workflow: Workflow) -> Result<Workflow>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Workflow>>;

    async fn find_by_status(&self, status: WorkflowStatus) -> Result<Vec<Workflow>>;

    async fn find_by_kind(&self, kind: WorkflowKind) -> Result<Vec<Workflow>>;

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Vec<Workflow>>;

    /// Workflows the engine currently holds: executing, paused or
    /// compensating.
    async fn find_active(&self) -> Result<Vec<Workflow>>;

    /// Pending workflows, oldest first, bounded.
    async fn find_pending(&self, limit: usize) -> Result<Vec<Workflow>>;

    /// Failed workflows with retry budget remaining, bounded.
    async fn find_for_retry(&self, limit: usize) -> Result<Vec<Workflow>>;

    /// Pending workflows eligible for waveless admission (high priority or
    /// a waveless-capable kind), bounded.
    async fn find_for_waveless(&self, limit: usize) -> Result<Vec<Workflow>>;

    async fn find_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Workflow>>;

    async fn count_by_status(&self, status: WorkflowStatus) -> Result<u64>;

    async fn exists(&self, id: &str) -> Result<bool>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Idempotent admin path: force a status without touching the version.
    async fn update_status(&self, id: &str, status: WorkflowStatus) -> Result<()>;
}
