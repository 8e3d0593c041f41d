use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Workflow execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow is created but not started.
    Pending,
    /// Workflow is actively executing steps.
    Executing,
    /// Workflow is paused by an operator.
    Paused,
    /// Workflow completed successfully.
    Completed,
    /// Workflow failed; retry or compensation may follow.
    Failed,
    /// Workflow is running compensation in reverse step order.
    Compensating,
    /// Workflow compensation finished (fully or partially).
    Compensated,
    /// Workflow was cancelled.
    Cancelled,
}

impl WorkflowStatus {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Compensating => "compensating",
            Self::Compensated => "compensated",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if the workflow can make no further progress.
    ///
    /// Failed counts as terminal for admission and cancellation; the
    /// explicit retry and compensate transitions may still leave it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Compensated | Self::Cancelled | Self::Failed
        )
    }

    /// Check if the workflow is actively held by the engine.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Executing | Self::Paused | Self::Compensating)
    }

    /// Check whether a transition to `next` is legal.
    ///
    /// Cancellation is handled separately by the aggregate: it is allowed
    /// from any non-terminal state.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Pending, Executing)
                | (Executing, Completed)
                | (Executing, Paused)
                | (Executing, Failed)
                | (Executing, Cancelled)
                | (Paused, Executing)
                | (Paused, Cancelled)
                | (Failed, Executing)
                | (Failed, Compensating)
                | (Compensating, Compensated)
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "executing" => Ok(Self::Executing),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "compensating" => Ok(Self::Compensating),
            "compensated" => Ok(Self::Compensated),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown workflow status '{}'", other)),
        }
    }
}
