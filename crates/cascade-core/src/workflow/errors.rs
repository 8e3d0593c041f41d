use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a workflow-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ServiceUnavailable,
    Timeout,
    BusinessRuleViolation,
    DataIntegrity,
    Network,
    PermissionDenied,
    ResourceNotFound,
    Internal,
    CompensationFailed,
}

impl ErrorKind {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::BusinessRuleViolation => "business_rule_violation",
            Self::DataIntegrity => "data_integrity",
            Self::Network => "network",
            Self::PermissionDenied => "permission_denied",
            Self::ResourceNotFound => "resource_not_found",
            Self::Internal => "internal",
            Self::CompensationFailed => "compensation_failed",
        }
    }

    /// Whether failures of this kind are retried by default.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable | Self::Timeout | Self::Network)
    }
}

/// A failure recorded against a workflow or one of its steps.
///
/// Domain failures are values, not panics: the saga coordinator routes them
/// into forward or backward recovery based on `recoverable` and `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Machine-readable error code from the failing service.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Service that produced the failure, if known.
    pub service: Option<String>,
    /// Step the failure occurred in, if any.
    pub step_id: Option<String>,
    /// When the failure occurred.
    pub occurred_at: DateTime<Utc>,
    /// Whether forward recovery (retry) may consume this failure.
    pub recoverable: bool,
}

impl WorkflowError {
    /// Create an error with the kind's default recoverability.
    pub fn new(
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            service: None,
            step_id: None,
            occurred_at,
            recoverable: kind.is_recoverable(),
        }
    }

    /// Create a recoverable timeout error.
    pub fn timeout(message: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self::new(ErrorKind::Timeout, "STEP_TIMEOUT", message, occurred_at)
    }

    /// Create a validation error (never retried, never compensated for).
    pub fn validation(message: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self::new(ErrorKind::Validation, "VALIDATION", message, occurred_at)
    }

    /// Attach the originating service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attach the originating step.
    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Override the default recoverability.
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Whether this failure obliges backward recovery of completed steps.
    pub fn requires_compensation(&self) -> bool {
        !self.recoverable && self.kind != ErrorKind::Validation
    }
}
