use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::workflow::{ErrorKind, WorkflowError};

/// Failure modes of a remote call, as surfaced by the transport adapter.
///
/// Timeouts, unavailability and transport faults are recoverable step
/// errors; validation rejections are not.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteCallError {
    #[error("call timed out after {0} ms")]
    Timeout(u64),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("request rejected: {0}")]
    Validation(String),
}

impl RemoteCallError {
    /// Whether the engine may retry this failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }

    /// Convert into a workflow error attributed to a service call.
    pub fn into_workflow_error(
        self,
        service: &str,
        occurred_at: DateTime<Utc>,
    ) -> WorkflowError {
        let (kind, code, message) = match &self {
            Self::Timeout(ms) => (
                ErrorKind::Timeout,
                "REMOTE_TIMEOUT".to_string(),
                format!("call to '{}' timed out after {} ms", service, ms),
            ),
            Self::Unavailable(detail) => (
                ErrorKind::ServiceUnavailable,
                "SERVICE_UNAVAILABLE".to_string(),
                format!("'{}' unavailable: {}", service, detail),
            ),
            Self::Remote { code, message } => (
                ErrorKind::Network,
                code.clone(),
                format!("'{}' failed: {}", service, message),
            ),
            Self::Validation(detail) => (
                ErrorKind::Validation,
                "VALIDATION".to_string(),
                format!("'{}' rejected request: {}", service, detail),
            ),
        };
        WorkflowError::new(kind, code, message, occurred_at).with_service(service)
    }
}

/// Synchronous-with-timeout RPC port to downstream services.
///
/// The adapter owns transport-level retries and circuit breaking; the
/// engine only interprets the outcome.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn call(
        &self,
        service: &str,
        operation: &str,
        payload: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, RemoteCallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(RemoteCallError::Timeout(5000).is_recoverable());
        assert!(RemoteCallError::Unavailable("503".into()).is_recoverable());
        assert!(RemoteCallError::Remote {
            code: "E42".into(),
            message: "boom".into()
        }
        .is_recoverable());
        assert!(!RemoteCallError::Validation("missing sku".into()).is_recoverable());
    }

    #[test]
    fn test_into_workflow_error() {
        let now = Utc::now();
        let err = RemoteCallError::Timeout(5000).into_workflow_error("inventory-service", now);
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.recoverable);
        assert_eq!(err.service.as_deref(), Some("inventory-service"));

        let err =
            RemoteCallError::Validation("bad".into()).into_workflow_error("inventory-service", now);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(!err.recoverable);
    }
}
