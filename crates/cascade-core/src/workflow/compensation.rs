use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// How a completed step is undone during backward recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStrategy {
    /// Invoke the inverse operation on the same service.
    ReverseOperation,
    /// Delete the resource the step created.
    DeleteCreated,
    /// Restore state captured before the step ran.
    RestoreState,
    /// Invoke a bespoke compensation operation.
    Custom,
}

impl CompensationStrategy {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReverseOperation => "reverse_operation",
            Self::DeleteCreated => "delete_created",
            Self::RestoreState => "restore_state",
            Self::Custom => "custom",
        }
    }
}

/// Descriptor of the compensating action attached to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationSpec {
    /// Undo strategy.
    pub strategy: CompensationStrategy,
    /// Target service for the compensating call.
    pub service: String,
    /// Operation name on the target service.
    pub operation: String,
    /// Mapping from compensation parameter name to a key in the step output.
    #[serde(default)]
    pub parameter_mapping: HashMap<String, String>,
    /// Whether the compensating operation tolerates duplicate invocation.
    #[serde(default)]
    pub idempotent: bool,
    /// Retry bound for the compensating call itself.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Timeout for each compensating call.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl CompensationSpec {
    /// Compensation that calls the inverse operation on a service.
    pub fn reverse_of(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            strategy: CompensationStrategy::ReverseOperation,
            service: service.into(),
            operation: operation.into(),
            parameter_mapping: HashMap::new(),
            idempotent: false,
            max_retries: default_max_retries(),
            timeout: default_timeout(),
        }
    }

    /// Compensation that deletes whatever the step created.
    pub fn delete_created(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            strategy: CompensationStrategy::DeleteCreated,
            ..Self::reverse_of(service, operation)
        }
    }

    /// Map a compensation parameter from a step output key.
    pub fn map_parameter(mut self, parameter: impl Into<String>, from: impl Into<String>) -> Self {
        self.parameter_mapping.insert(parameter.into(), from.into());
        self
    }

    /// Mark the compensating operation as idempotent.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Override the compensation retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
