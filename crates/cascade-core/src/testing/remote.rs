use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{RemoteCallError, RemoteService};

type CallKey = (String, String);
type ScriptedResult = std::result::Result<serde_json::Value, RemoteCallError>;

/// A remote call observed by the double.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub service: String,
    pub operation: String,
    pub payload: serde_json::Value,
}

/// Remote service double that replays programmed outcomes.
///
/// Outcomes queue per (service, operation) and are consumed in order; once
/// a queue runs dry the call falls back to an empty success. Every
/// invocation is recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    scripts: Mutex<HashMap<CallKey, VecDeque<ScriptedResult>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one outcome for the given service operation.
    pub fn script(
        &self,
        service: impl Into<String>,
        operation: impl Into<String>,
        result: ScriptedResult,
    ) {
        self.scripts
            .lock()
            .unwrap()
            .entry((service.into(), operation.into()))
            .or_default()
            .push_back(result);
    }

    /// Queue `n` identical failures for the given service operation.
    pub fn script_failures(
        &self,
        service: impl Into<String> + Clone,
        operation: impl Into<String> + Clone,
        error: RemoteCallError,
        n: usize,
    ) {
        for _ in 0..n {
            self.script(service.clone(), operation.clone(), Err(error.clone()));
        }
    }

    /// All calls observed, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls observed against one service operation.
    pub fn call_count(&self, service: &str, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.service == service && c.operation == operation)
            .count()
    }
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn call(
        &self,
        service: &str,
        operation: &str,
        payload: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, RemoteCallError> {
        self.calls.lock().unwrap().push(RecordedCall {
            service: service.to_string(),
            operation: operation.to_string(),
            payload,
        });

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&(service.to_string(), operation.to_string()))
            .and_then(|queue| queue.pop_front());

        scripted.unwrap_or_else(|| Ok(serde_json::json!({})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_outcomes_consumed_in_order() {
        let remote = ScriptedRemote::new();
        remote.script(
            "inventory-service",
            "reserve",
            Err(RemoteCallError::Timeout(5000)),
        );
        remote.script(
            "inventory-service",
            "reserve",
            Ok(serde_json::json!({"reservation_id": "r-1"})),
        );

        let first = remote
            .call("inventory-service", "reserve", serde_json::json!({}))
            .await;
        assert_eq!(first, Err(RemoteCallError::Timeout(5000)));

        let second = remote
            .call("inventory-service", "reserve", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(second["reservation_id"], "r-1");

        // Script exhausted: defaults to empty success.
        let third = remote
            .call("inventory-service", "reserve", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(third, serde_json::json!({}));

        assert_eq!(remote.call_count("inventory-service", "reserve"), 3);
    }
}
