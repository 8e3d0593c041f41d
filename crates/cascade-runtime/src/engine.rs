use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cascade_core::{
    CascadeConfig, Clock, EventPublisher, LoadController, LoadTracker, LockManager, RemoteService,
    SystemClock, WorkflowRepository,
};

use crate::monitor::LoadMonitor;
use crate::scheduler::WavelessScheduler;
use crate::service::WorkflowExecutionService;
use crate::store::{MemoryEventBus, MemoryLockManager, MemoryRepository};

/// Builder wiring the engine's ports and configuration.
///
/// Ports default to the in-memory adapters, which makes a single-process
/// engine usable out of the box; production embeddings override them.
pub struct EngineBuilder {
    config: CascadeConfig,
    repository: Option<Arc<dyn WorkflowRepository>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    remote: Option<Arc<dyn RemoteService>>,
    locks: Option<Arc<dyn LockManager>>,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
    pub fn new(config: CascadeConfig) -> Self {
        Self {
            config,
            repository: None,
            publisher: None,
            remote: None,
            locks: None,
            clock: None,
        }
    }

    pub fn repository(mut self, repository: Arc<dyn WorkflowRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteService>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn locks(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Assemble the engine. The remote port has no in-memory default; an
    /// engine built without one can only run workflows driven through the
    /// external per-step entry points.
    pub fn build(self) -> Engine {
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let repository: Arc<dyn WorkflowRepository> = self
            .repository
            .unwrap_or_else(|| Arc::new(MemoryRepository::new(clock.clone())));
        let publisher: Arc<dyn EventPublisher> = self
            .publisher
            .unwrap_or_else(|| Arc::new(MemoryEventBus::default()));
        let locks: Arc<dyn LockManager> = self
            .locks
            .unwrap_or_else(|| Arc::new(MemoryLockManager::new(clock.clone())));
        let remote: Arc<dyn RemoteService> = self
            .remote
            .unwrap_or_else(|| Arc::new(UnroutedRemote));

        let service = Arc::new(WorkflowExecutionService::new(
            repository.clone(),
            publisher.clone(),
            remote,
            locks,
            clock.clone(),
            self.config.lock.clone(),
        ));

        let tracker = Arc::new(LoadTracker::new());
        let controller = LoadController::new(self.config.load.thresholds());

        let scheduler = Arc::new(WavelessScheduler::new(
            self.config.scheduler.clone(),
            service.clone(),
            repository.clone(),
            tracker.clone(),
            controller,
            clock.clone(),
            self.config.engine.service_id.clone(),
        ));

        let monitor = Arc::new(LoadMonitor::new(
            tracker.clone(),
            controller,
            publisher,
            repository,
            clock,
            self.config.engine.service_id.clone(),
            self.config.load.monitor_interval(),
            service.in_flight_handle(),
        ));

        Engine {
            config: self.config,
            service,
            scheduler,
            monitor,
            tracker,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }
}

/// A wired cascade engine: execution service plus its background loops.
pub struct Engine {
    config: CascadeConfig,
    service: Arc<WorkflowExecutionService>,
    scheduler: Arc<WavelessScheduler>,
    monitor: Arc<LoadMonitor>,
    tracker: Arc<LoadTracker>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn builder(config: CascadeConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<WorkflowExecutionService> {
        self.service.clone()
    }

    pub fn tracker(&self) -> Arc<LoadTracker> {
        self.tracker.clone()
    }

    /// Spawn the waveless scheduler and load monitor loops.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }

        let scheduler = self.scheduler.clone();
        let token = self.shutdown.clone();
        self.handles
            .push(tokio::spawn(async move { scheduler.run(token).await }));

        let monitor = self.monitor.clone();
        let token = self.shutdown.clone();
        self.handles
            .push(tokio::spawn(async move { monitor.run(token).await }));

        tracing::info!(service_id = %self.config.engine.service_id, "Engine started");
    }

    /// Stop the loops and drain in-flight step executions, bounded by the
    /// configured drain timeout.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();

        let drained = self.wait_for_drain().await;
        if !drained {
            tracing::warn!(
                in_flight = self.service.in_flight(),
                "Drain timeout reached with steps still in flight"
            );
        }

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background loop ended abnormally");
            }
        }

        tracing::info!("Engine shutdown complete");
    }

    async fn wait_for_drain(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.engine.drain_timeout();
        loop {
            if self.service.in_flight() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Placeholder remote port for engines without a configured transport.
struct UnroutedRemote;

#[async_trait::async_trait]
impl RemoteService for UnroutedRemote {
    async fn call(
        &self,
        service: &str,
        _operation: &str,
        _payload: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, cascade_core::RemoteCallError> {
        Err(cascade_core::RemoteCallError::Unavailable(format!(
            "no remote transport configured for '{}'",
            service
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_defaults() {
        let engine = Engine::builder(CascadeConfig::default()).build();
        assert_eq!(engine.config().engine.service_id, "cascade-engine");
        assert_eq!(engine.service().in_flight(), 0);
        assert!(engine.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut engine = Engine::builder(CascadeConfig::default()).build();
        engine.start();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_unrouted_remote_reports_unavailable() {
        let remote = UnroutedRemote;
        let err = remote
            .call("inventory-service", "reserve", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, cascade_core::RemoteCallError::Unavailable(_)));
    }
}
