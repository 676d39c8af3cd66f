//! # Orchestration Bootstrap
//!
//! Wires store, queue, controller registry and the orchestration services from a
//! [`GeoflowConfig`]. Everything is passed by `Arc`; there is no global state.

use crate::config::{ConfigurationError, GeoflowConfig, QueueBackend, StoreBackend};
use crate::error::Result;
use crate::messaging::{InMemoryTaskQueue, TaskQueue};
use crate::orchestration::job_finalizer::JobFinalizer;
use crate::orchestration::job_initializer::JobInitializer;
use crate::orchestration::task_enqueuer::TaskEnqueuer;
use crate::orchestration::task_manager::TaskManager;
use crate::registry::ControllerRegistry;
use crate::store::{InMemoryJobStore, JobStore};
use std::sync::Arc;
use tracing::info;

/// A fully wired orchestration core
#[derive(Debug, Clone)]
pub struct OrchestrationSystem {
    pub config: GeoflowConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub registry: Arc<ControllerRegistry>,
    pub task_manager: TaskManager,
    pub job_initializer: JobInitializer,
}

impl OrchestrationSystem {
    /// In-memory store and queue, ignoring the configured backends
    pub async fn in_memory(config: GeoflowConfig) -> Result<Self> {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
        let registry = Arc::new(ControllerRegistry::with_default_controllers());
        Self::assemble(config, store, queue, registry).await
    }

    /// Build the backends named in the configuration
    pub async fn from_config(config: GeoflowConfig) -> Result<Self> {
        config.validate()?;
        let (store, queue) = Self::backends(&config).await?;
        let registry = Arc::new(ControllerRegistry::with_default_controllers());
        Self::assemble(config, store, queue, registry).await
    }

    /// Wire the services over caller-provided components; creates the task queue
    pub async fn assemble(
        config: GeoflowConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        registry: Arc<ControllerRegistry>,
    ) -> Result<Self> {
        queue.create_queue(&config.queue.tasks_queue).await?;

        let enqueuer = TaskEnqueuer::new(store.clone(), queue.clone(), config.queue.tasks_queue.clone());
        let finalizer = JobFinalizer::new(store.clone(), registry.clone(), &config.orchestration);
        let task_manager = TaskManager::new(store.clone(), registry.clone(), enqueuer.clone(), finalizer);
        let job_initializer = JobInitializer::new(
            store.clone(),
            registry.clone(),
            enqueuer,
            task_manager.clone(),
            &config.orchestration,
        );

        info!(
            queue = %config.queue.tasks_queue,
            operations = ?registry.operation_types(),
            "Orchestration system ready"
        );

        Ok(Self {
            config,
            store,
            queue,
            registry,
            task_manager,
            job_initializer,
        })
    }

    #[cfg(feature = "postgres")]
    async fn backends(config: &GeoflowConfig) -> Result<(Arc<dyn JobStore>, Arc<dyn TaskQueue>)> {
        use crate::messaging::PgmqTaskQueue;
        use crate::store::PgJobStore;

        let needs_database =
            config.store.backend == StoreBackend::Postgres || config.queue.backend == QueueBackend::Pgmq;
        let pg_store = if needs_database {
            let url = config.store.resolved_database_url().ok_or_else(|| {
                ConfigurationError::missing_required_field("store.database_url", "postgres backends")
            })?;
            let pg_store = PgJobStore::connect(&url, config.store.max_connections).await?;
            if config.store.run_migrations && config.store.backend == StoreBackend::Postgres {
                pg_store.migrate().await?;
            }
            Some(pg_store)
        } else {
            None
        };

        let store: Arc<dyn JobStore> = match (&config.store.backend, &pg_store) {
            (StoreBackend::Postgres, Some(pg_store)) => Arc::new(pg_store.clone()),
            _ => Arc::new(InMemoryJobStore::new()),
        };
        let queue: Arc<dyn TaskQueue> = match (&config.queue.backend, &pg_store) {
            (QueueBackend::Pgmq, Some(pg_store)) => {
                Arc::new(PgmqTaskQueue::new_with_pool(pg_store.pool().clone()))
            }
            _ => Arc::new(InMemoryTaskQueue::new()),
        };
        Ok((store, queue))
    }

    #[cfg(not(feature = "postgres"))]
    async fn backends(config: &GeoflowConfig) -> Result<(Arc<dyn JobStore>, Arc<dyn TaskQueue>)> {
        if config.store.backend == StoreBackend::Postgres || config.queue.backend == QueueBackend::Pgmq {
            return Err(ConfigurationError::invalid_value(
                "store.backend",
                "postgres",
                "built without the postgres feature",
            )
            .into());
        }
        Ok((Arc::new(InMemoryJobStore::new()), Arc::new(InMemoryTaskQueue::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_in_memory_system_creates_queue() {
        let system = assert_ok!(OrchestrationSystem::in_memory(GeoflowConfig::default()).await);
        assert_eq!(
            assert_ok!(system.queue.depth(&system.config.queue.tasks_queue).await),
            0
        );
        assert!(system.registry.contains("hello_world"));
    }

    #[tokio::test]
    async fn test_in_memory_system_ignores_configured_backends() {
        let mut config = GeoflowConfig::default();
        config.store.backend = StoreBackend::Postgres;
        config.queue.backend = QueueBackend::Pgmq;
        let system = assert_ok!(OrchestrationSystem::in_memory(config).await);
        assert_err!(system.job_initializer.get_job("missing").await);
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_config() {
        let config = GeoflowConfig {
            queue: QueueConfig {
                tasks_queue: "  ".to_string(),
                ..QueueConfig::default()
            },
            ..GeoflowConfig::default()
        };
        assert_err!(OrchestrationSystem::from_config(config).await);
    }
}
