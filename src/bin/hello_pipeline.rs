//! # Hello Pipeline
//!
//! Submits a few demo jobs, runs workers against them until every job is terminal,
//! and prints each job's result.
//!
//! ```bash
//! GEOFLOW_ENV=development cargo run --bin hello_pipeline
//! ```

use anyhow::{Context, Result};
use geoflow_core::config::{ConfigManager, GeoflowConfig};
use geoflow_core::logging::init_structured_logging_with;
use geoflow_core::orchestration::OrchestrationSystem;
use geoflow_core::worker::{TaskHandlerRegistry, TaskWorker};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match ConfigManager::load() {
        Ok(manager) => manager.config().clone(),
        Err(e) => {
            eprintln!("Using default configuration: {e}");
            GeoflowConfig::default()
        }
    };
    init_structured_logging_with(&config.logging);

    let system = OrchestrationSystem::from_config(config)
        .await
        .context("failed to start orchestration system")?;

    let requests = [
        json!({"job_type": "hello_world", "system": true, "n": 5, "fail_indices": [3]}),
        json!({"job_type": "hello_world_sequential", "system": true, "n": 3, "message": "Hi"}),
        json!({
            "job_type": "catalog_files",
            "dataset_id": "landsat",
            "resource_id": "scenes",
            "version_id": "v1",
            "container": "bronze",
            "files": ["scene_001.tif", "roads.parquet", "notes.txt"],
            "collection_id": "landsat-c2",
        }),
    ];

    let mut job_ids = Vec::new();
    for request in &requests {
        let outcome = system.job_initializer.process_job(request).await?;
        info!(
            job_id = %outcome.job_id,
            tasks = outcome.task_count,
            replayed = outcome.replayed,
            "Submitted job"
        );
        job_ids.push(outcome.job_id);
    }

    let handlers = Arc::new(TaskHandlerRegistry::with_default_handlers());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();
    for n in 0..system.config.worker.concurrency {
        let worker = TaskWorker::for_system(format!("worker-{n}"), &system, handlers.clone());
        let shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { worker.run(shutdown).await }));
    }

    loop {
        let mut pending = 0;
        for job_id in &job_ids {
            if !system.job_initializer.get_job(job_id).await?.status.is_terminal() {
                pending += 1;
            }
        }
        if pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown_tx.send(true).ok();
    for worker in workers {
        match worker.await {
            Ok(Ok(summary)) => info!(completed = summary.completed, failed = summary.failed, "Worker finished"),
            Ok(Err(e)) => warn!(error = %e, "Worker stopped with error"),
            Err(e) => warn!(error = %e, "Worker task panicked"),
        }
    }

    for job_id in &job_ids {
        let job = system.job_initializer.get_job(job_id).await?;
        println!("{} {} -> {}", job.job_type, &job.job_id[..12], job.status);
        if let Some(result) = &job.result_data {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }

    Ok(())
}
