use color_eyre::{eyre::WrapErr, Result};
use dotenvy::dotenv;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};

use queue_manager::{
    create_queue_backend, logging::setup_logging, HandlerError, JobContext, JobProcessor,
    QueueConfig, QueueManager,
};

#[derive(Debug, Deserialize)]
struct GreetRequest {
    name: String,
}

fn processors() -> Vec<JobProcessor> {
    vec![JobProcessor::new("greet", |ctx: JobContext| async move {
        let request: GreetRequest = ctx.payload()?;
        ctx.update_progress(100);
        Ok::<_, HandlerError>(format!("Hello {}", request.name))
    })
    .group("app1")
    .on_active(|job| debug!("Job {} on {} is active", job.job_id, job.queue))
    .on_completed(|job, result| info!("Job {} completed: {}", job.job_id, result))
    .on_failed(|job, err| warn!("Job {} failed: {}", job.job_id, err))
    .on_stalled(|job| warn!("Job {} on {} stalled", job.job_id, job.queue))]
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Load environment variables from .env file
    dotenv().ok();
    setup_logging()?;

    let config = QueueConfig::from_env();
    info!(
        "Starting queue manager on {} backend ({})",
        config.backend,
        config.options.connection.display_target()
    );

    let backend = create_queue_backend(&config)
        .await
        .wrap_err("Failed to create queue backend")?;
    let mut manager = QueueManager::new(processors(), config.options.clone(), backend)?;

    manager.start_queues().await?;
    let group = std::env::var("WORKER_GROUP").ok().filter(|g| !g.is_empty());
    manager.start_workers(group.as_deref()).await?;

    if let Ok(job_id) = std::env::var("GREET_JOB_ID") {
        let name = std::env::var("GREET_NAME").unwrap_or_else(|_| "world".to_string());
        let handle = manager
            .add_job("greet", &job_id, serde_json::json!({ "name": name }))
            .await?;
        info!("Submitted job {} as task {}", handle.job_id, handle.task_id);
    }

    let mut sigint = signal(SignalKind::interrupt()).wrap_err("Failed to create SIGINT signal")?;
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to create SIGTERM signal")?;
    tokio::select! {
        _ = sigint.recv() => debug!("Received SIGINT."),
        _ = sigterm.recv() => debug!("Received SIGTERM."),
    };

    manager.shutdown().await?;
    info!("Queue manager stopped");
    Ok(())
}
