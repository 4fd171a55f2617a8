//! Queue manager scenarios against a live Redis.
use std::{
    env,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use queue_manager::{
    ConnectionConfig, HandlerError, JobContext, JobProcessor, QueueBackend, QueueBackendError,
    QueueBackendStorage, QueueConfig, QueueManager, QueueManagerError, QueueManagerOptions,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{sync::mpsc, time::timeout};
use uuid::Uuid;

#[derive(Deserialize)]
struct Greeting {
    name: String,
}

fn options() -> QueueManagerOptions {
    let url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    // A fresh namespace keeps runs from seeing each other's jobs
    QueueManagerOptions::default()
        .with_namespace(format!("qm-test-{}", Uuid::new_v4()))
        .with_connection(ConnectionConfig::from_url(url))
}

async fn backend(options: &QueueManagerOptions) -> QueueBackendStorage {
    QueueBackendStorage::new(&QueueConfig {
        backend: "redis".to_string(),
        options: options.clone(),
    })
    .await
    .expect("redis must be reachable for integration tests")
}

fn greet(
    group: &str,
    calls: Arc<AtomicUsize>,
    completed: mpsc::UnboundedSender<Value>,
) -> JobProcessor {
    JobProcessor::new("greet", move |ctx: JobContext| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let greeting: Greeting = ctx.payload()?;
            Ok::<_, HandlerError>(format!("Hello {}", greeting.name))
        }
    })
    .group(group)
    .on_completed(move |_, result| {
        let _ = completed.send(result.clone());
    })
}

#[tokio::test]
async fn test_redis_job_is_processed_by_group_worker() {
    let options = options();
    let backend = backend(&options).await;
    assert_eq!(backend.backend_type(), "redis");

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut manager =
        QueueManager::new(vec![greet("app1", calls.clone(), tx)], options, backend).unwrap();

    manager.start_queues().await.unwrap();
    manager.start_workers(Some("app1")).await.unwrap();
    let handle = manager
        .add_job("greet", "j1", json!({"name": "Ann"}))
        .await
        .unwrap();
    assert_eq!(handle.job_id, "j1");
    assert!(!handle.task_id.is_empty());

    let result = timeout(Duration::from_secs(10), rx.recv()).await.unwrap();
    assert_eq!(result, Some(json!("Hello Ann")));

    manager.shutdown().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_redis_job_waits_for_matching_worker() {
    let options = options();
    let backend = backend(&options).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut manager =
        QueueManager::new(vec![greet("app2", calls.clone(), tx)], options, backend).unwrap();

    manager.start_queues().await.unwrap();
    manager.start_workers(Some("app1")).await.unwrap();
    manager
        .add_job("greet", "j1", json!({"name": "Ann"}))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(manager.get_worker("greet").is_none());

    manager.start_workers(Some("app2")).await.unwrap();
    let result = timeout(Duration::from_secs(10), rx.recv()).await.unwrap();
    assert_eq!(result, Some(json!("Hello Ann")));

    manager.shutdown().await.unwrap();
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_redis_unknown_queue_is_not_found() {
    let options = options();
    let backend = backend(&options).await;
    let mut manager = QueueManager::new(
        vec![JobProcessor::new("greet", |_ctx| async {
            Ok::<_, HandlerError>(())
        })],
        options,
        backend,
    )
    .unwrap();
    manager.start_queues().await.unwrap();

    let result = manager.add_job("unregistered-name", "j1", json!({})).await;

    assert!(matches!(result, Err(QueueManagerError::QueueNotFound(_))));
    manager.shutdown().await.unwrap();

    // The shared connection is gone once the manager has shut down
    assert!(matches!(
        manager.backend().create_queue("late").await,
        Err(QueueBackendError::QueueClosed(_))
    ));
}
