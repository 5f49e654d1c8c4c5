//! Server test utilities

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use fresh_container::config::Config;
use fresh_container::server::worker::{BackgroundWorker, JobQueue, spawn_workers};
use fresh_container::server::{self, AppState, routes};
use fresh_container::version::cache::Cache;
use fresh_container::version::registry::Registry;
use fresh_container::version::storer::Storer;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Create a file-backed cache in a temporary directory
pub fn create_test_cache() -> (TempDir, Arc<Cache>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let cache = Arc::new(Cache::new(&db_path, HOUR).unwrap());
    (temp_dir, cache)
}

/// Application state backed by `workers` running workers
pub fn spawn_state(storer: Arc<dyn Storer>, registry: Arc<dyn Registry>, workers: usize) -> AppState {
    let worker = Arc::new(BackgroundWorker::new(Arc::clone(&storer), registry));
    let (queue, receiver) = JobQueue::channel();
    spawn_workers(worker, receiver, workers);
    AppState { storer, queue }
}

/// Send a GET through the router without binding a socket
pub async fn get(state: &AppState, uri: &str) -> (StatusCode, HeaderMap, Value) {
    let response = routes::router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

/// Poll a job location through the router until it stops being pending
pub async fn wait_for_resolution(state: &AppState, job_location: &str) -> (StatusCode, HeaderMap) {
    for _ in 0..200 {
        let (status, headers, _) = get(state, job_location).await;
        if status != StatusCode::OK {
            return (status, headers);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never resolved", job_location);
}

/// A real server listening on an ephemeral port
pub struct TestServer {
    pub url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(storer: Arc<dyn Storer>, registry: Arc<dyn Registry>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (shutdown, signal) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let config = Config::default();
            server::run(listener, &config, storer, registry, async move {
                let _ = signal.await;
            })
            .await
        });

        Self {
            url,
            shutdown: Some(shutdown),
            handle,
        }
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}
