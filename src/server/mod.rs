//! Asynchronous evaluation server
//!
//! ```text
//! GET /api/v1/check ──▶ cached tags? ──yes──▶ 200 Evaluation
//!                            │ no
//!                            ▼
//!                  mark jobs/<id> queued ──▶ JobQueue ──▶ BackgroundWorker
//!                            │                                  │
//!                            ▼                                  ▼
//!                  202 Location: /api/v1/jobs/<id>    tags/…, evaluations/<id>
//! ```
//!
//! - [`routes`]: axum router and handlers
//! - [`worker`]: job queue and worker pool
//! - [`gc`]: periodic cache sweep

pub mod gc;
pub mod routes;
pub mod worker;

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::version::registry::Registry;
use crate::version::storer::Storer;
use worker::{BackgroundWorker, JobQueue};

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub storer: Arc<dyn Storer>,
    pub queue: JobQueue,
}

/// Serve until `shutdown` resolves, then let the workers drain the queue.
pub async fn run(
    listener: TcpListener,
    config: &Config,
    storer: Arc<dyn Storer>,
    registry: Arc<dyn Registry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let worker = Arc::new(BackgroundWorker::new(Arc::clone(&storer), registry));
    let (queue, receiver) = JobQueue::channel();
    let workers = worker::spawn_workers(worker, receiver, config.workers);
    let gc = gc::spawn_gc(Arc::clone(&storer), config.gc_interval());

    let state = AppState { storer, queue };

    info!(
        workers = config.workers,
        gc_interval_secs = config.gc_interval().as_secs(),
        "Listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped, waiting for queued jobs");
    gc.abort();
    for result in join_all(workers).await {
        if let Err(e) = result {
            warn!("Worker ended abnormally: {}", e);
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
