//! In-process job queue and the workers draining it

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{CheckError, Result};
use crate::image::{Image, tag_version, tag_versions};
use crate::version::constraint::RangeConstraint;
use crate::version::evaluation::{
    CheckRequest, Evaluation, EvaluationFailure, StoredEvaluation, build_evaluation,
};
use crate::version::registry::Registry;
use crate::version::storer::Storer;

/// One "fetch tags and evaluate" unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub request: CheckRequest,
}

/// Submitting side of the queue, cheap to clone into request handlers
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    /// Create a queue and the receiver its workers will share
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Allocate a job id, mark it queued, then hand the job to the workers.
    ///
    /// The marker is written first so a poll racing the worker never sees
    /// an unknown id.
    pub fn add_job(&self, storer: &dyn Storer, request: CheckRequest) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        storer.mark_job_queued(&id)?;

        self.sender
            .send(Job {
                id: id.clone(),
                request,
            })
            .map_err(|_| CheckError::QueueClosed)?;

        debug!(id = %id, "Job queued");
        Ok(id)
    }
}

pub struct BackgroundWorker {
    storer: Arc<dyn Storer>,
    registry: Arc<dyn Registry>,
}

impl BackgroundWorker {
    pub fn new(storer: Arc<dyn Storer>, registry: Arc<dyn Registry>) -> Self {
        Self { storer, registry }
    }

    /// Resolve a job and persist its outcome. Never fails: errors become a
    /// stored failure so pollers always reach a terminal state.
    pub async fn process_job(&self, job: &Job) {
        info!(id = %job.id, image = %job.request.image, "Processing job");

        let stored = match self.evaluate(&job.request).await {
            Ok(evaluation) => StoredEvaluation::Success(evaluation),
            Err(e) => {
                error!(id = %job.id, image = %job.request.image, "Evaluation failed: {}", e);
                StoredEvaluation::Failure(EvaluationFailure {
                    error: e.to_string(),
                    status: e.status_code(),
                })
            }
        };

        if let Err(e) = self.storer.set_evaluation(&job.id, &stored) {
            error!(id = %job.id, "Cannot store evaluation: {}", e);
        }
    }

    async fn evaluate(&self, request: &CheckRequest) -> Result<Evaluation> {
        let image = Image::parse(&request.image, &request.tag_prefix)?;
        tag_version(&image)?;
        let range = RangeConstraint::parse(&request.constraint)?;

        let tags = self.registry.fetch_tags(&image).await?;
        let candidates = tag_versions(&image, &tags, true)?;

        let normalized: Vec<String> = candidates.iter().map(|v| v.to_string()).collect();
        self.storer.set_tags(&image, &normalized)?;

        Ok(build_evaluation(&image, &range, &candidates)?)
    }
}

/// Start `count` workers sharing one receiver. They stop once every
/// [`JobQueue`] handle is dropped and the queue is drained.
pub fn spawn_workers(
    worker: Arc<BackgroundWorker>,
    receiver: mpsc::UnboundedReceiver<Job>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));

    (0..count.max(1))
        .map(|index| {
            let worker = Arc::clone(&worker);
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move {
                loop {
                    let job = receiver.lock().await.recv().await;
                    match job {
                        Some(job) => worker.process_job(&job).await,
                        None => break,
                    }
                }
                debug!("Worker {} stopped", index);
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::cache::Cache;
    use crate::version::error::RegistryError;
    use crate::version::registry::MockRegistry;
    use crate::version::storer::MockStorer;
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn job(image: &str, constraint: &str, prefix: &str) -> Job {
        Job {
            id: "job-1".to_string(),
            request: CheckRequest::new(image, constraint, prefix),
        }
    }

    #[tokio::test]
    async fn process_job_stores_evaluation_and_normalized_tags() {
        let storer = Arc::new(Cache::in_memory(HOUR).unwrap());
        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_tags()
            .times(1)
            .returning(|_| Ok(tags(&["alpine-1.4.0", "alpine-1.5.6", "latest", "1.9.0"])));

        let worker = BackgroundWorker::new(storer.clone(), Arc::new(registry));
        worker
            .process_job(&job("myorg/app:alpine-1.4.0", ">= 1.4.0 < 2.0.0", "alpine-"))
            .await;

        let Some(StoredEvaluation::Success(evaluation)) = storer.get_evaluation("job-1").unwrap()
        else {
            panic!("expected a successful evaluation");
        };
        assert_eq!(evaluation.next_version, "alpine-1.5.6");

        let image = Image::parse("myorg/app:alpine-1.4.0", "alpine-").unwrap();
        assert_eq!(
            storer.get_tags(&image).unwrap(),
            Some(tags(&["1.4.0", "1.5.6"]))
        );
    }

    #[tokio::test]
    async fn process_job_stores_registry_failure_as_bad_gateway() {
        let storer = Arc::new(Cache::in_memory(HOUR).unwrap());
        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_tags()
            .returning(|_| Err(RegistryError::RateLimited { retry_after_secs: None }));

        let worker = BackgroundWorker::new(storer.clone(), Arc::new(registry));
        worker
            .process_job(&job("influxdb:1.5.0", ">= 1.5.0", ""))
            .await;

        let Some(StoredEvaluation::Failure(failure)) = storer.get_evaluation("job-1").unwrap()
        else {
            panic!("expected a failed evaluation");
        };
        assert_eq!(failure.status, 502);
        assert!(failure.error.contains("Rate limited"));
    }

    #[tokio::test]
    async fn process_job_stores_cache_failure_as_internal_error() {
        let mut storer = MockStorer::new();
        storer
            .expect_set_tags()
            .returning(|_, _| Err(crate::version::error::CacheError::LockPoisoned));
        storer
            .expect_set_evaluation()
            .withf(|id, stored| {
                id.to_string() == "job-1"
                    && matches!(stored, StoredEvaluation::Failure(f) if f.status == 500)
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_tags()
            .returning(|_| Ok(tags(&["1.5.0"])));

        let worker = BackgroundWorker::new(Arc::new(storer), Arc::new(registry));
        worker
            .process_job(&job("influxdb:1.5.0", ">= 1.5.0", ""))
            .await;
    }

    #[tokio::test]
    async fn add_job_marks_job_queued_before_sending() {
        let storer = Cache::in_memory(HOUR).unwrap();
        let (queue, mut receiver) = JobQueue::channel();

        let request = CheckRequest::new("influxdb:1.5.0", ">= 1.5.0", "");
        let id = queue.add_job(&storer, request.clone()).unwrap();

        assert!(storer.is_job_queued(&id).unwrap());
        assert_eq!(receiver.recv().await, Some(Job { id, request }));
    }

    #[tokio::test]
    async fn add_job_fails_when_queue_is_closed() {
        let storer = Cache::in_memory(HOUR).unwrap();
        let (queue, receiver) = JobQueue::channel();
        drop(receiver);

        let result = queue.add_job(&storer, CheckRequest::new("influxdb:1.5.0", ">= 1.5.0", ""));

        assert!(matches!(result, Err(CheckError::QueueClosed)));
    }

    #[tokio::test]
    async fn workers_process_every_job_and_stop_when_queue_is_dropped() {
        let storer = Arc::new(Cache::in_memory(HOUR).unwrap());
        let mut registry = MockRegistry::new();
        registry
            .expect_fetch_tags()
            .times(3)
            .returning(|_| Ok(tags(&["1.5.0", "1.5.2"])));
        let worker = Arc::new(BackgroundWorker::new(storer.clone(), Arc::new(registry)));

        let (queue, receiver) = JobQueue::channel();
        let handles = spawn_workers(worker, receiver, 2);

        let ids: Vec<String> = (0..3)
            .map(|_| {
                queue
                    .add_job(
                        storer.as_ref(),
                        CheckRequest::new("influxdb:1.5.0", ">= 1.5.0 < 1.6.0", ""),
                    )
                    .unwrap()
            })
            .collect();
        drop(queue);

        for handle in handles {
            handle.await.unwrap();
        }
        for id in ids {
            assert!(matches!(
                storer.get_evaluation(&id).unwrap(),
                Some(StoredEvaluation::Success(_))
            ));
        }
    }
}
