//! Client for a remote fresh-container server

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::POLL_INTERVAL_MS;
use crate::error::ClientError;
use crate::server::routes::CHECK_PATH;
use crate::version::evaluation::{CheckRequest, Evaluation};

/// Suspends the poll loop between two status requests
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Answer to a check submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Ready(Evaluation),
    /// Job status location to poll
    Accepted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    /// Evaluation location to fetch
    Resolved(String),
}

pub struct RemoteClient {
    client: reqwest::Client,
    base_url: Url,
    poll_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RemoteClient {
    pub fn new(server: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(server).map_err(|e| ClientError::InvalidUrl {
            url: server.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl {
                url: server.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        // Redirects are the "resolved" signal and must reach the poll loop
        let client = reqwest::Client::builder()
            .user_agent(concat!("fresh-container/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn url(&self, location: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(location)
            .map_err(|e| ClientError::InvalidUrl {
                url: location.to_string(),
                reason: e.to_string(),
            })
    }

    /// `GET /api/v1/check`: 200 carries the evaluation, 202 a job location
    pub async fn submit(&self, request: &CheckRequest) -> Result<Submission, ClientError> {
        let mut url = self.url(CHECK_PATH)?;
        url.query_pairs_mut()
            .append_pair("image", &request.image)
            .append_pair("constraint", &request.constraint)
            .append_pair("tagPrefix", &request.tag_prefix);

        debug!("Submitting check to {}", url);
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Submission::Ready(read_json(&url, response).await?)),
            StatusCode::ACCEPTED => Ok(Submission::Accepted(location(&url, &response)?)),
            _ => Err(unexpected(&url, response).await),
        }
    }

    /// `GET /api/v1/jobs/<id>`: 303 means resolved, 200 means pending
    pub async fn poll(&self, job_location: &str) -> Result<JobStatus, ClientError> {
        let url = self.url(job_location)?;
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            StatusCode::SEE_OTHER => Ok(JobStatus::Resolved(location(&url, &response)?)),
            StatusCode::OK => Ok(JobStatus::Pending),
            _ => Err(unexpected(&url, response).await),
        }
    }

    pub async fn fetch_evaluation(&self, evaluation_location: &str) -> Result<Evaluation, ClientError> {
        let url = self.url(evaluation_location)?;
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            StatusCode::OK => read_json(&url, response).await,
            _ => Err(unexpected(&url, response).await),
        }
    }

    /// Submit and poll until the server resolves the job.
    ///
    /// There is no bound on the number of polls: callers cancel by dropping
    /// the future (e.g. under `tokio::time::timeout`). `on_pending` runs once
    /// per pending answer.
    pub async fn evaluate<F: FnMut()>(
        &self,
        request: &CheckRequest,
        mut on_pending: F,
    ) -> Result<Evaluation, ClientError> {
        let job_location = match self.submit(request).await? {
            Submission::Ready(evaluation) => return Ok(evaluation),
            Submission::Accepted(job_location) => job_location,
        };

        loop {
            match self.poll(&job_location).await? {
                JobStatus::Resolved(evaluation_location) => {
                    return self.fetch_evaluation(&evaluation_location).await;
                }
                JobStatus::Pending => {
                    on_pending();
                    self.sleeper.sleep(self.poll_interval).await;
                }
            }
        }
    }
}

fn location(url: &Url, response: &Response) -> Result<String, ClientError> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ClientError::MissingLocation {
            url: url.to_string(),
            status: response.status().as_u16(),
        })
}

async fn read_json<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T, ClientError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ClientError::InvalidBody {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

async fn unexpected(url: &Url, response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::UnexpectedStatus {
        url: url.to_string(),
        status,
        body,
    }
}
