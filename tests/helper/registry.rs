//! Registry test utilities

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use fresh_container::image::Image;
use fresh_container::version::error::RegistryError;
use fresh_container::version::registry::Registry;

/// In-memory registry keyed by `<domain>/<path>`
pub struct MockRegistry {
    tags: HashMap<String, Vec<String>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            tags: HashMap::new(),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn with_tags(mut self, repository: &str, tags: &[&str]) -> Self {
        self.tags.insert(
            repository.to_string(),
            tags.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Block every fetch until a permit is added to the returned semaphore
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn fetch_tags(&self, image: &Image) -> Result<Vec<String>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?
                .forget();
        }

        let repository = image.full_name_without_tag();
        self.tags
            .get(&repository)
            .cloned()
            .ok_or(RegistryError::NotFound(repository))
    }
}

pub const INFLUXDB: &str = "docker.io/library/influxdb";

pub const INFLUXDB_TAGS: &[&str] = &[
    "1.4.0",
    "1.5.0",
    "1.5.0-alpine",
    "1.5.1",
    "1.5.2",
    "1.5.6-alpine",
    "1.6.3",
    "1.6.3-alpine",
    "latest",
    "alpine",
];
