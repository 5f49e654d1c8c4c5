//! Storage trait shared by the server, its workers and the GC sweep

#[cfg(test)]
use mockall::automock;

use crate::image::Image;
use crate::version::error::CacheError;
use crate::version::evaluation::StoredEvaluation;

/// Key under which the normalized tag list of `image` is cached.
///
/// The prefix is part of the key because the stored versions are already
/// stripped of it.
pub fn tags_key(image: &Image) -> String {
    format!("tags/{}#{}", image.full_name_without_tag(), image.tag_prefix)
}

pub fn job_key(job_id: &str) -> String {
    format!("jobs/{}", job_id)
}

pub fn evaluation_key(job_id: &str) -> String {
    format!("evaluations/{}", job_id)
}

/// Trait for the TTL-bounded store behind the async evaluation path
#[cfg_attr(test, automock)]
pub trait Storer: Send + Sync {
    /// Cached normalized versions for the image, `None` on miss or expiry
    fn get_tags(&self, image: &Image) -> Result<Option<Vec<String>>, CacheError>;

    fn set_tags(&self, image: &Image, versions: &[String]) -> Result<(), CacheError>;

    /// Record that `job_id` has been accepted and is waiting for a worker
    fn mark_job_queued(&self, job_id: &str) -> Result<(), CacheError>;

    fn is_job_queued(&self, job_id: &str) -> Result<bool, CacheError>;

    fn set_evaluation(&self, job_id: &str, evaluation: &StoredEvaluation)
    -> Result<(), CacheError>;

    fn get_evaluation(&self, job_id: &str) -> Result<Option<StoredEvaluation>, CacheError>;

    /// Remove expired entries, returning how many were deleted
    fn gc(&self) -> Result<usize, CacheError>;

    /// Cheap round-trip used by the health check
    fn ping(&self) -> Result<(), CacheError>;
}
