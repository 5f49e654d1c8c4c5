//! In-process evaluation, used by `check` when no server is given

use tracing::{debug, info};

use crate::error::Result;
use crate::image::{Image, tag_version, tag_versions};
use crate::version::constraint::RangeConstraint;
use crate::version::evaluation::{CheckRequest, Evaluation, build_evaluation};
use crate::version::registry::Registry;

/// Parse, fetch and evaluate in one go.
///
/// Everything that can be validated offline is validated before the
/// registry is contacted. Failures are returned as-is; retrying is left to
/// the registry client.
pub async fn evaluate_locally(registry: &dyn Registry, request: &CheckRequest) -> Result<Evaluation> {
    let image = Image::parse(&request.image, &request.tag_prefix)?;
    tag_version(&image)?;
    let range = RangeConstraint::parse(&request.constraint)?;

    info!(image = %image, constraint = %range, "Fetching tags");
    let tags = registry.fetch_tags(&image).await?;
    let candidates = tag_versions(&image, &tags, true)?;
    debug!(
        "{} of {} tags are valid versions",
        candidates.len(),
        tags.len()
    );

    Ok(build_evaluation(&image, &range, &candidates)?)
}
