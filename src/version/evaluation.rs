//! Evaluation records and the builder that assembles them

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::image::{Image, tag_version};
use crate::version::checker::{is_stale, next_version};
use crate::version::constraint::RangeConstraint;
use crate::version::error::VersionError;
use crate::version::semver::render_tag;

/// What the caller asked for: one image, one constraint, one tag prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub image: String,
    pub constraint: String,
    #[serde(rename = "tagPrefix", default)]
    pub tag_prefix: String,
}

impl CheckRequest {
    pub fn new(image: &str, constraint: &str, tag_prefix: &str) -> Self {
        Self {
            image: image.to_string(),
            constraint: constraint.to_string(),
            tag_prefix: tag_prefix.to_string(),
        }
    }
}

/// Outcome of comparing an image's tag against its registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub image: String,
    pub constraint: String,
    #[serde(rename = "tagPrefix", default)]
    pub tag_prefix: String,
    pub current_version: String,
    pub next_version: String,
    pub stale: bool,
}

/// Error payload persisted in place of an evaluation when a job fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    pub error: String,
    pub status: u16,
}

/// What the cache holds under an evaluation key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredEvaluation {
    Success(Evaluation),
    Failure(EvaluationFailure),
}

/// Assemble an evaluation for `image` against already-parsed candidates.
///
/// `current_version` echoes the tag as published (prefix included) and
/// `next_version` is rendered with the prefix re-applied, so
/// `alpine-1.4.0` upgrades to `alpine-1.5.6`, never to `1.5.6`.
pub fn build_evaluation(
    image: &Image,
    range: &RangeConstraint,
    candidates: &[Version],
) -> Result<Evaluation, VersionError> {
    let current = tag_version(image)?;
    let next = next_version(&current, range, candidates);

    Ok(Evaluation {
        image: image.full_name_without_tag(),
        constraint: range.as_str().to_string(),
        tag_prefix: image.tag_prefix.clone(),
        current_version: image.tag.clone(),
        next_version: render_tag(&next, &image.tag_prefix),
        stale: is_stale(&current, &next),
    })
}
