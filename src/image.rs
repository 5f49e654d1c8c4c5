//! Container image references
//!
//! An [`Image`] is a plain record: registry domain, repository path, current
//! tag and the tag prefix convention used by the repository. Versions are
//! derived from it with [`tag_version`] and [`tag_versions`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use thiserror::Error;

use crate::version::error::VersionError;
use crate::version::semver::{parse_tag, tags_to_versions};

pub const DEFAULT_REGISTRY_DOMAIN: &str = "docker.io";
const LEGACY_REGISTRY_DOMAIN: &str = "index.docker.io";
const DEFAULT_TAG: &str = "latest";
const OFFICIAL_NAMESPACE: &str = "library";

static PATH_COMPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w][\w.-]{0,127}$").unwrap());
static DIGEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[+._-][a-z0-9]+)*:[a-fA-F0-9]{32,}$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseImageError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid repository path component '{0}'")]
    InvalidPath(String),

    #[error("invalid tag '{0}'")]
    InvalidTag(String),

    #[error("invalid digest '{0}'")]
    InvalidDigest(String),

    #[error("image reference '{0}' has a digest but no tag to compare")]
    MissingTag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub domain: String,
    pub path: String,
    pub tag: String,
    pub tag_prefix: String,
}

impl Image {
    /// Parse a reference such as `influxdb:1.5.0`, `quay.io/coreos/etcd:v3.4.0`
    /// or `localhost:5000/team/app:2.1.0`.
    ///
    /// Docker Hub references are normalized: the domain defaults to
    /// `docker.io` and single-name images live under `library/`. A missing
    /// tag defaults to `latest`.
    pub fn parse(reference: &str, tag_prefix: &str) -> Result<Self, ParseImageError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ParseImageError::Empty);
        }

        let (without_digest, digest) = match reference.split_once('@') {
            Some((before, after)) => (before, Some(after)),
            None => (reference, None),
        };

        if let Some(digest) = digest
            && !DIGEST_RE.is_match(digest)
        {
            return Err(ParseImageError::InvalidDigest(digest.to_string()));
        }

        // A colon followed by a slash belongs to a registry port, not a tag
        let (name, tag) = match without_digest.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, Some(after)),
            _ => (without_digest, None),
        };

        let tag = match (tag, digest) {
            (Some(tag), _) => tag,
            (None, None) => DEFAULT_TAG,
            (None, Some(_)) => return Err(ParseImageError::MissingTag(reference.to_string())),
        };
        if !TAG_RE.is_match(tag) {
            return Err(ParseImageError::InvalidTag(tag.to_string()));
        }

        let (domain, path) = split_domain(name);
        for component in path.split('/') {
            if !PATH_COMPONENT_RE.is_match(component) {
                return Err(ParseImageError::InvalidPath(component.to_string()));
            }
        }

        Ok(Self {
            domain,
            path,
            tag: tag.to_string(),
            tag_prefix: tag_prefix.to_string(),
        })
    }

    /// `<domain>/<path>`, the identity used in evaluations and cache keys
    pub fn full_name_without_tag(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.domain, self.path, self.tag)
    }
}

fn split_domain(name: &str) -> (String, String) {
    let (domain, path) = match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_REGISTRY_DOMAIN.to_string(), name.to_string()),
    };

    let domain = if domain == LEGACY_REGISTRY_DOMAIN {
        DEFAULT_REGISTRY_DOMAIN.to_string()
    } else {
        domain
    };

    let path = if domain == DEFAULT_REGISTRY_DOMAIN && !path.contains('/') {
        format!("{}/{}", OFFICIAL_NAMESPACE, path)
    } else {
        path
    };

    (domain, path)
}

/// The version encoded in the image's current tag
pub fn tag_version(image: &Image) -> Result<Version, VersionError> {
    parse_tag(&image.tag, &image.tag_prefix)
}

/// Candidate versions for the image, parsed with the image's tag prefix
pub fn tag_versions(
    image: &Image,
    tags: &[String],
    skip_invalid: bool,
) -> Result<Vec<Version>, VersionError> {
    tags_to_versions(tags, &image.tag_prefix, skip_invalid)
}
