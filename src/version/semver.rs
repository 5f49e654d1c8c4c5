use std::cmp::Ordering;

use semver::Version;
use tracing::warn;

use crate::version::error::VersionError;

/// Strip `prefix` from `tag` and parse the remainder as a strict semantic version.
///
/// An empty prefix disables stripping. Partial versions such as "1.2" are
/// rejected: container tags are compared exactly as published.
///
/// Examples:
/// - ("1.5.0", "") -> Version(1, 5, 0)
/// - ("alpine-1.4.0", "alpine-") -> Version(1, 4, 0)
/// - ("1.4.0", "alpine-") -> PrefixMismatch
pub fn parse_tag(tag: &str, prefix: &str) -> Result<Version, VersionError> {
    let trimmed = match tag.strip_prefix(prefix) {
        Some(rest) => rest,
        None => {
            return Err(VersionError::PrefixMismatch {
                tag: tag.to_string(),
                prefix: prefix.to_string(),
            });
        }
    };

    Version::parse(trimmed).map_err(|e| VersionError::InvalidVersion {
        version: tag.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a list of tags into versions.
///
/// With `skip_invalid` set, tags that lack the prefix or are not valid
/// semantic versions are dropped (and logged); otherwise the first bad tag
/// fails the whole conversion. The input order is preserved.
pub fn tags_to_versions(
    tags: &[String],
    prefix: &str,
    skip_invalid: bool,
) -> Result<Vec<Version>, VersionError> {
    let mut versions = Vec::with_capacity(tags.len());

    for tag in tags {
        match parse_tag(tag, prefix) {
            Ok(version) => versions.push(version),
            Err(e) if skip_invalid => {
                warn!(tag = %tag, error = %e, "Skipping image tag");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(versions)
}

/// Render a version back into a tag by re-applying the prefix.
pub fn render_tag(version: &Version, prefix: &str) -> String {
    format!("{}{}", prefix, version)
}

/// Precedence order: (major, minor, patch), then pre-release.
/// Build metadata is ignored and a release ranks above its pre-releases.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp_precedence(b)
}

/// Two versions share a pre-release shape when their pre-release identifier
/// sequences have the same length and every identifier compares equal.
///
/// `1.5.6-alpine` and `1.5.0-alpine` share a shape; `1.5.6-alpine` and
/// `1.5.8-data-alpine` do not, and neither shares one with `1.6.3`.
pub fn same_pre_release_shape(a: &Version, b: &Version) -> bool {
    let lhs = pre_release_identifiers(a);
    let rhs = pre_release_identifiers(b);

    lhs.len() == rhs.len()
        && lhs
            .iter()
            .zip(rhs.iter())
            .all(|(x, y)| compare_identifier(x, y) == Ordering::Equal)
}

fn pre_release_identifiers(version: &Version) -> Vec<&str> {
    if version.pre.is_empty() {
        Vec::new()
    } else {
        version.pre.as_str().split('.').collect()
    }
}

fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
