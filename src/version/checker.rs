//! Next-version selection

use std::cmp::Ordering;

use semver::Version;

use crate::version::constraint::RangeConstraint;
use crate::version::error::VersionError;
use crate::version::semver::{compare, parse_tag, same_pre_release_shape, tags_to_versions};

/// Select the greatest candidate that satisfies `range`, is not older than
/// `current` and stays on the same pre-release track as `current`.
///
/// Candidates are scanned in the given order; when two candidates have equal
/// precedence the later one wins. Returns `current` when nothing qualifies.
pub fn next_version(current: &Version, range: &RangeConstraint, candidates: &[Version]) -> Version {
    let mut best = current;

    for candidate in candidates {
        if !range.matches(candidate) {
            continue;
        }
        if compare(candidate, current) == Ordering::Less {
            continue;
        }
        if !same_pre_release_shape(candidate, current) {
            continue;
        }
        if compare(candidate, best) != Ordering::Less {
            best = candidate;
        }
    }

    best.clone()
}

/// True when `next` strictly outranks `current`
pub fn is_stale(current: &Version, next: &Version) -> bool {
    compare(next, current) == Ordering::Greater
}

/// Strict, string-level entry point: every tag must parse.
///
/// Returns the selected version without the prefix.
pub fn next_tag(
    current_tag: &str,
    constraint: &str,
    tag_prefix: &str,
    tags: &[String],
) -> Result<String, VersionError> {
    let current = parse_tag(current_tag, tag_prefix)?;
    let range = RangeConstraint::parse(constraint)?;
    let versions = tags_to_versions(tags, tag_prefix, false)?;

    Ok(next_version(&current, &range, &versions).to_string())
}
