//! Range constraint evaluator
//!
//! Grammar:
//! - `<1.0.0`, `<=1.0.0`, `>1.0.0`, `>=1.0.0` - comparison operators
//! - `1.0.0`, `=1.0.0`, `==1.0.0` - equal to
//! - `!1.0.0`, `!=1.0.0` - not equal to
//! - `>1.0.0 <2.0.0` - space-separated conditions are ANDed
//! - `<2.0.0 || >=3.0.0` - `||` separates OR groups
//!
//! Whitespace between an operator and its version is tolerated
//! (`>= 1.5.0 < 1.6.0`). AND binds tighter than OR and there is no grouping.

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::version::error::VersionError;
use crate::version::semver::compare;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl Operator {
    /// Longest operators first so `>=` is not read as `>` followed by `=1.0.0`
    const TOKENS: &'static [(&'static str, Operator)] = &[
        (">=", Operator::Gte),
        ("<=", Operator::Lte),
        ("!=", Operator::Ne),
        ("==", Operator::Eq),
        (">", Operator::Gt),
        ("<", Operator::Lt),
        ("=", Operator::Eq),
        ("!", Operator::Ne),
    ];

    fn split(condition: &str) -> (Operator, &str) {
        Self::TOKENS
            .iter()
            .find_map(|(token, op)| condition.strip_prefix(token).map(|rest| (*op, rest)))
            .unwrap_or((Operator::Eq, condition))
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Gte => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }
}

/// A single `(operator, version)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: Operator,
    pub version: Version,
}

impl Comparator {
    fn matches(&self, version: &Version) -> bool {
        self.op.accepts(compare(version, &self.version))
    }
}

/// OR-list of AND-groups of comparators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeConstraint {
    source: String,
    groups: Vec<Vec<Comparator>>,
}

impl RangeConstraint {
    /// Compile a constraint expression
    pub fn parse(constraint: &str) -> Result<Self, VersionError> {
        let invalid = |reason: String| VersionError::InvalidConstraint {
            constraint: constraint.to_string(),
            reason,
        };

        if constraint.trim().is_empty() {
            return Err(invalid("empty constraint".to_string()));
        }

        let groups = constraint
            .split("||")
            .map(|group| Self::parse_group(group).map_err(&invalid))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: constraint.to_string(),
            groups,
        })
    }

    fn parse_group(group: &str) -> Result<Vec<Comparator>, String> {
        let conditions = Self::split_conditions(group)?;
        if conditions.is_empty() {
            return Err("empty range between '||' separators".to_string());
        }

        conditions
            .into_iter()
            .map(|condition| {
                let (op, version) = Operator::split(&condition);
                if version.is_empty() {
                    return Err(format!("missing version after operator in '{}'", condition));
                }
                let version = Version::parse(version)
                    .map_err(|e| format!("invalid version '{}': {}", version, e))?;
                Ok(Comparator { op, version })
            })
            .collect()
    }

    /// Join operator-only tokens with the version that follows them
    fn split_conditions(group: &str) -> Result<Vec<String>, String> {
        let mut conditions = Vec::new();
        let mut pending_op: Option<&str> = None;

        for token in group.split_whitespace() {
            let is_operator = token.chars().all(|c| matches!(c, '<' | '>' | '=' | '!'));
            match (pending_op, is_operator) {
                (Some(op), true) => {
                    return Err(format!("operator '{}' followed by operator '{}'", op, token));
                }
                (Some(op), false) => {
                    conditions.push(format!("{}{}", op, token));
                    pending_op = None;
                }
                (None, true) => pending_op = Some(token),
                (None, false) => conditions.push(token.to_string()),
            }
        }

        if let Some(op) = pending_op {
            return Err(format!("missing version after operator '{}'", op));
        }

        Ok(conditions)
    }

    /// True when `version` satisfies every comparator of at least one group
    pub fn matches(&self, version: &Version) -> bool {
        self.groups
            .iter()
            .any(|group| group.iter().all(|c| c.matches(version)))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for RangeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
