use std::cmp::Ordering;
use std::fmt;
use std::path::{Component, Path};

use crate::LifecycleError;

/// Release identifier such as `3.11.4`.
///
/// The catalog is the only authority on whether a version exists; this type only guarantees
/// the identifier starts with a digit and is safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId(String);

/// Cheap syntactic check performed before any network access.
pub fn is_well_formed(raw: &str) -> bool {
    raw.chars().next().is_some_and(|ch| ch.is_ascii_digit())
}

impl VersionId {
    pub fn parse(raw: &str) -> Result<Self, LifecycleError> {
        if !is_well_formed(raw) {
            return Err(LifecycleError::InvalidVersionId {
                version: raw.to_string(),
                reason: "must begin with a digit",
            });
        }
        if !is_single_path_component(raw) {
            return Err(LifecycleError::InvalidVersionId {
                version: raw.to_string(),
                reason: "must not contain path separators or whitespace",
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First three characters of the identifier, e.g. `3.9` for `3.9.7`.
    pub fn series(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(3)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    pub fn archive_stem(&self) -> String {
        format!("Python-{}", self.0)
    }
}

fn is_single_path_component(raw: &str) -> bool {
    if raw
        .chars()
        .any(|ch| ch == '/' || ch == '\\' || ch == '\0' || ch.is_whitespace())
    {
        return false;
    }
    let mut components = Path::new(raw).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Dotted segments compare numerically when both sides are numeric so `3.10` sorts after `3.9`.
// A numeric segment always sorts before a non-numeric one, which keeps the order total.
impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.0.split('.');
        let mut right = other.0.split('.');
        loop {
            match (left.next(), right.next()) {
                (None, None) => return self.0.cmp(&other.0),
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(a), Some(b)) => {
                    let ordering = compare_segments(a, b);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
            }
        }
    }
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    match (numeric_segment(a), numeric_segment(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn numeric_segment(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
