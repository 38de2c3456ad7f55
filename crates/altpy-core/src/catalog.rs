use std::collections::BTreeSet;
use std::sync::OnceLock;

use anyhow::Result;
use log::debug;
use regex::Regex;

use crate::error::render_chain;
use crate::{is_well_formed, LifecycleError, VersionId};

/// Source of the upstream directory listing that enumerates published releases.
pub trait VersionSource {
    fn fetch_listing(&self) -> Result<String>;
}

pub struct VersionCatalog<'a> {
    source: &'a dyn VersionSource,
}

impl<'a> VersionCatalog<'a> {
    pub fn new(source: &'a dyn VersionSource) -> Self {
        Self { source }
    }

    pub fn is_well_formed(&self, raw: &str) -> bool {
        is_well_formed(raw)
    }

    pub fn list_valid(&self) -> Result<BTreeSet<VersionId>, LifecycleError> {
        let listing =
            self.source
                .fetch_listing()
                .map_err(|err| LifecycleError::CatalogUnavailable {
                    detail: render_chain(&err),
                })?;
        Ok(parse_version_listing(&listing))
    }

    pub fn is_installable(&self, raw: &str) -> Result<bool, LifecycleError> {
        if !self.is_well_formed(raw) {
            return Ok(false);
        }
        let Ok(version) = VersionId::parse(raw) else {
            return Ok(false);
        };
        Ok(self.list_valid()?.contains(&version))
    }

    /// Validates `raw` and confirms the catalog publishes it.
    pub fn resolve(&self, raw: &str) -> Result<VersionId, LifecycleError> {
        let version = VersionId::parse(raw)?;
        if !self.is_installable(version.as_str())? {
            return Err(LifecycleError::VersionNotPublished {
                version: raw.to_string(),
            });
        }
        Ok(version)
    }
}

/// Parses an HTML directory listing into the published versions.
///
/// The first anchor links to the parent directory and is ignored. Version directories come
/// first, so the scan stops at the first anchor whose text does not start with a digit.
pub fn parse_version_listing(html: &str) -> BTreeSet<VersionId> {
    let mut versions = BTreeSet::new();
    for text in anchor_texts(html).skip(1) {
        if !is_well_formed(text) {
            break;
        }
        let value = text.strip_suffix('/').unwrap_or(text);
        match VersionId::parse(value) {
            Ok(version) => {
                versions.insert(version);
            }
            Err(err) => debug!("skipping listing entry '{value}': {err}"),
        }
    }
    versions
}

fn anchor_texts(html: &str) -> impl Iterator<Item = &str> {
    anchor_pattern()
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .map(|text| text.as_str().trim())
        .filter(|text| !text.contains('<'))
}

fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<a(?:\s[^>]*)?>(.*?)</a\s*>").expect("anchor pattern is valid")
    })
}
