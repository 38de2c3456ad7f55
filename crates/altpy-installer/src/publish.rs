use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use altpy_core::VersionId;
use anyhow::{anyhow, Context, Result};
use log::debug;

use crate::ArtifactLayout;

/// Exposes an installed version's executables in the links directory.
pub trait AliasPublisher {
    /// Creates an alias for every executable under `install_root/bin`.
    ///
    /// Stops at the first failure; aliases created before it stay on disk for the caller to
    /// unpublish.
    fn publish(&self, version: &VersionId, install_root: &Path) -> Result<BTreeSet<String>>;

    /// Removes every alias pointing into the version's install root. Absent aliases are fine.
    fn unpublish(&self, version: &VersionId) -> Result<Vec<String>>;

    /// Removes aliases into the artifact root whose target is gone.
    fn prune_orphans(&self) -> Result<Vec<String>>;
}

/// Rewrites the version token embedded in an executable name to the full version.
///
/// The token is the first three characters of the version (`3.9` for `3.9.7`) and is only
/// substituted where it stands alone, so `python3.11` is left untouched for `3.11.4`.
pub fn versioned_executable_name(executable: &str, version: &VersionId) -> String {
    let full = version.as_str();
    let series = version.series();
    if full.len() <= series.len() {
        return executable.to_string();
    }

    let mut renamed = String::with_capacity(executable.len() + full.len());
    let mut rest = executable;
    while let Some(idx) = rest.find(series) {
        let before = &rest[..idx];
        let after = &rest[idx + series.len()..];
        let digit_before = before.ends_with(|ch: char| ch.is_ascii_digit());
        let digit_after = after.starts_with(|ch: char| ch.is_ascii_digit());
        renamed.push_str(before);
        if digit_before || digit_after {
            renamed.push_str(series);
        } else {
            renamed.push_str(full);
        }
        rest = after;
    }
    renamed.push_str(rest);
    renamed
}

#[derive(Debug, Clone)]
pub struct SymlinkPublisher {
    layout: ArtifactLayout,
    alias_prefix: String,
}

impl SymlinkPublisher {
    pub fn new(layout: ArtifactLayout, alias_prefix: impl Into<String>) -> Self {
        Self {
            layout,
            alias_prefix: alias_prefix.into(),
        }
    }

    pub fn alias_name(&self, executable: &str, version: &VersionId) -> String {
        format!(
            "{}{}",
            self.alias_prefix,
            versioned_executable_name(executable, version)
        )
    }

    pub fn alias_path(&self, alias: &str) -> PathBuf {
        self.layout.links_dir().join(alias)
    }

    /// Aliases currently on disk that point into the version's install root.
    pub fn aliases_for(&self, version: &VersionId) -> Result<BTreeSet<String>> {
        let install_root = self.layout.install_root_for(version);
        Ok(self
            .prefixed_links()?
            .into_iter()
            .filter(|(_, target)| target.starts_with(&install_root))
            .map(|(alias, _)| alias)
            .collect())
    }

    /// Aliases into the artifact root whose target no longer exists.
    pub fn orphaned_aliases(&self) -> Result<Vec<String>> {
        Ok(self
            .prefixed_links()?
            .into_iter()
            .filter(|(_, target)| target.starts_with(self.layout.artifact_root()))
            .filter(|(_, target)| fs::metadata(target).is_err())
            .map(|(alias, _)| alias)
            .collect())
    }

    fn prefixed_links(&self) -> Result<Vec<(String, PathBuf)>> {
        let dir = self.layout.links_dir();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read links dir: {}", dir.display()));
            }
        };

        let mut links = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
                continue;
            };
            if !name.starts_with(&self.alias_prefix) {
                continue;
            }
            let Ok(target) = fs::read_link(entry.path()) else {
                continue;
            };
            links.push((name, target));
        }
        links.sort();
        Ok(links)
    }
}

impl AliasPublisher for SymlinkPublisher {
    fn publish(&self, version: &VersionId, install_root: &Path) -> Result<BTreeSet<String>> {
        // Symlink targets resolve relative to the links dir, so only absolute roots are linked.
        if !install_root.is_absolute() {
            return Err(anyhow!(
                "install root must be absolute: {}",
                install_root.display()
            ));
        }
        let bin_dir = install_root.join("bin");
        let executables = executables_in(&bin_dir)?;
        if executables.is_empty() {
            return Err(anyhow!("no executables found in {}", bin_dir.display()));
        }

        let links_dir = self.layout.links_dir();
        fs::create_dir_all(links_dir)
            .with_context(|| format!("failed to create links dir: {}", links_dir.display()))?;

        let mut published = BTreeSet::new();
        for executable in executables {
            let alias = self.alias_name(&executable, version);
            let source = bin_dir.join(&executable);
            let destination = self.alias_path(&alias);

            match fs::symlink_metadata(&destination) {
                Ok(_) => match fs::read_link(&destination) {
                    Ok(target) if target == source => {
                        published.insert(alias);
                        continue;
                    }
                    Ok(target) if target.starts_with(install_root) => {
                        fs::remove_file(&destination).with_context(|| {
                            format!("failed to replace stale alias: {}", destination.display())
                        })?;
                    }
                    Ok(target) => {
                        return Err(anyhow!(
                            "alias {alias} already exists and points to {}",
                            target.display()
                        ));
                    }
                    Err(_) => {
                        return Err(anyhow!(
                            "{} already exists and is not an alias",
                            destination.display()
                        ));
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to inspect {}", destination.display()));
                }
            }

            create_alias(&source, &destination)?;
            debug!("published {} -> {}", destination.display(), source.display());
            published.insert(alias);
        }

        Ok(published)
    }

    fn unpublish(&self, version: &VersionId) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        let mut failures = Vec::new();
        for alias in self.aliases_for(version)? {
            let path = self.alias_path(&alias);
            match fs::remove_file(&path) {
                Ok(()) => removed.push(alias),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => failures.push(format!("{}: {err}", path.display())),
            }
        }

        if !failures.is_empty() {
            return Err(anyhow!(
                "failed to remove aliases for {version}: {}",
                failures.join("; ")
            ));
        }
        Ok(removed)
    }

    fn prune_orphans(&self) -> Result<Vec<String>> {
        let orphans = self.orphaned_aliases()?;
        for alias in &orphans {
            let path = self.alias_path(alias);
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove orphaned alias: {}", path.display()))?;
        }
        Ok(orphans)
    }
}

fn executables_in(bin_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(bin_dir)
        .with_context(|| format!("failed to read bin dir: {}", bin_dir.display()))?
    {
        let entry = entry?;
        let Ok(metadata) = fs::metadata(entry.path()) else {
            continue;
        };
        if !metadata.is_file() || !is_executable(&metadata) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

fn create_alias(source: &Path, destination: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(source, destination).with_context(|| {
            format!(
                "failed to create symlink {} -> {}",
                destination.display(),
                source.display()
            )
        })
    }

    #[cfg(not(unix))]
    {
        Err(anyhow!(
            "cannot alias {} as {}: symlink aliases require a unix host",
            source.display(),
            destination.display()
        ))
    }
}
