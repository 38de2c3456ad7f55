use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use altpy_core::{LifecycleError, VersionId};
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};

use crate::fs_utils::{remove_dir_all_if_exists, remove_file_if_exists};
use crate::receipts::read_install_receipt;
use crate::{sha256_file, ArchiveExtractor, ArtifactLayout};

/// Downloads a source archive to a local path.
pub trait ArchiveFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Fetched-and-extracted source tree owned by one in-progress install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArtifact {
    pub version: VersionId,
    pub archive_url: String,
    pub archive_sha256: String,
    pub build_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: VersionId,
    pub install_root: PathBuf,
    pub published_aliases: BTreeSet<String>,
    pub archive_sha256: Option<String>,
    pub installed_at_unix: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotPresent,
    /// Install root exists without a receipt: an interrupted install.
    Incomplete,
    Installed,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: ArtifactLayout,
}

impl ArtifactStore {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn install_root_for(&self, version: &VersionId) -> PathBuf {
        self.layout.install_root_for(version)
    }

    /// Fetches and extracts the source archive for `version`.
    ///
    /// The archive file is deleted as soon as extraction finishes, whatever the outcome. On
    /// failure nothing staged for `version` is left behind.
    pub fn stage(
        &self,
        version: &VersionId,
        url: &str,
        fetcher: &dyn ArchiveFetcher,
        extractor: &dyn ArchiveExtractor,
        expected_sha256: Option<&str>,
    ) -> Result<StagingArtifact, LifecycleError> {
        let root = self.layout.artifact_root();
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create artifact root: {}", root.display()))
            .map_err(|err| LifecycleError::storage(&err))?;

        let archive_path = self.layout.archive_path_for(version);
        let build_dir = self.layout.build_dir_for(version);
        let fetch_failed = |detail: String| {
            self.discard_staging(version);
            LifecycleError::FetchFailed {
                version: version.to_string(),
                detail,
            }
        };

        debug!("fetching {url} -> {}", archive_path.display());
        if let Err(err) = fetcher.fetch(url, &archive_path) {
            return Err(fetch_failed(format!("{err:#}")));
        }
        let archive_sha256 = match sha256_file(&archive_path) {
            Ok(digest) => digest,
            Err(err) => return Err(fetch_failed(format!("{err:#}"))),
        };
        if let Some(expected) = expected_sha256 {
            if !expected.trim().eq_ignore_ascii_case(&archive_sha256) {
                return Err(fetch_failed(format!(
                    "sha256 mismatch: expected {}, got {archive_sha256}",
                    expected.trim()
                )));
            }
        }

        if let Err(err) = remove_dir_all_if_exists(&build_dir) {
            return Err(fetch_failed(format!(
                "failed to clear stale build tree {}: {err}",
                build_dir.display()
            )));
        }

        let extracted = extractor.extract(&archive_path, root);
        if let Err(err) = remove_file_if_exists(&archive_path) {
            warn!(
                "failed to delete downloaded archive {}: {err}",
                archive_path.display()
            );
        }
        let extract_failed = |detail: String| {
            self.discard_staging(version);
            LifecycleError::ExtractFailed {
                version: version.to_string(),
                detail,
            }
        };
        if let Err(err) = extracted {
            return Err(extract_failed(format!("{err:#}")));
        }
        if !build_dir.is_dir() {
            return Err(extract_failed(format!(
                "archive did not contain {}/",
                version.archive_stem()
            )));
        }

        Ok(StagingArtifact {
            version: version.clone(),
            archive_url: url.to_string(),
            archive_sha256,
            build_dir,
        })
    }

    /// Recursively deletes the version's install root. Absent roots are a no-op.
    pub fn purge_install(&self, version: &VersionId) -> Result<()> {
        let install_root = self.layout.install_root_for(version);
        if !self.layout.is_artifact_child(&install_root) {
            return Err(anyhow!(
                "refusing to purge {} outside artifact root {}",
                install_root.display(),
                self.layout.artifact_root().display()
            ));
        }
        remove_dir_all_if_exists(&install_root)
            .with_context(|| format!("failed to remove {}", install_root.display()))
    }

    pub fn purge_staging(&self, artifact: &StagingArtifact) -> Result<()> {
        if !self.layout.is_artifact_child(&artifact.build_dir) {
            return Err(anyhow!(
                "refusing to purge build tree outside artifact root: {}",
                artifact.build_dir.display()
            ));
        }
        remove_dir_all_if_exists(&artifact.build_dir)
            .with_context(|| format!("failed to remove {}", artifact.build_dir.display()))
    }

    /// Best-effort removal of the archive and build tree for `version`.
    pub fn discard_staging(&self, version: &VersionId) {
        let archive_path = self.layout.archive_path_for(version);
        if let Err(err) = remove_file_if_exists(&archive_path) {
            warn!("failed to remove {}: {err}", archive_path.display());
        }
        let build_dir = self.layout.build_dir_for(version);
        if let Err(err) = remove_dir_all_if_exists(&build_dir) {
            warn!("failed to remove {}: {err}", build_dir.display());
        }
    }

    pub fn install_state(&self, version: &VersionId) -> InstallState {
        if !self.layout.install_root_for(version).is_dir() {
            return InstallState::NotPresent;
        }
        if self.layout.receipt_path(version).is_file() {
            InstallState::Installed
        } else {
            InstallState::Incomplete
        }
    }

    pub fn installed_versions(&self) -> Result<Vec<InstalledVersion>> {
        let mut installed = Vec::new();
        for version in self.version_dirs()? {
            let Some(receipt) = read_install_receipt(&self.layout, &version)? else {
                continue;
            };
            installed.push(InstalledVersion {
                install_root: self.layout.install_root_for(&version),
                published_aliases: receipt.aliases.into_iter().collect(),
                archive_sha256: receipt.archive_sha256,
                installed_at_unix: receipt.installed_at_unix,
                version,
            });
        }
        Ok(installed)
    }

    pub fn incomplete_installs(&self) -> Result<Vec<VersionId>> {
        Ok(self
            .version_dirs()?
            .into_iter()
            .filter(|version| self.install_state(version) == InstallState::Incomplete)
            .collect())
    }

    /// Build trees and archives left behind by interrupted installs.
    pub fn stale_staging_paths(&self) -> Result<Vec<PathBuf>> {
        let mut stale = Vec::new();
        for entry in self.read_root()? {
            let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
                continue;
            };
            let file_type = entry.file_type()?;
            let is_build_tree = file_type.is_dir() && name.starts_with("Python-");
            let is_archive = file_type.is_file()
                && (name.ends_with(".tgz") || name.ends_with(".tgz.part"));
            if is_build_tree || is_archive {
                stale.push(entry.path());
            }
        }
        stale.sort();
        Ok(stale)
    }

    pub fn sweep_stale_staging(&self) -> Result<Vec<PathBuf>> {
        let stale = self.stale_staging_paths()?;
        for path in &stale {
            if path.is_dir() {
                remove_dir_all_if_exists(path)
            } else {
                remove_file_if_exists(path)
            }
            .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(stale)
    }

    fn version_dirs(&self) -> Result<Vec<VersionId>> {
        let mut versions = Vec::new();
        for entry in self.read_root()? {
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
                continue;
            };
            if let Ok(version) = VersionId::parse(&name) {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn read_root(&self) -> Result<Vec<fs::DirEntry>> {
        let root = self.layout.artifact_root();
        match fs::read_dir(root) {
            Ok(entries) => entries
                .collect::<io::Result<Vec<_>>>()
                .with_context(|| format!("failed to read artifact root: {}", root.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read artifact root: {}", root.display())),
        }
    }
}
