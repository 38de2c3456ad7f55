use std::path::{Path, PathBuf};

use altpy_core::{AltpyConfig, VersionId};

const RECEIPT_FILE_NAME: &str = ".altpy-receipt";

/// Filesystem layout shared by the store, the publisher and the operation marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    artifact_root: PathBuf,
    links_dir: PathBuf,
    state_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(
        artifact_root: impl Into<PathBuf>,
        links_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            links_dir: links_dir.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Relative config paths are anchored to the working directory so alias targets resolve
    /// from the links directory.
    pub fn from_config(config: &AltpyConfig) -> Self {
        Self::new(
            anchored(&config.artifact_root),
            anchored(&config.links_dir),
            anchored(&config.state_dir()),
        )
    }

    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    pub fn links_dir(&self) -> &Path {
        &self.links_dir
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn install_root_for(&self, version: &VersionId) -> PathBuf {
        self.artifact_root.join(version.as_str())
    }

    pub fn bin_dir_for(&self, version: &VersionId) -> PathBuf {
        self.install_root_for(version).join("bin")
    }

    pub fn build_dir_for(&self, version: &VersionId) -> PathBuf {
        self.artifact_root.join(version.archive_stem())
    }

    pub fn archive_path_for(&self, version: &VersionId) -> PathBuf {
        self.artifact_root.join(format!("{version}.tgz"))
    }

    pub fn receipt_path(&self, version: &VersionId) -> PathBuf {
        self.install_root_for(version).join(RECEIPT_FILE_NAME)
    }

    pub fn active_operation_path(&self) -> PathBuf {
        self.state_dir.join("active")
    }

    /// True when `path` is a direct child of the artifact root.
    pub fn is_artifact_child(&self, path: &Path) -> bool {
        path.parent() == Some(self.artifact_root.as_path())
    }
}

fn anchored(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
