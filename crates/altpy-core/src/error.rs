use thiserror::Error;

use crate::BuildStep;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid version identifier '{version}': {reason}")]
    InvalidVersionId {
        version: String,
        reason: &'static str,
    },

    #[error("version {version} is not published upstream")]
    VersionNotPublished { version: String },

    #[error("version catalog is unavailable: {detail}")]
    CatalogUnavailable { detail: String },

    #[error("failed to fetch source archive for {version}: {detail}")]
    FetchFailed { version: String, detail: String },

    #[error("failed to extract source archive for {version}: {detail}")]
    ExtractFailed { version: String, detail: String },

    #[error("{step} step failed for {version}: {detail}")]
    BuildStepFailed {
        version: String,
        step: BuildStep,
        detail: String,
    },

    #[error("failed to publish aliases for {version}: {detail}")]
    PublishFailed { version: String, detail: String },

    #[error("version {version} is not installed")]
    NotInstalled { version: String },

    #[error("{action} aborted by user")]
    UserDeclined { action: String },

    #[error("clean incomplete; failed to remove: {}", failed.join(", "))]
    CleanIncomplete { failed: Vec<String> },

    #[error("another altpy operation is in progress: {detail}")]
    OperationInProgress { detail: String },

    #[error("{detail}")]
    Storage { detail: String },
}

impl LifecycleError {
    pub fn storage(err: &anyhow::Error) -> Self {
        Self::Storage {
            detail: render_chain(err),
        }
    }

    /// True for the one outcome that is not a failure of the tool itself.
    pub fn is_user_declined(&self) -> bool {
        matches!(self, Self::UserDeclined { .. })
    }
}

/// Renders an error with its full context chain on one line.
pub(crate) fn render_chain(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
