use std::fmt;

/// A decoded lifecycle request. Versions stay raw here; the orchestrator validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCommand {
    Install {
        version: String,
        options: InstallOptions,
    },
    Remove {
        version: String,
    },
    Clean,
}

impl LifecycleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Remove { .. } => "remove",
            Self::Clean => "clean",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Build parallelism; probed from the host when unset.
    pub jobs: Option<u32>,
    /// Expected lowercase hex SHA-256 of the source archive.
    pub expected_sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Configure,
    Build,
    Install,
}

impl BuildStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
