use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::VersionId;

pub const DEFAULT_SOURCE_BASE_URL: &str = "https://www.python.org/ftp/python";
pub const DEFAULT_ALIAS_PREFIX: &str = "altpy-";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Optional overrides read from `<prefix>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    artifact_root: Option<PathBuf>,
    links_dir: Option<PathBuf>,
    source_base_url: Option<String>,
    alias_prefix: Option<String>,
    configure_args: Vec<String>,
    jobs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltpyConfig {
    pub prefix: PathBuf,
    pub artifact_root: PathBuf,
    pub links_dir: PathBuf,
    pub source_base_url: String,
    pub alias_prefix: String,
    pub configure_args: Vec<String>,
    pub jobs: Option<u32>,
}

impl AltpyConfig {
    pub fn for_prefix(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            artifact_root: prefix.join("versions"),
            links_dir: prefix.join("bin"),
            source_base_url: DEFAULT_SOURCE_BASE_URL.to_string(),
            alias_prefix: DEFAULT_ALIAS_PREFIX.to_string(),
            configure_args: Vec::new(),
            jobs: None,
            prefix,
        }
    }

    pub fn config_path(prefix: &Path) -> PathBuf {
        prefix.join(CONFIG_FILE_NAME)
    }

    /// Loads `<prefix>/config.toml` on top of the defaults; a missing file is not an error.
    pub fn load(prefix: impl Into<PathBuf>) -> Result<Self> {
        let prefix = prefix.into();
        let path = Self::config_path(&prefix);
        if !path.exists() {
            return Ok(Self::for_prefix(prefix));
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(prefix, &raw)
            .with_context(|| format!("failed to load config file: {}", path.display()))
    }

    pub fn from_toml_str(prefix: impl Into<PathBuf>, input: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(input).context("failed to parse altpy config")?;
        let mut config = Self::for_prefix(prefix);

        if let Some(root) = file.artifact_root {
            config.artifact_root = config.resolve_relative(root);
        }
        if let Some(links) = file.links_dir {
            config.links_dir = config.resolve_relative(links);
        }
        if let Some(url) = file.source_base_url {
            let trimmed = url.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                return Err(anyhow!("source_base_url must not be empty"));
            }
            config.source_base_url = trimmed.to_string();
        }
        if let Some(alias_prefix) = file.alias_prefix {
            validate_alias_prefix(&alias_prefix)?;
            config.alias_prefix = alias_prefix;
        }
        if file.jobs == Some(0) {
            return Err(anyhow!("jobs must be at least 1"));
        }
        config.configure_args = file.configure_args;
        config.jobs = file.jobs;

        if config.artifact_root == config.links_dir {
            return Err(anyhow!(
                "artifact_root and links_dir must be different directories: {}",
                config.artifact_root.display()
            ));
        }
        Ok(config)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.prefix.join("state")
    }

    pub fn listing_url(&self) -> String {
        format!("{}/", self.source_base_url)
    }

    pub fn archive_url(&self, version: &VersionId) -> String {
        format!(
            "{}/{}/{}.tgz",
            self.source_base_url,
            version,
            version.archive_stem()
        )
    }

    fn resolve_relative(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.prefix.join(path)
        }
    }
}

fn validate_alias_prefix(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("alias_prefix must not be empty"));
    }
    if value
        .chars()
        .any(|ch| ch == '/' || ch == '\\' || ch.is_whitespace())
    {
        return Err(anyhow!(
            "alias_prefix contains invalid character(s): {value}"
        ));
    }
    Ok(())
}

pub fn default_user_prefix() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("ALTPY_HOME").filter(|value| !value.is_empty()) {
        let home = PathBuf::from(home);
        return std::path::absolute(&home)
            .with_context(|| format!("failed to resolve ALTPY_HOME: {}", home.display()));
    }

    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows user prefix")?;
        return Ok(PathBuf::from(app_data).join("altpy"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user prefix")?;
    Ok(PathBuf::from(home).join(".altpy"))
}
