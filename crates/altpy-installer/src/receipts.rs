use std::fs;
use std::io;
use std::path::PathBuf;

use altpy_core::VersionId;
use anyhow::{anyhow, Context, Result};

use crate::ArtifactLayout;

/// Completion record written into an install root once its aliases are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReceipt {
    pub version: String,
    pub aliases: Vec<String>,
    pub archive_url: Option<String>,
    pub archive_sha256: Option<String>,
    pub jobs: Option<u32>,
    pub installed_at_unix: u64,
}

pub fn write_install_receipt(layout: &ArtifactLayout, receipt: &InstallReceipt) -> Result<PathBuf> {
    let version = VersionId::parse(&receipt.version)
        .map_err(|err| anyhow!("refusing to write receipt: {err}"))?;

    let mut payload = String::new();
    payload.push_str(&format!("version={}\n", receipt.version));
    for alias in &receipt.aliases {
        payload.push_str(&format!("alias={alias}\n"));
    }
    if let Some(url) = &receipt.archive_url {
        payload.push_str(&format!("archive_url={url}\n"));
    }
    if let Some(sha256) = &receipt.archive_sha256 {
        payload.push_str(&format!("archive_sha256={sha256}\n"));
    }
    if let Some(jobs) = receipt.jobs {
        payload.push_str(&format!("jobs={jobs}\n"));
    }
    payload.push_str(&format!(
        "installed_at_unix={}\n",
        receipt.installed_at_unix
    ));

    let path = layout.receipt_path(&version);
    fs::write(&path, payload.as_bytes())
        .with_context(|| format!("failed to write install receipt: {}", path.display()))?;
    Ok(path)
}

pub fn read_install_receipt(
    layout: &ArtifactLayout,
    version: &VersionId,
) -> Result<Option<InstallReceipt>> {
    let path = layout.receipt_path(version);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read install receipt: {}", path.display()));
        }
    };

    let receipt = parse_receipt(&raw)
        .with_context(|| format!("failed to parse install receipt: {}", path.display()))?;
    if receipt.version != version.as_str() {
        return Err(anyhow!(
            "install receipt {} records version '{}'",
            path.display(),
            receipt.version
        ));
    }
    Ok(Some(receipt))
}

pub fn parse_receipt(raw: &str) -> Result<InstallReceipt> {
    let mut version = None;
    let mut aliases = Vec::new();
    let mut archive_url = None;
    let mut archive_sha256 = None;
    let mut jobs = None;
    let mut installed_at_unix = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "version" => version = Some(value.to_string()),
            "alias" => aliases.push(value.to_string()),
            "archive_url" => archive_url = Some(value.to_string()),
            "archive_sha256" => archive_sha256 = Some(value.to_string()),
            "jobs" => jobs = Some(value.parse::<u32>().context("invalid jobs value")?),
            "installed_at_unix" => {
                installed_at_unix = Some(
                    value
                        .parse::<u64>()
                        .context("invalid installed_at_unix value")?,
                )
            }
            _ => {}
        }
    }

    Ok(InstallReceipt {
        version: version.ok_or_else(|| anyhow!("missing version"))?,
        aliases,
        archive_url,
        archive_sha256,
        jobs,
        installed_at_unix: installed_at_unix.ok_or_else(|| anyhow!("missing installed_at_unix"))?,
    })
}
