use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use altpy_core::LifecycleError;
use anyhow::{anyhow, Context, Result};

use crate::fs_utils::remove_file_if_exists;
use crate::ArtifactLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOperation {
    pub pid: u32,
    pub operation: String,
}

/// Exclusive claim on a layout for one mutating command. Released on drop.
#[derive(Debug)]
pub struct OperationGuard {
    path: PathBuf,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if let Err(err) = remove_file_if_exists(&self.path) {
            log::warn!(
                "failed to release operation marker {}: {err}",
                self.path.display()
            );
        }
    }
}

pub fn claim_operation(
    layout: &ArtifactLayout,
    operation: &str,
) -> Result<OperationGuard, LifecycleError> {
    claim(layout, operation).map_err(|err| match err {
        ClaimError::Held(detail) => LifecycleError::OperationInProgress { detail },
        ClaimError::Io(err) => LifecycleError::storage(&err),
    })
}

enum ClaimError {
    Held(String),
    Io(anyhow::Error),
}

fn claim(layout: &ArtifactLayout, operation: &str) -> Result<OperationGuard, ClaimError> {
    let path = layout.active_operation_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))
            .map_err(ClaimError::Io)?;
    }

    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            let holder = read_active_operation(layout)
                .ok()
                .flatten()
                .map(|active| format!("{} (pid={})", active.operation, active.pid))
                .unwrap_or_else(|| "unknown operation".to_string());
            return Err(ClaimError::Held(format!(
                "{holder}; remove {} if no altpy process is running",
                path.display()
            )));
        }
        Err(err) => {
            return Err(ClaimError::Io(anyhow::Error::new(err).context(format!(
                "failed to claim operation marker: {}",
                path.display()
            ))));
        }
    };

    // The guard exists from here on so a failed write still releases the marker.
    let guard = OperationGuard { path };
    file.write_all(format!("pid={}\noperation={operation}\n", std::process::id()).as_bytes())
        .and_then(|()| file.flush())
        .with_context(|| {
            format!(
                "failed to write operation marker: {}",
                guard.path.display()
            )
        })
        .map_err(ClaimError::Io)?;
    Ok(guard)
}

pub fn read_active_operation(layout: &ArtifactLayout) -> Result<Option<ActiveOperation>> {
    let path = layout.active_operation_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read operation marker: {}", path.display()));
        }
    };

    let mut pid = None;
    let mut operation = None;
    for line in raw.lines() {
        match line.split_once('=') {
            Some(("pid", value)) => pid = value.trim().parse::<u32>().ok(),
            Some(("operation", value)) => operation = Some(value.trim().to_string()),
            _ => {}
        }
    }

    match (pid, operation) {
        (Some(pid), Some(operation)) => Ok(Some(ActiveOperation { pid, operation })),
        _ => Err(anyhow!("malformed operation marker: {}", path.display())),
    }
}
