use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use altpy_core::VersionSource;
use altpy_installer::{remove_file_if_exists, ArchiveFetcher};
use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::blocking::Client;

use crate::render::TerminalRenderer;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("altpy/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None)
        .build()
        .context("failed to build HTTP client")
}

/// Reads the upstream directory listing of published releases.
pub(crate) struct HttpVersionSource {
    client: Client,
    url: String,
}

impl HttpVersionSource {
    pub(crate) fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

impl VersionSource for HttpVersionSource {
    fn fetch_listing(&self) -> Result<String> {
        debug!("fetching version listing from {}", self.url);
        self.client
            .get(&self.url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .with_context(|| format!("failed to fetch {}", self.url))
    }
}

/// Downloads into `<destination>.part` and renames on completion.
pub(crate) struct HttpArchiveFetcher {
    client: Client,
    renderer: TerminalRenderer,
}

impl HttpArchiveFetcher {
    pub(crate) fn new(client: Client, renderer: TerminalRenderer) -> Self {
        Self { client, renderer }
    }

    fn download_to(&self, url: &str, part_path: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to download {url}"))?;

        let file = File::create(part_path)
            .with_context(|| format!("failed to create {}", part_path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut progress = self
            .renderer
            .start_progress("download", response.content_length());
        let copied = copy_with_progress(&mut response, &mut writer, |bytes| progress.set(bytes))
            .and_then(|bytes| {
                writer
                    .flush()
                    .with_context(|| format!("failed to flush {}", part_path.display()))?;
                Ok(bytes)
            });

        match copied {
            Ok(bytes) => {
                progress.finish_success();
                debug!("downloaded {bytes} bytes from {url}");
                Ok(())
            }
            Err(err) => {
                progress.finish_abandon();
                Err(err)
            }
        }
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let part_path = part_path_for(destination);
        if let Err(err) = self.download_to(url, &part_path) {
            if let Err(cleanup_err) = remove_file_if_exists(&part_path) {
                warn!(
                    "failed to remove partial download {}: {cleanup_err}",
                    part_path.display()
                );
            }
            return Err(err);
        }

        fs::rename(&part_path, destination).with_context(|| {
            format!(
                "failed to move downloaded archive into place: {}",
                destination.display()
            )
        })
    }
}

pub(crate) fn part_path_for(destination: &Path) -> PathBuf {
    destination.with_file_name(format!(
        "{}.part",
        destination
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("archive")
    ))
}

pub(crate) fn copy_with_progress(
    reader: &mut impl Read,
    writer: &mut impl Write,
    mut on_progress: impl FnMut(u64),
) -> Result<u64> {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut total = 0_u64;
    loop {
        let read = reader
            .read(&mut buf)
            .context("failed reading download stream")?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buf[..read])
            .context("failed writing download stream")?;
        total += read as u64;
        on_progress(total);
    }
    Ok(total)
}
