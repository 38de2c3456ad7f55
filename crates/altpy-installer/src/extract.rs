use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

pub trait ArchiveExtractor {
    /// Unpacks `archive` into `destination`, which already exists.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;
}

/// Extracts `.tgz` source tarballs in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive_path: &Path, destination: &Path) -> Result<()> {
        let file = File::open(archive_path)
            .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
        let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        archive.set_preserve_permissions(true);
        archive.set_overwrite(true);
        archive.unpack(destination).with_context(|| {
            format!(
                "failed to unpack {} into {}",
                archive_path.display(),
                destination.display()
            )
        })
    }
}
