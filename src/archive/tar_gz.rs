use super::{BundleEntries, BundleExtractor};
use crate::error::ArchiveError;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

/// Extractor for gzip-compressed tar bundles
#[derive(Clone, Copy, Debug, Default)]
pub struct TarGzExtractor;

fn corrupt(e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Corrupt {
        reason: e.to_string(),
    }
}

impl BundleExtractor for TarGzExtractor {
    fn extract(
        &self,
        bundle: &[u8],
        exclude: &dyn Fn(&str) -> bool,
    ) -> Result<BundleEntries, ArchiveError> {
        let mut archive = tar::Archive::new(GzDecoder::new(bundle));
        let mut entries = BundleEntries::new();

        for entry_result in archive.entries().map_err(corrupt)? {
            let mut entry = entry_result.map_err(corrupt)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let entry_path = entry.path().map_err(corrupt)?.into_owned();
            // Flattened: only the base name survives, so `..` members cannot escape
            let Some(name) = entry_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };

            if exclude(&name) {
                debug!(member = %entry_path.display(), "excluded bundle member");
                continue;
            }

            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(corrupt)?;
            if entries.insert(name.clone(), contents).is_some() {
                debug!(name = %name, "later bundle member replaced one with the same name");
            }
        }

        Ok(entries)
    }

    fn name(&self) -> &'static str {
        "tar.gz"
    }
}
