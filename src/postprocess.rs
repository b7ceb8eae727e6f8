//! Post-processing (spec.md §4.5): turns a completed archive download into
//! an extracted directory plus a catalog file, then removes the archive.
//!
//! Extraction failures are logged and swallowed per spec.md §7 — the
//! archive is left in place so the next tick's Cache Inspector still finds
//! the entry missing (no `info.json` was written) and retries the whole
//! download, the same "leave it for next time" philosophy the installer
//! applies to a failed `collection::extract` call inside its own install
//! pipeline.

use std::path::Path;

use tracing::warn;

use crate::catalog::CatalogFile;
use crate::extractor::Extractor;
use crate::fs::FileSystem;
use crate::manifest::ManifestEntry;

/// Extracts `archive_path` per `entry` if it names an archive and unzip is
/// enabled, writes `info.json`, then deletes the archive. No-op (and not an
/// error) for plain entries.
pub async fn post_process(
    fs: &dyn FileSystem,
    extractor: &dyn Extractor,
    working_directory: &Path,
    entry: &ManifestEntry,
    archive_path: &Path,
    now_millis: i64,
    disable_unzip: bool,
) {
    if disable_unzip || !entry.is_archive() {
        return;
    }

    let Some(target_dir) = entry.extraction_dir(working_directory) else {
        return;
    };

    if let Err(e) = extractor.extract(archive_path, &target_dir).await {
        warn!("extraction failed for {}: {e}", archive_path.display());
        return;
    }

    if !fs.is_dir(&target_dir).await {
        warn!("extraction target {} is not a directory after extract", target_dir.display());
        return;
    }

    let required_files: Vec<String> = match fs.read_dir(&target_dir).await {
        Ok(children) => children
            .into_iter()
            .filter(|c| !c.name.starts_with('.'))
            .map(|c| c.name)
            .collect(),
        Err(e) => {
            warn!("failed to read extracted directory {}: {e}", target_dir.display());
            return;
        }
    };

    let catalog = CatalogFile::new(required_files, now_millis);
    let bytes = match catalog.to_json_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to serialize info.json for {}: {e}", target_dir.display());
            return;
        }
    };

    if let Err(e) = fs.write_file(&target_dir.join("info.json"), &bytes).await {
        warn!("failed to write info.json in {}: {e}", target_dir.display());
        return;
    }

    if let Err(e) = fs.remove_file(archive_path).await {
        warn!("failed to remove archive {}: {e}", archive_path.display());
    }
}
