//! Cache Inspector — decides which manifest entries are missing locally.
//!
//! Pure with respect to the filesystem: it only reads, matching spec.md
//! §4.1. The parallel-scan shape (check every entry independently, collect
//! results, then decide) mirrors the installer's own pre-download cache
//! check in `collection::download::download_mods`, which uses
//! `into_par_iter` to check many candidate paths at once before deciding
//! what needs downloading; here the checks are async so we fan them out
//! with `futures::future::join_all` instead of `rayon`, since each check is
//! I/O-bound rather than CPU-bound.

use std::path::Path;

use crate::fs::FileSystem;
use crate::manifest::{Manifest, ManifestEntry};

/// Returns the ordered sub-sequence of `manifest` considered missing from
/// `working_directory`, per spec.md §4.1:
///
/// - an archive entry (`.zip` name, `unzipTo` set, unzip enabled) is present
///   iff its extraction directory exists, is a directory, is non-empty, and
///   contains `info.json`;
/// - a plain entry is present iff a regular file exists at its destination;
/// - `disableUnzip` makes an archive entry behave like a plain entry: it is
///   present iff the zip file itself exists (spec.md §9 open question 4).
pub async fn find_missing(
    fs: &dyn FileSystem,
    working_directory: &Path,
    manifest: &Manifest,
    disable_unzip: bool,
) -> Manifest {
    let checks = manifest
        .iter()
        .cloned()
        .map(|entry| async move {
            let present = is_present(fs, working_directory, &entry, disable_unzip).await;
            (entry, present)
        });

    let results = futures::future::join_all(checks).await;

    results
        .into_iter()
        .filter(|(_, present)| !present)
        .map(|(entry, _)| entry)
        .collect()
}

async fn is_present(
    fs: &dyn FileSystem,
    working_directory: &Path,
    entry: &ManifestEntry,
    disable_unzip: bool,
) -> bool {
    if entry.is_archive() && !disable_unzip {
        let Some(extraction_dir) = entry.extraction_dir(working_directory) else {
            return false;
        };
        if !fs.is_dir(&extraction_dir).await {
            return false;
        }
        let children = match fs.read_dir(&extraction_dir).await {
            Ok(children) => children,
            Err(_) => return false,
        };
        if children.is_empty() {
            return false;
        }
        children.iter().any(|c| c.name == "info.json" && !c.is_dir)
    } else {
        let destination = entry.destination(working_directory);
        fs.is_file(&destination).await
    }
}
