//! Archive extraction abstraction.
//!
//! `ZipExtractor` extracts every entry of a zip archive into a target
//! directory using the `zip` crate the same way `collection::extract` and
//! `installer::handlers::from_archive::extract_from_zip` already read zip
//! entries (`zip::ZipArchive::new`, iterate `by_index`, write to disk). The
//! installer always runs this kind of CPU-bound, synchronous archive work
//! from inside a `tokio::spawn`-driven worker (`installer::streaming`)
//! rather than directly on the async executor thread, so `ZipExtractor`
//! follows suit via `spawn_blocking`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use anyhow::Context;

/// Extracts an archive file into a target directory, creating directories
/// as needed.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, archive: &Path, target_dir: &Path) -> anyhow::Result<()>;
}

/// Default [`Extractor`] for zip-format archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

#[async_trait]
impl Extractor for ZipExtractor {
    async fn extract(&self, archive: &Path, target_dir: &Path) -> anyhow::Result<()> {
        let archive = archive.to_path_buf();
        let target_dir = target_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip_blocking(&archive, &target_dir)).await??;
        Ok(())
    }
}

fn extract_zip_blocking(archive_path: &Path, target_dir: &Path) -> anyhow::Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive {}", archive_path.display()))?;
    let reader = BufReader::new(file);
    let mut archive = zip::ZipArchive::new(reader)
        .with_context(|| format!("failed to read zip archive {}", archive_path.display()))?;

    std::fs::create_dir_all(target_dir)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path: PathBuf = target_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        std::fs::write(&out_path, data)?;
    }

    Ok(())
}
