//! Filesystem abstraction.
//!
//! Wraps the same primitives the installer already reaches for when it
//! streams a download to disk (`tokio::fs::create_dir_all`,
//! `tokio::fs::File::create` in `downloaders::http`) behind a trait, so the
//! Cache Inspector, Purger and Download Engine can be exercised against an
//! in-memory fake in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// One immediate child of a directory, as seen by [`FileSystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

/// Filesystem primitives the core depends on. Every method is async so a
/// fake backed by an in-memory map can be driven from the same call sites
/// as the real, `tokio::fs`-backed implementation.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    async fn is_dir(&self, path: &Path) -> bool;
    async fn is_file(&self, path: &Path) -> bool;

    /// Immediate children of `path`, in the order the underlying directory
    /// read reports them. Empty (not an error) if `path` does not exist.
    async fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<DirEntryInfo>>;

    async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()>;
    async fn remove_file(&self, path: &Path) -> anyhow::Result<()>;
    async fn remove_dir_all(&self, path: &Path) -> anyhow::Result<()>;

    /// Opens a fresh streaming writer at `path`, truncating any existing
    /// file, creating parent directories as needed.
    async fn create_writer(&self, path: &Path) -> anyhow::Result<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Writes `contents` atomically-enough for our purposes (used for
    /// `info.json`).
    async fn write_file(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()>;
}

/// Default [`FileSystem`] backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn is_file(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<DirEntryInfo>> {
        let mut out = Vec::new();
        let mut reader = match tokio::fs::read_dir(path).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            out.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(out)
    }

    async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_writer(&self, path: &Path) -> anyhow::Result<Box<dyn AsyncWrite + Send + Unpin>> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}

/// Joins `base` with a relative path, same semantics as
/// `paths::join_windows_path` in the installer minus the Windows separator
/// translation (manifests in this domain use POSIX-style segments).
pub fn join(base: &Path, relative: &str) -> PathBuf {
    base.join(relative)
}
