//! Cache Purger — removes working-directory entries no longer referenced
//! by the current manifest.
//!
//! Per spec.md §9 note 3, the purge is synchronous-in-spirit: every entry
//! is decided from one `read_dir` snapshot and swept before the function
//! returns, unlike the original implementation's mix of sync/async calls.
//! Errors removing an individual entry are logged and do not abort the
//! sweep, matching how the installer's own best-effort cleanup paths
//! (e.g. retry loops in `collection::download` doing
//! `let _ = std::fs::remove_file(...)`) treat cleanup failures as
//! non-fatal.

use std::path::Path;

use tracing::warn;

use crate::fs::FileSystem;
use crate::manifest::Manifest;

/// Number of entries removed during a purge sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStats {
    pub removed: usize,
}

/// Deletes every immediate child of `working_directory` whose name is not
/// some entry's `fileName` or `unzipTo` in `manifest`.
pub async fn purge(fs: &dyn FileSystem, working_directory: &Path, manifest: &Manifest) -> PurgeStats {
    let keep: std::collections::HashSet<String> = manifest
        .iter()
        .flat_map(|entry| {
            std::iter::once(entry.resolved_file_name()).chain(entry.unzip_to.clone())
        })
        .collect();

    let children = match fs.read_dir(working_directory).await {
        Ok(children) => children,
        Err(e) => {
            warn!("purge: failed to read {}: {}", working_directory.display(), e);
            return PurgeStats::default();
        }
    };

    let mut stats = PurgeStats::default();

    for child in children {
        if keep.contains(&child.name) {
            continue;
        }

        let path = working_directory.join(&child.name);
        let result = if child.is_dir {
            fs.remove_dir_all(&path).await
        } else {
            fs.remove_file(&path).await
        };

        match result {
            Ok(()) => stats.removed += 1,
            Err(e) => warn!("purge: failed to remove {}: {}", path.display(), e),
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::test_support::InMemoryFileSystem;
    use crate::manifest::ManifestEntry;
    use std::path::PathBuf;

    fn entry(file_name: &str) -> ManifestEntry {
        ManifestEntry {
            url: format!("http://h/{file_name}"),
            file_name: Some(file_name.to_string()),
            unzip_to: None,
            delay_in_seconds: None,
            request_config: None,
            retry_limit: None,
        }
    }

    #[tokio::test]
    async fn removes_files_and_dirs_not_in_manifest() {
        let fs = InMemoryFileSystem::new();
        let working = PathBuf::from("/w");
        fs.put_file(&working.join("keep.bin"), b"x".to_vec());
        fs.put_file(&working.join("old.bin"), b"y".to_vec());
        fs.create_dir_all(&working.join("stale")).await.unwrap();
        fs.put_file(&working.join("stale").join("inner"), b"z".to_vec());

        let manifest = vec![entry("keep.bin")];
        let stats = purge(&fs, &working, &manifest).await;

        assert_eq!(stats.removed, 2);
        assert!(fs.exists(&working.join("keep.bin")).await);
        assert!(!fs.exists(&working.join("old.bin")).await);
        assert!(!fs.exists(&working.join("stale")).await);
        assert!(!fs.exists(&working.join("stale").join("inner")).await);
    }

    #[tokio::test]
    async fn keeps_unzip_to_directories() {
        let fs = InMemoryFileSystem::new();
        let working = PathBuf::from("/w");
        fs.put_file(&working.join("p").join("info.json"), b"{}".to_vec());

        let manifest = vec![ManifestEntry {
            unzip_to: Some("p".to_string()),
            ..entry("p.zip")
        }];

        let stats = purge(&fs, &working, &manifest).await;
        assert_eq!(stats.removed, 0);
        assert!(fs.exists(&working.join("p").join("info.json")).await);
    }

    #[tokio::test]
    async fn idempotent_when_nothing_to_remove() {
        let fs = InMemoryFileSystem::new();
        let working = PathBuf::from("/w");
        fs.put_file(&working.join("a.bin"), b"x".to_vec());
        let manifest = vec![entry("a.bin")];

        assert_eq!(purge(&fs, &working, &manifest).await.removed, 0);
        assert_eq!(purge(&fs, &working, &manifest).await.removed, 0);
    }
}
