//! Declarative manifest types.
//!
//! Shaped like the installer's own wire structs in `modlist::types`
//! (`Serialize`/`Deserialize` derives, `#[serde(default)]` on everything
//! optional) but describing a generic remote-asset manifest rather than a
//! Wabbajack modlist.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque request configuration forwarded to the [`crate::fetcher::Fetcher`].
/// The core never inspects this beyond forcing `"url"`.
pub type RequestConfig = HashMap<String, Value>;

/// Build a `RequestConfig` from a base map, always overriding `"url"`.
pub fn request_config_with_url(base: Option<&RequestConfig>, url: &str) -> RequestConfig {
    let mut config = base.cloned().unwrap_or_default();
    config.insert("url".to_string(), Value::String(url.to_string()));
    config
}

/// One declarative description of a remote asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    /// Remote URL. Required, non-empty.
    pub url: String,

    /// Destination file name, relative to the working directory. Defaults
    /// to the last path segment of `url` when absent.
    #[serde(default, rename = "fileName")]
    pub file_name: Option<String>,

    /// Path segment (relative to the working directory) where archive
    /// contents are extracted. Only meaningful when the downloaded file is
    /// an archive.
    #[serde(default, rename = "unzipTo")]
    pub unzip_to: Option<String>,

    /// Scheduling delay, in seconds, before the download attempt starts.
    #[serde(default, rename = "delayInSeconds")]
    pub delay_in_seconds: Option<u64>,

    /// Opaque request options forwarded to the Fetcher.
    #[serde(default, rename = "requestConfig")]
    pub request_config: Option<RequestConfig>,

    /// Overrides the engine's default retry limit for this entry.
    #[serde(default, rename = "retryLimit")]
    pub retry_limit: Option<u32>,
}

impl ManifestEntry {
    /// Resolves the destination file name: `fileName` if set, otherwise the
    /// last path segment of `url`.
    pub fn resolved_file_name(&self) -> String {
        if let Some(name) = &self.file_name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        self.url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("download")
            .to_string()
    }

    /// True when this entry names a zip archive that should be unpacked.
    pub fn is_archive(&self) -> bool {
        self.unzip_to.is_some() && self.resolved_file_name().to_lowercase().ends_with(".zip")
    }

    /// Absolute destination path for the downloaded file.
    pub fn destination(&self, working_directory: &Path) -> std::path::PathBuf {
        working_directory.join(self.resolved_file_name())
    }

    /// Absolute extraction directory, when `unzipTo` is set.
    pub fn extraction_dir(&self, working_directory: &Path) -> Option<std::path::PathBuf> {
        self.unzip_to.as_ref().map(|seg| working_directory.join(seg))
    }
}

/// Ordered sequence of [`ManifestEntry`], replaced atomically each tick.
pub type Manifest = Vec<ManifestEntry>;
