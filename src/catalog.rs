//! `info.json` catalog file written into each extracted archive directory.

use serde::{Deserialize, Serialize};

/// Per-extraction marker recording what an archive unpacked to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogFile {
    #[serde(rename = "requiredFiles")]
    pub required_files: Vec<String>,

    #[serde(rename = "downloadedAt")]
    pub downloaded_at: i64,
}

impl CatalogFile {
    pub fn new(required_files: Vec<String>, downloaded_at: i64) -> Self {
        Self { required_files, downloaded_at }
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let catalog = CatalogFile::new(vec!["f1".to_string(), "f2".to_string()], 1_700_000_000_000);
        let json = String::from_utf8(catalog.to_json_bytes().unwrap()).unwrap();
        assert!(json.contains("\"requiredFiles\""));
        assert!(json.contains("\"downloadedAt\""));
    }
}
