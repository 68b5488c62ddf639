/// Crawl and consolidation settings.
///
/// Every field has a default, so an empty JSON object (or no file at all)
/// gives the standard behaviour: `.dll` files, resource satellites and
/// reparse points skipped, cache under `AssemblyCache/` with `files.txt`
/// manifests.
use crate::error::{Result, SleuthError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SleuthConfig {
    /// Candidate extension without the dot; compared case-insensitively.
    pub extension: String,
    /// File-name suffixes that disqualify a candidate (case-insensitive).
    pub excluded_suffixes: Vec<String>,
    pub skip_reparse_points: bool,
    /// Directory created under the consolidation base path.
    pub cache_folder_name: String,
    /// Append-only list of consolidated paths inside each cache entry.
    pub manifest_file_name: String,
}

impl Default for SleuthConfig {
    fn default() -> Self {
        Self {
            extension: "dll".into(),
            excluded_suffixes: vec![".resources.dll".into()],
            skip_reparse_points: true,
            cache_folder_name: "AssemblyCache".into(),
            manifest_file_name: "files.txt".into(),
        }
    }
}

impl SleuthConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SleuthError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `true` when `file_name` has the candidate extension and no excluded suffix.
    pub fn is_candidate_name(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        let Some((_, ext)) = lower.rsplit_once('.') else {
            return false;
        };
        if !ext.eq_ignore_ascii_case(&self.extension) {
            return false;
        }
        !self
            .excluded_suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_lowercase()))
    }
}
