/// On-disk cache layout.
///
/// ```text
/// <base>/<cache_folder_name>/<fileNameLower>/<FINGERPRINT>/
///     <fileNameLower>          canonical copy
///     <manifest_file_name>     one consolidated path per line, append-only
/// ```
use crate::config::SleuthConfig;
use crate::error::{Result, SleuthError};
use crate::model::Fingerprint;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
    manifest_file_name: String,
}

impl CacheLayout {
    pub fn new(base: &Path, config: &SleuthConfig) -> Self {
        Self {
            root: base.join(&config.cache_folder_name),
            manifest_file_name: config.manifest_file_name.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, file_name_lower: &str, fingerprint: Fingerprint) -> PathBuf {
        self.root.join(file_name_lower).join(fingerprint.hex())
    }

    /// Create the entry directory (and parents) if missing.
    pub fn ensure_entry(&self, file_name_lower: &str, fingerprint: Fingerprint) -> Result<CacheEntry> {
        let dir = self.entry_dir(file_name_lower, fingerprint);
        fs::create_dir_all(&dir).map_err(|e| SleuthError::io(&dir, e))?;
        // Resolve once so membership checks and link targets are absolute.
        let dir = fs::canonicalize(&dir).map_err(|e| SleuthError::io(&dir, e))?;
        Ok(CacheEntry {
            canonical: dir.join(file_name_lower),
            manifest: dir.join(&self.manifest_file_name),
            dir,
        })
    }
}

/// One `(fileNameLower, fingerprint)` directory.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub dir: PathBuf,
    pub canonical: PathBuf,
    pub manifest: PathBuf,
}

impl CacheEntry {
    /// `true` when `path` already lives inside this entry.
    pub fn contains(&self, path: &Path) -> bool {
        let parent = path.parent().unwrap_or(path);
        let resolved = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
        is_within(&resolved, &self.dir)
    }

    pub fn append_manifest(&self, paths: &[&Path]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.manifest)
            .map_err(|e| SleuthError::io(&self.manifest, e))?;
        let mut text = String::new();
        for path in paths {
            text.push_str(&path.display().to_string());
            text.push('\n');
        }
        file.write_all(text.as_bytes())
            .map_err(|e| SleuthError::io(&self.manifest, e))
    }

    pub fn has_canonical(&self) -> bool {
        self.canonical.is_file()
    }
}

/// Prefix test on whole components; case-insensitive on Windows.
#[cfg(windows)]
fn is_within(path: &Path, dir: &Path) -> bool {
    let path = PathBuf::from(path.to_string_lossy().to_lowercase());
    let dir = PathBuf::from(dir.to_string_lossy().to_lowercase());
    path.starts_with(dir)
}

#[cfg(not(windows))]
fn is_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn entry_path_uses_name_and_hex_fingerprint() {
        let layout = CacheLayout::new(Path::new("/base"), &SleuthConfig::default());
        assert_eq!(
            layout.entry_dir("foo.dll", Fingerprint(0x1A2B)),
            Path::new("/base/AssemblyCache/foo.dll/00001A2B")
        );
    }

    #[test]
    fn ensure_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let layout = CacheLayout::new(tmp.path(), &SleuthConfig::default());
        let entry = layout.ensure_entry("foo.dll", Fingerprint(7)).unwrap();
        assert!(entry.dir.is_dir());
        assert!(entry.canonical.ends_with("foo.dll/00000007/foo.dll"));
        assert!(!entry.has_canonical());
        // Idempotent.
        layout.ensure_entry("foo.dll", Fingerprint(7)).unwrap();
    }

    #[test]
    fn manifest_is_append_only() {
        let tmp = TempDir::new().unwrap();
        let layout = CacheLayout::new(tmp.path(), &SleuthConfig::default());
        let entry = layout.ensure_entry("foo.dll", Fingerprint(1)).unwrap();

        entry.append_manifest(&[Path::new("/a/foo.dll")]).unwrap();
        entry
            .append_manifest(&[Path::new("/b/foo.dll"), Path::new("/c/foo.dll")])
            .unwrap();

        let text = fs::read_to_string(&entry.manifest).unwrap();
        assert_eq!(text, "/a/foo.dll\n/b/foo.dll\n/c/foo.dll\n");
    }

    #[test]
    fn contains_matches_members_inside_entry() {
        let tmp = TempDir::new().unwrap();
        let layout = CacheLayout::new(tmp.path(), &SleuthConfig::default());
        let entry = layout.ensure_entry("foo.dll", Fingerprint(1)).unwrap();

        assert!(entry.contains(&entry.canonical));
        assert!(!entry.contains(&tmp.path().join("foo.dll")));
    }
}
