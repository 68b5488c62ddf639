/// Error type shared by every core module.
///
/// Parsing errors (`Malformed`) are internal: the public binary-inspection
/// entry points swallow them and degrade to "not managed" / "Unknown".
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, SleuthError>;

#[derive(Debug, Error)]
pub enum SleuthError {
    /// The crawl root does not exist or is not a directory.
    #[error("invalid root path '{}'", .0.display())]
    InvalidRoot(PathBuf),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission failure during a destructive filesystem operation.
    #[error("access denied on '{}'", path.display())]
    AccessDenied { path: PathBuf },

    /// The file name has no entry in the managed duplicate map.
    #[error("'{0}' is not a known duplicated managed assembly")]
    UnknownFileName(String),

    /// An operation that needs crawl results was called before crawling.
    #[error("the directory must be crawled first")]
    NotCrawled,

    /// One or more fingerprint subgroups could not be consolidated.
    #[error("{} subgroup(s) of '{file_name}' failed to consolidate", failures.len())]
    Consolidation {
        file_name: String,
        failures: Vec<SubgroupFailure>,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("report output failed: {0}")]
    Csv(#[from] csv::Error),

    /// Truncated or structurally invalid binary data.
    #[error("malformed image: {0}")]
    Malformed(String),
}

impl SleuthError {
    /// Wrap an `io::Error`, promoting permission failures to `AccessDenied`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if crate::platform::is_access_denied(&source) {
            Self::AccessDenied { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// A single failed fingerprint subgroup inside a consolidation request.
#[derive(Debug)]
pub struct SubgroupFailure {
    /// Subgroup fingerprint, formatted as 8 hex digits.
    pub fingerprint: String,
    /// The member path whose replacement failed.
    pub path: PathBuf,
    /// Underlying cause (already rolled back where possible).
    pub cause: Box<SleuthError>,
}

impl std::fmt::Display for SubgroupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.fingerprint, self.path.display(), self.cause)
    }
}
