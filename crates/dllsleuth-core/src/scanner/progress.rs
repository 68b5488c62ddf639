/// Crawl progress reporting: lightweight events handed to the caller's
/// callback while the walk runs.
use serde::Serialize;
use std::time::Duration;

/// Running totals of one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    /// Every non-directory entry seen, candidate or not.
    pub files_seen: u64,
    /// Files that passed the eligibility filter.
    pub candidates: u64,
    /// Directories visited, including the root.
    pub directories: u64,
    /// Entries that could not be read; the walk continued past them.
    pub errors: u64,
}

/// Events emitted during a crawl.
#[derive(Debug)]
pub enum CrawlProgress {
    /// Periodic update with running totals.
    Update {
        stats: CrawlStats,
        current_path: String,
    },
    /// A non-fatal error (e.g. permission denied on one directory).
    Error { path: String, message: String },
    /// The walk finished.
    Complete { duration: Duration, stats: CrawlStats },
}
