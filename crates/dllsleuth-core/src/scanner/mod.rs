/// Scanner module: one crawl session per run.
///
/// A [`CrawlSession`] owns the root, the settings and the identity arena.
/// The walk runs once; grouping happens only after it completes, so every
/// duplicate decision sees the full candidate set.
pub mod progress;
pub mod walk;

use crate::analysis::duplicates::DuplicateSet;
use crate::config::SleuthConfig;
use crate::error::{Result, SleuthError};
use crate::model::IdentityArena;
use progress::{CrawlProgress, CrawlStats};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct CrawlSession {
    root: PathBuf,
    config: SleuthConfig,
    identities: IdentityArena,
    stats: CrawlStats,
    crawled: bool,
}

impl CrawlSession {
    /// Validate `root` and create an empty session.
    pub fn new(root: impl Into<PathBuf>, config: SleuthConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SleuthError::InvalidRoot(root));
        }
        Ok(Self {
            root,
            config,
            identities: IdentityArena::default(),
            stats: CrawlStats::default(),
            crawled: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SleuthConfig {
        &self.config
    }

    pub fn identities(&self) -> &IdentityArena {
        &self.identities
    }

    pub fn stats(&self) -> CrawlStats {
        self.stats
    }

    pub fn is_crawled(&self) -> bool {
        self.crawled
    }

    pub fn crawl(&mut self) -> Result<CrawlStats> {
        self.crawl_with(|_| {})
    }

    /// Walk the root once, reporting progress through `progress`.
    ///
    /// A second call is a no-op that returns the first crawl's totals.
    pub fn crawl_with(&mut self, mut progress: impl FnMut(CrawlProgress)) -> Result<CrawlStats> {
        if self.crawled {
            warn!("Session has already crawled '{}'", self.root.display());
            return Ok(self.stats);
        }
        if !self.root.is_dir() {
            return Err(SleuthError::InvalidRoot(self.root.clone()));
        }

        info!("Starting crawl of {}", self.root.display());
        let mut arena = IdentityArena::default();
        let stats = walk::walk(&self.root, &self.config, &mut arena, &mut progress);
        info!(
            "Crawled '{}': {} files, {} candidates, {} directories, {} errors",
            self.root.display(),
            stats.files_seen,
            stats.candidates,
            stats.directories,
            stats.errors
        );

        self.identities = arena;
        self.stats = stats;
        self.crawled = true;
        Ok(stats)
    }

    /// Group the crawled identities into the "all" and "managed" views.
    pub fn group(&self) -> Result<DuplicateSet> {
        if !self.crawled {
            return Err(SleuthError::NotCrawled);
        }
        Ok(DuplicateSet::build(&self.identities))
    }
}
