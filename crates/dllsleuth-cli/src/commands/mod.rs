/// Command implementations. Each one opens and crawls a session, then
/// renders its view of the result to `out`.
mod consolidate;
mod report;
mod scan;
mod stats;

pub use consolidate::consolidate;
pub use report::report;
pub use scan::scan;
pub use stats::{counts, detail};

use anyhow::{Context, Result};
use dllsleuth_core::scanner::progress::CrawlProgress;
use dllsleuth_core::{CrawlSession, SleuthConfig};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

pub fn load_config(path: Option<&Path>) -> Result<SleuthConfig> {
    match path {
        Some(path) => SleuthConfig::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(SleuthConfig::default()),
    }
}

/// Open a session on `root` and crawl it, forwarding progress to the log.
pub(crate) fn crawl(root: &Path, config: SleuthConfig) -> Result<CrawlSession> {
    let mut session = CrawlSession::new(root, config)
        .with_context(|| format!("cannot crawl {}", root.display()))?;
    session
        .crawl_with(|event| match event {
            CrawlProgress::Update {
                stats,
                current_path,
            } => debug!("{} candidates so far, at {current_path}", stats.candidates),
            CrawlProgress::Error { path, message } => warn!("Skipped {path}: {message}"),
            CrawlProgress::Complete { duration, stats } => debug!(
                "Walk finished in {:.2}s ({} candidates)",
                duration.as_secs_f64(),
                stats.candidates
            ),
        })
        .with_context(|| format!("crawl of {} failed", root.display()))?;
    Ok(session)
}

pub(crate) fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialise output")?;
    writeln!(out, "{text}")?;
    Ok(())
}
