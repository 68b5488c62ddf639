/// Serial directory walk using `jwalk`.
///
/// Entries come back sorted by name and strictly in order, so two crawls of
/// an unchanged tree produce identities in the same order. Symbolic links
/// are never followed.
use super::progress::{CrawlProgress, CrawlStats};
use crate::config::SleuthConfig;
use crate::model::{AssemblyIdentity, IdentityArena};
use crate::platform;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Entries between two `CrawlProgress::Update` events.
const UPDATE_INTERVAL: u64 = 1_000;

/// Walk `root`, appending one identity per eligible file to `arena`.
pub fn walk(
    root: &Path,
    config: &SleuthConfig,
    arena: &mut IdentityArena,
    progress: &mut dyn FnMut(CrawlProgress),
) -> CrawlStats {
    let start = Instant::now();
    let mut stats = CrawlStats::default();
    let mut seen: u64 = 0;

    let walker = jwalk::WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .parallelism(jwalk::Parallelism::Serial);

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                stats.errors += 1;
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                warn!("Skipping unreadable entry {path}: {err}");
                progress(CrawlProgress::Error {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
        };

        seen += 1;
        if seen % UPDATE_INTERVAL == 0 {
            progress(CrawlProgress::Update {
                stats,
                current_path: entry.path().display().to_string(),
            });
        }

        if entry.file_type().is_dir() {
            stats.directories += 1;
            continue;
        }
        stats.files_seen += 1;

        let name = entry.file_name().to_string_lossy();
        if !config.is_candidate_name(&name) {
            continue;
        }

        let path = entry.path();
        // Never follow links here; a link must be seen as a link.
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(err) => {
                stats.errors += 1;
                warn!("Cannot stat {}: {err}", path.display());
                progress(CrawlProgress::Error {
                    path: path.display().to_string(),
                    message: err.to_string(),
                });
                continue;
            }
        };
        let identity = if platform::is_reparse_point(&metadata) {
            if config.skip_reparse_points {
                debug!("Skipping reparse point {}", path.display());
                continue;
            }
            // Link metadata describes the link; size is read through it later.
            AssemblyIdentity::new(path)
        } else {
            AssemblyIdentity::with_size(path, metadata.len())
        };

        stats.candidates += 1;
        arena.add(identity);
    }

    progress(CrawlProgress::Complete {
        duration: start.elapsed(),
        stats,
    });
    stats
}
