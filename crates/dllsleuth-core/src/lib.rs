/// DllSleuth Core: binary inspection, fingerprinting, grouping and
/// consolidation.
///
/// This crate contains all business logic with no terminal I/O. Binaries
/// are only ever read as bytes; nothing is loaded or executed.
///
/// # Modules
///
/// - [`pe`] — managed/native probe, section view and version resource.
/// - [`metadata`] — ECMA-335 tables, target framework and assembly manifest.
/// - [`model`] — identities, fingerprints and versions.
/// - [`scanner`] — the crawl session and directory walk.
/// - [`analysis`] — duplicate grouping and instance statistics.
/// - [`dedup`] — transactional symlink consolidation.
/// - [`report`] — CSV export.
/// - [`platform`] — symbolic links, reparse points, permission errors.
pub mod analysis;
pub mod config;
pub mod dedup;
pub mod error;
pub mod metadata;
pub mod model;
pub mod pe;
pub mod platform;
pub mod report;
pub mod scanner;

pub use config::SleuthConfig;
pub use error::{Result, SleuthError};
pub use scanner::CrawlSession;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
pub(crate) mod fixtures;
