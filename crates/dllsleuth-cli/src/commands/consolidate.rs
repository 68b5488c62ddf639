use super::crawl;
use anyhow::{Context, Result};
use dllsleuth_core::dedup::Deduplicator;
use dllsleuth_core::SleuthConfig;
use std::io::Write;
use std::path::Path;

/// Link every managed duplicate of `name` to one cached copy per fingerprint.
pub fn consolidate(
    root: &Path,
    config: SleuthConfig,
    name: &str,
    cache_base: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    let session = crawl(root, config)?;
    let set = session.group()?;
    let base = cache_base.unwrap_or(session.root());
    let dedup = Deduplicator::new(session.identities(), &set.managed, base, session.config());

    let report = dedup
        .consolidate(name)
        .with_context(|| format!("consolidation of '{name}' did not complete"))?;

    writeln!(
        out,
        "{}: linked {} file(s) across {} fingerprint(s)",
        report.file_name,
        report.linked_count(),
        report.subgroups.len()
    )?;
    for group in &report.subgroups {
        writeln!(
            out,
            "  [{}] {} -> {}{}",
            group.fingerprint,
            group.linked.len(),
            group.canonical.display(),
            if group.skipped > 0 {
                format!(" ({} already cached)", group.skipped)
            } else {
                String::new()
            }
        )?;
    }
    Ok(())
}
