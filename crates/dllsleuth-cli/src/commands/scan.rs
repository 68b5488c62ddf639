use super::{crawl, write_json};
use anyhow::Result;
use dllsleuth_core::analysis::duplicates::{first_member, member_count};
use dllsleuth_core::scanner::progress::CrawlStats;
use dllsleuth_core::SleuthConfig;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ScanSummary {
    root: String,
    stats: CrawlStats,
    managed_only: bool,
    duplicates: Vec<DuplicateName>,
}

#[derive(Debug, Serialize)]
struct DuplicateName {
    file_name: String,
    instances: usize,
    fingerprints: usize,
    is_managed: bool,
}

/// Crawl `root` and list every duplicated file name.
pub fn scan(
    root: &Path,
    config: SleuthConfig,
    managed_only: bool,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let session = crawl(root, config)?;
    let set = session.group()?;
    let arena = session.identities();

    let duplicates: Vec<DuplicateName> = set
        .view(managed_only)
        .iter()
        .map(|(name, groups)| DuplicateName {
            file_name: name.to_string(),
            instances: member_count(groups),
            fingerprints: groups.len(),
            is_managed: first_member(groups).is_some_and(|i| arena.get(i).is_managed()),
        })
        .collect();

    let summary = ScanSummary {
        root: session.root().display().to_string(),
        stats: session.stats(),
        managed_only,
        duplicates,
    };
    if json {
        return write_json(out, &summary);
    }

    writeln!(out, "Root:        {}", summary.root)?;
    writeln!(out, "Files seen:  {}", summary.stats.files_seen)?;
    writeln!(out, "Candidates:  {}", summary.stats.candidates)?;
    writeln!(out, "Directories: {}", summary.stats.directories)?;
    if summary.stats.errors > 0 {
        writeln!(out, "Errors:      {}", summary.stats.errors)?;
    }
    writeln!(out)?;
    if summary.duplicates.is_empty() {
        writeln!(out, "No duplicate names found.")?;
        return Ok(());
    }
    writeln!(
        out,
        "{} duplicate name(s){}:",
        summary.duplicates.len(),
        if managed_only { " (managed)" } else { "" }
    )?;
    for dup in &summary.duplicates {
        writeln!(
            out,
            "  {:<40} {:>4} instance(s) {:>3} fingerprint(s) {}",
            dup.file_name,
            dup.instances,
            dup.fingerprints,
            if dup.is_managed { "managed" } else { "native" }
        )?;
    }
    Ok(())
}
