use super::{crawl, write_json};
use anyhow::Result;
use dllsleuth_core::analysis::{self, bucket_by_name};
use dllsleuth_core::SleuthConfig;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct CountsOutput<'a> {
    #[serde(flatten)]
    counts: analysis::InstanceCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    names: Option<NamesWithCount<'a>>,
}

#[derive(Debug, Serialize)]
struct NamesWithCount<'a> {
    instances: usize,
    names: Vec<&'a str>,
}

/// Histogram of names by instance count, optionally listing one bucket.
pub fn counts(
    root: &Path,
    config: SleuthConfig,
    max: usize,
    names: Option<usize>,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let session = crawl(root, config)?;
    let buckets = bucket_by_name(session.identities());
    let output = CountsOutput {
        counts: analysis::counts(&buckets, max),
        names: names.map(|n| NamesWithCount {
            instances: n,
            names: analysis::names_with_count(&buckets, n),
        }),
    };
    if json {
        return write_json(out, &output);
    }

    for &(instances, names) in &output.counts.exact {
        writeln!(out, "{instances:>3} instance(s): {names} name(s)")?;
    }
    if output.counts.more_than_max > 0 {
        writeln!(
            out,
            ">{:>2} instance(s): {} name(s)",
            output.counts.max, output.counts.more_than_max
        )?;
    }
    if let Some(listed) = &output.names {
        writeln!(out)?;
        writeln!(out, "Names with {} instance(s):", listed.instances)?;
        for name in &listed.names {
            writeln!(out, "  {name}")?;
        }
    }
    Ok(())
}

/// Every fingerprint subgroup of one name, newest first.
pub fn detail(
    root: &Path,
    config: SleuthConfig,
    name: &str,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let session = crawl(root, config)?;
    let buckets = bucket_by_name(session.identities());
    let detail = analysis::detail(&buckets, session.identities(), &name.trim().to_lowercase())?;
    if json {
        return write_json(out, &detail);
    }

    writeln!(
        out,
        "{}: {} instance(s), {} fingerprint(s)",
        detail.file_name,
        detail.instances,
        detail.subgroups.len()
    )?;
    for group in &detail.subgroups {
        writeln!(out)?;
        writeln!(
            out,
            "[{}] version {} file {} ({} bytes)",
            group.fingerprint, group.declared_version, group.file_version, group.size
        )?;
        for dir in &group.paths {
            writeln!(out, "  {}", dir.display())?;
        }
    }
    Ok(())
}
