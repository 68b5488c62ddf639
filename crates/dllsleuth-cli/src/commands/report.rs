use super::crawl;
use anyhow::{Context, Result};
use dllsleuth_core::report::write_csv;
use dllsleuth_core::SleuthConfig;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Write the duplicate map as CSV to `output`, or to `out` when omitted.
pub fn report(
    root: &Path,
    config: SleuthConfig,
    managed_only: bool,
    output: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    let session = crawl(root, config)?;
    let set = session.group()?;
    let map = set.view(managed_only);

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            let rows = write_csv(map, session.identities(), BufWriter::new(file))?;
            info!("Wrote {rows} row(s) to {}", path.display());
            writeln!(out, "Wrote {rows} row(s) to {}", path.display())?;
        }
        None => {
            write_csv(map, session.identities(), out)?;
        }
    }
    Ok(())
}
