//! DllSleuth: duplicate DLL finder and consolidator.
//!
//! Thin binary entry point. All logic lives in the `dllsleuth-core`
//! and `dllsleuth-cli` crates.

use clap::Parser;
use dllsleuth_cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so reports on stdout stay machine-readable.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("DllSleuth {} starting", env!("CARGO_PKG_VERSION"));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    dllsleuth_cli::run(cli, &mut out)
}
