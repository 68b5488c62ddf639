/// DllSleuth command-line frontend.
///
/// Every command builds one [`CrawlSession`](dllsleuth_core::CrawlSession)
/// for its root, crawls it and works on the result. All substantive logic
/// lives in `dllsleuth-core`; this crate only parses arguments and formats
/// output, writing to any `io::Write` so tests can capture it.
pub mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "dllsleuth",
    version,
    about = "Find and consolidate duplicate DLLs",
    long_about = None
)]
pub struct Cli {
    /// JSON settings file; missing keys take their defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RootArgs {
    /// Directory tree to crawl.
    pub root: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl a tree and summarise its duplicate names.
    Scan {
        #[command(flatten)]
        root: RootArgs,

        /// List only names whose first instance is managed.
        #[arg(long, default_value_t = false)]
        managed: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Count names by number of instances.
    Counts {
        #[command(flatten)]
        root: RootArgs,

        /// Largest instance count reported individually.
        #[arg(long, default_value_t = 5)]
        max: usize,

        /// Also list the names with exactly this many instances.
        #[arg(long)]
        names: Option<usize>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the fingerprint subgroups of one file name.
    Detail {
        #[command(flatten)]
        root: RootArgs,

        /// File name, e.g. `newtonsoft.json.dll` (case-insensitive).
        name: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Write the duplicate map as CSV.
    Report {
        #[command(flatten)]
        root: RootArgs,

        /// Report the managed view instead of every duplicate name.
        #[arg(long, default_value_t = false)]
        managed: bool,

        /// Destination file; standard output when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace managed duplicates of one name with links to a cached copy.
    Consolidate {
        #[command(flatten)]
        root: RootArgs,

        /// File name to consolidate (case-insensitive).
        name: String,

        /// Directory that receives the cache folder; defaults to the root.
        #[arg(long)]
        cache_base: Option<PathBuf>,
    },
}

/// Execute `cli`, writing command output to `out`.
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Scan {
            root,
            managed,
            json,
        } => commands::scan(&root.root, config, managed, json, out),
        Command::Counts {
            root,
            max,
            names,
            json,
        } => commands::counts(&root.root, config, max, names, json, out),
        Command::Detail { root, name, json } => {
            commands::detail(&root.root, config, &name, json, out)
        }
        Command::Report {
            root,
            managed,
            output,
        } => commands::report(&root.root, config, managed, output.as_deref(), out),
        Command::Consolidate {
            root,
            name,
            cache_base,
        } => commands::consolidate(&root.root, config, &name, cache_base.as_deref(), out),
    }
}
