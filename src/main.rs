//! # Archive Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest collect` | Page every window through the session and decode each chunk |
//! | `harvest process` | Re-decode every stored chunk archive |
//! | `harvest status` | Show each window's resume state |
//! | `harvest plan --total N` | Show the chunks requested for a window with N results |
//! | `harvest completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Collect 2018-2019, extending past the retrieval cap
//! HARVEST_USER=me HARVEST_PASSWORD=secret \
//!     harvest collect --start 2018 --end 2020 --backward
//!
//! # What is left to do?
//! harvest status
//!
//! # Rebuild all records after a parser change
//! harvest process
//! ```

use anyhow::Result;
use archive_harvest::config;
use archive_harvest::fetcher_command::CommandFetcher;
use archive_harvest::pipeline;
use archive_harvest::process;
use archive_harvest::progress::ProgressMode;
use archive_harvest::status;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Archive Harvest: resumable, month-by-month collection of document
/// archives from a paginated search source.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Resumable month-by-month harvesting of a capped, paginated document archive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. A missing file means all
    /// defaults; `HARVEST_*` environment variables override file values.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Log at info level instead of warn (`RUST_LOG` takes precedence).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect every window in the configured year range.
    ///
    /// Windows whose artifacts show they are finished are skipped without
    /// touching the session. Each downloaded chunk is stored and decoded
    /// before the next is requested, so the run can be stopped and resumed
    /// at any time.
    Collect {
        /// Extend capped windows with a descending pass.
        #[arg(long)]
        backward: bool,

        /// First year (inclusive).
        #[arg(long)]
        start: Option<i32>,

        /// Last year (exclusive).
        #[arg(long)]
        end: Option<i32>,
    },

    /// Decode every stored chunk archive into records.
    Process,

    /// Show each window's resume state and artifact counts.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show the chunks requested for a window holding `--total` results.
    Plan {
        #[arg(long)]
        total: u32,

        /// Include the descending pass.
        #[arg(long)]
        backward: bool,
    },

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Plan { total, backward } => {
            status::run_plan(total, backward);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvest", &mut std::io::stdout());
        }
        Commands::Collect {
            backward,
            start,
            end,
        } => {
            let mut cfg = config::load_config(&cli.config)?;
            if backward {
                cfg.collection.backward = true;
            }
            if let Some(start) = start {
                cfg.collection.start_year = start;
            }
            if let Some(end) = end {
                cfg.collection.end_year = end;
            }
            config::validate(&cfg)?;

            let mut fetcher = CommandFetcher::from_config(&cfg)?;
            let summary = pipeline::run_collection(&cfg, &mut fetcher, progress.as_ref()).await?;

            println!(
                "collect {}..{}{}",
                cfg.collection.start_year,
                cfg.collection.end_year,
                if cfg.collection.backward {
                    " (backward)"
                } else {
                    ""
                }
            );
            println!(
                "  windows: {} processed, {} skipped, {} aborted",
                summary.windows_processed, summary.windows_skipped, summary.windows_aborted
            );
            println!(
                "  chunks: {} fetched, {} already stored, {} failed",
                summary.chunks_fetched, summary.chunks_skipped, summary.chunks_failed
            );
            println!(
                "  records: {} written, {} unchanged, {} dropped",
                summary.records_written, summary.records_unchanged, summary.documents_dropped
            );
            if summary.session_restarts > 0 {
                println!("  session restarts: {}", summary.session_restarts);
            }
            println!("ok");
        }
        Commands::Process => {
            let cfg = config::load_config(&cli.config)?;
            let summary = process::process_all(&cfg, progress.as_ref()).await?;
            println!("process {}", cfg.storage.zip_dir().display());
            println!(
                "  archives: {} decoded, {} unreadable",
                summary.archives - summary.failed_archives,
                summary.failed_archives
            );
            println!(
                "  records: {} written, {} unchanged, {} dropped",
                summary.written, summary.unchanged, summary.dropped
            );
            println!("ok");
        }
        Commands::Status { json } => {
            let cfg = config::load_config(&cli.config)?;
            status::run_status(&cfg, json)?;
        }
    }

    Ok(())
}
