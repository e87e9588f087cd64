use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tickflow::config::Config;
use tickflow::store::{MemoryStore, Snapshot};
use tickflow::view::all_root_views;
use tickflow::{tlog, tlog_debug, Error, Result};

/// Tickflow - tick-driven workflow DAG engine
#[derive(Parser, Debug)]
#[command(name = "tickflow")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    TICKFLOW_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.tickflow/tickflow.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print every root in a snapshot as JSON
    Status {
        /// Snapshot file (defaults to state_path from the config)
        snapshot: Option<PathBuf>,
    },

    /// Check a snapshot's edges and memberships
    Validate {
        /// Snapshot file (defaults to state_path from the config)
        snapshot: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tickflow::log::init_with_debug(cli.debug);
    tlog_debug!("tickflow {:?}", cli.command);

    let config = Config::load()?;
    match cli.command {
        Command::Status { snapshot } => run_status(resolve_snapshot(snapshot, &config)?),
        Command::Validate { snapshot } => run_validate(resolve_snapshot(snapshot, &config)?),
        Command::Config => run_config(&config),
    }
}

fn resolve_snapshot(arg: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    arg.or_else(|| config.snapshot_path()).ok_or_else(|| {
        Error::Validation("no snapshot given and no state_path configured".to_string())
    })
}

fn run_status(path: PathBuf) -> Result<()> {
    let store = MemoryStore::load_snapshot(&path)?;
    let views = all_root_views(&store)?;
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

fn run_validate(path: PathBuf) -> Result<()> {
    let snapshot = Snapshot::read(&path)?;
    let problems = snapshot.problems();
    if problems.is_empty() {
        println!(
            "{}: OK ({} tasks, {} roots, {} workspaces)",
            path.display(),
            snapshot.tasks.len(),
            snapshot.roots.len(),
            snapshot.workspaces.len()
        );
        return Ok(());
    }

    for problem in &problems {
        println!("{}", problem);
    }
    tlog!("Validation of {} found {} problem(s)", path.display(), problems.len());
    Err(Error::Validation(format!(
        "{} problem(s) in {}",
        problems.len(),
        path.display()
    )))
}

fn run_config(config: &Config) -> Result<()> {
    println!("# {}", Config::config_path()?.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
