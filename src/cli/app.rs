//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{patch_cmd, snapshot_cmd};
use crate::storage::{Config, Project, StoreApplyError};

/// Exit code when a command found invariant violations
pub const EXIT_VIOLATIONS: u8 = 2;

/// Exit code when the live revision did not match `--if-match`
pub const EXIT_CONFLICT: u8 = 3;

#[derive(Parser)]
#[command(name = "taskpatch")]
#[command(author, version, about = "Deterministic snapshots, diffs and patches for task state")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new taskpatch project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Export, import and check snapshots
    #[command(subcommand)]
    Snapshot(snapshot_cmd::SnapshotCommands),

    /// Create, validate, apply, rebase and summarize patches
    #[command(subcommand)]
    Patch(patch_cmd::PatchCommands),
}

/// A command found invariant violations (already printed)
#[derive(Debug, Error)]
#[error("{count} invariant violation(s) found")]
pub struct ViolationsFound {
    pub count: usize,
}

/// Maps an error to the process exit code
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<ViolationsFound>().is_some() {
            return EXIT_VIOLATIONS;
        }
        if let Some(apply_err) = cause.downcast_ref::<StoreApplyError>() {
            if apply_err.is_conflict() {
                return EXIT_CONFLICT;
            }
        }
    }
    1
}

/// Routes library tracing to stderr; `TASKPATCH_LOG` overrides the level
fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("TASKPATCH_LOG")
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    let format = cli
        .format
        .unwrap_or_else(|| config.global.default_format.into());
    let output = Output::new(format, cli.verbose);

    output.verbose("taskpatch starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing project at: {}", path));
            let project = Project::init(&path)?;
            output.verbose_ctx(
                "init",
                &format!("Created {} directory", project.data_dir().display()),
            );
            output.success(&format!(
                "Initialized taskpatch project at {}",
                project.root().display()
            ));
        }

        Commands::Snapshot(cmd) => snapshot_cmd::run(cmd, &output)?,
        Commands::Patch(cmd) => patch_cmd::run(cmd, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}
