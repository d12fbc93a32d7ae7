//! Snapshot commands

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::Serialize;

use super::app::ViolationsFound;
use super::output::Output;
use crate::domain::{self, RevisionCheck, Violation};
use crate::storage::{self, LiveState, Project};

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Export the live state as a snapshot
    Export {
        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Write the indented rendering instead of canonical bytes
        #[arg(long)]
        pretty: bool,

        /// Record the export time in `meta.generated_at`
        #[arg(long)]
        timestamp: bool,
    },

    /// Replace the live state with a snapshot file
    Import {
        /// Snapshot file to import
        file: PathBuf,

        /// Import even if the snapshot violates invariants
        #[arg(long)]
        lenient: bool,
    },

    /// Print the revision of a snapshot file
    Hash {
        /// Snapshot file
        file: PathBuf,
    },

    /// Check a snapshot's embedded revision and invariants
    Verify {
        /// Snapshot file
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct ExportResult {
    path: PathBuf,
    revision: String,
    counts: Vec<KindCount>,
}

#[derive(Serialize)]
struct KindCount {
    collection: &'static str,
    count: usize,
}

#[derive(Serialize)]
struct VerifyResult<'a> {
    file: &'a PathBuf,
    #[serde(flatten)]
    revision: &'a RevisionCheck,
    violations: &'a [Violation],
}

pub fn run(cmd: SnapshotCommands, output: &Output) -> Result<()> {
    match cmd {
        SnapshotCommands::Export {
            output: path,
            pretty,
            timestamp,
        } => {
            let project = Project::open_current()?;
            let store = project.store()?;
            let mut snapshot = store.read_live_state()?;

            if timestamp {
                snapshot.meta.generated_at = Some(chrono::Utc::now());
            }
            let revision = domain::stamp_revision(&mut snapshot)?;
            let pretty = pretty || project.config().project.snapshot.pretty;
            output.verbose_ctx("export", &format!("{} entities at {}", snapshot.entity_count(), revision));

            match path {
                Some(path) => {
                    storage::write_snapshot(&path, &snapshot, pretty)?;

                    if output.is_structured() {
                        let counts = store
                            .counts()?
                            .into_iter()
                            .map(|(kind, count)| KindCount {
                                collection: kind.collection(),
                                count,
                            })
                            .collect();
                        output.data(&ExportResult {
                            path,
                            revision,
                            counts,
                        });
                    } else {
                        output.success(&format!(
                            "Exported {} entities to {} ({})",
                            snapshot.entity_count(),
                            path.display(),
                            revision
                        ));
                    }
                }
                None => {
                    let bytes = storage::snapshot_bytes(&snapshot, pretty)?;
                    let mut stdout = std::io::stdout().lock();
                    stdout
                        .write_all(&bytes)
                        .and_then(|_| stdout.flush())
                        .context("Failed to write snapshot to stdout")?;
                }
            }
        }

        SnapshotCommands::Import { file, lenient } => {
            let snapshot = storage::read_snapshot(&file)?;

            let check = domain::verify_revision(&snapshot)?;
            if let RevisionCheck::Mismatch { embedded, computed } = &check {
                bail!(
                    "Snapshot {} was modified after export: embedded {}, computed {}",
                    file.display(),
                    embedded,
                    computed
                );
            }

            let violations = domain::validate(&snapshot);
            if !violations.is_empty() {
                print_violations(output, &violations);
                if !lenient {
                    return Err(ViolationsFound {
                        count: violations.len(),
                    }
                    .into());
                }
            }

            let project = Project::open_current()?;
            let mut store = project.store()?;
            let revision = store.write_live_state(&snapshot)?;

            output.success(&format!(
                "Imported {} entities from {} ({})",
                snapshot.entity_count(),
                file.display(),
                revision
            ));
        }

        SnapshotCommands::Hash { file } => {
            let snapshot = storage::read_snapshot(&file)?;
            let revision = domain::revision(&snapshot)?;

            if output.is_structured() {
                output.data(&serde_json::json!({
                    "file": file,
                    "revision": revision,
                }));
            } else {
                println!("{}", revision);
            }
        }

        SnapshotCommands::Verify { file } => {
            let snapshot = storage::read_snapshot(&file)?;
            let check = domain::verify_revision(&snapshot)?;
            let violations = domain::validate(&snapshot);

            if output.is_structured() {
                output.data(&VerifyResult {
                    file: &file,
                    revision: &check,
                    violations: &violations,
                });
            } else {
                match &check {
                    RevisionCheck::Unstamped { computed } => {
                        println!("Revision: {} (not stamped)", computed)
                    }
                    RevisionCheck::Match { revision } => println!("Revision: {} (ok)", revision),
                    RevisionCheck::Mismatch { embedded, computed } => {
                        println!("Revision: MISMATCH");
                        println!("  embedded: {}", embedded);
                        println!("  computed: {}", computed);
                    }
                }
                if violations.is_empty() {
                    println!("Invariants: ok");
                } else {
                    print_violations(output, &violations);
                }
            }

            if !check.is_ok() {
                bail!("Revision mismatch in {}", file.display());
            }
            if !violations.is_empty() {
                return Err(ViolationsFound {
                    count: violations.len(),
                }
                .into());
            }
        }
    }

    Ok(())
}

/// Lists violations (text) or emits them as data (structured)
pub(super) fn print_violations(output: &Output, violations: &[Violation]) {
    if output.is_structured() {
        output.data(&serde_json::json!({ "violations": violations }));
        return;
    }

    println!("Invariant violations ({}):", violations.len());
    for violation in violations {
        println!("  - {}", violation);
    }
}
