//! Patch commands

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::Serialize;

use super::app::ViolationsFound;
use super::output::Output;
use super::snapshot_cmd::print_violations;
use crate::domain::{self, OpCounts, Patch, RebaseOptions, RebaseOutcome};
use crate::storage::{self, apply_to_store, ApplyOptions, Project, StoreApplyError};

#[derive(Subcommand)]
pub enum PatchCommands {
    /// Compute the patch that turns BASE into TARGET
    Create {
        /// Base snapshot
        base: PathBuf,

        /// Target snapshot
        target: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Check that a patch applies to BASE and the result is valid
    Validate {
        /// Patch file
        patch: PathBuf,

        /// Base snapshot
        base: PathBuf,
    },

    /// Apply a patch to the live state
    Apply {
        /// Patch file
        patch: PathBuf,

        /// Expected live revision (sha256:<hex> or bare hex)
        #[arg(long)]
        if_match: Option<String>,

        /// Compute the result without writing it
        #[arg(long)]
        dry_run: bool,

        /// Refuse results with invariant violations
        #[arg(long, conflicts_with = "lenient")]
        strict: bool,

        /// Write results even if they violate invariants
        #[arg(long)]
        lenient: bool,
    },

    /// Re-express a patch against a newer base, renumbering colliding IDs
    Rebase {
        /// Patch file, computed against OLD_BASE
        patch: PathBuf,

        /// Snapshot the patch was computed against
        old_base: PathBuf,

        /// Snapshot to rebase onto
        new_base: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Fail on malformed friendly IDs
        #[arg(long, conflicts_with = "lenient")]
        strict: bool,

        /// Suffix malformed friendly IDs instead of failing
        #[arg(long)]
        lenient: bool,
    },

    /// Describe a patch in prose, as a table, or as a record
    Summarize {
        /// Patch file
        patch: PathBuf,

        /// Snapshot used to label removed and changed entities
        #[arg(long)]
        base: Option<PathBuf>,

        /// Summary style
        #[arg(long, value_enum, default_value = "prose")]
        style: SummaryStyle,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryStyle {
    Prose,
    Table,
    Record,
}

#[derive(Serialize)]
struct CreateResult<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a Path>,
    operations: usize,
    counts: OpCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    patch: Option<&'a Patch>,
}

#[derive(Serialize)]
struct ValidateResult<'a> {
    valid: bool,
    operations: usize,
    violations: &'a [domain::Violation],
}

#[derive(Serialize)]
struct RebaseResult<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a Path>,
    operations: usize,
    #[serde(flatten)]
    outcome: &'a RebaseOutcome,
}

pub fn run(cmd: PatchCommands, output: &Output) -> Result<()> {
    match cmd {
        PatchCommands::Create {
            base,
            target,
            output: path,
        } => {
            let base = storage::read_snapshot(&base)?;
            let target = storage::read_snapshot(&target)?;
            let patch = domain::diff(&base, &target)?;
            let counts = patch.counts();

            match &path {
                Some(path) => storage::write_patch(path, &patch)?,
                None if !output.is_structured() => write_stdout(&patch)?,
                None => {}
            }

            if output.is_structured() {
                output.data(&CreateResult {
                    path: path.as_deref(),
                    operations: patch.len(),
                    counts,
                    patch: path.is_none().then_some(&patch),
                });
            } else if let Some(path) = &path {
                output.success(&format!(
                    "Wrote {} operation(s) to {} ({})",
                    patch.len(),
                    path.display(),
                    describe_counts(&counts)
                ));
            } else {
                output.verbose_ctx("create", &describe_counts(&counts));
            }
        }

        PatchCommands::Validate { patch, base } => {
            let patch = storage::read_patch(&patch)?;
            let base = storage::read_snapshot(&base)?;

            let result = domain::apply(&base, &patch).context("Patch does not apply to base")?;
            let violations = domain::validate(&result);

            if output.is_structured() {
                output.data(&ValidateResult {
                    valid: violations.is_empty(),
                    operations: patch.len(),
                    violations: &violations,
                });
            } else if violations.is_empty() {
                output.success(&format!(
                    "Patch is valid ({} operation(s))",
                    patch.len()
                ));
            } else {
                print_violations(output, &violations);
            }

            if !violations.is_empty() {
                return Err(ViolationsFound {
                    count: violations.len(),
                }
                .into());
            }
        }

        PatchCommands::Apply {
            patch,
            if_match,
            dry_run,
            strict,
            lenient,
        } => {
            let patch_path = patch;
            let patch = storage::read_patch(&patch_path)?;
            let project = Project::open_current()?;
            let mut store = project.store()?;

            let options = ApplyOptions {
                if_match,
                dry_run,
                strict: resolve_strict(strict, lenient, project.config().project.apply.strict),
            };

            let report = match apply_to_store(&mut store, &patch, &options) {
                Ok(report) => report,
                Err(StoreApplyError::Invalid(violations)) => {
                    print_violations(output, &violations);
                    return Err(ViolationsFound {
                        count: violations.len(),
                    }
                    .into());
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to apply patch: {}", patch_path.display())
                    })
                }
            };

            if output.is_structured() {
                output.data(&report);
            } else {
                let verb = if report.dry_run { "Would apply" } else { "Applied" };
                println!(
                    "{} {} operation(s) ({})",
                    verb,
                    report.operations,
                    describe_counts(&report.counts)
                );
                println!("Revision: {} -> {}", report.base_revision, report.new_revision);
                if !report.violations.is_empty() {
                    eprintln!(
                        "Warning: result violates {} invariant(s):",
                        report.violations.len()
                    );
                    for violation in &report.violations {
                        eprintln!("  - {}", violation);
                    }
                }
            }
        }

        PatchCommands::Rebase {
            patch,
            old_base,
            new_base,
            output: path,
            strict,
            lenient,
        } => {
            let patch = storage::read_patch(&patch)?;
            let old_base = storage::read_snapshot(&old_base)?;
            let new_base = storage::read_snapshot(&new_base)?;

            let config = storage::Config::load()?;
            let options = RebaseOptions {
                strict: resolve_strict(strict, lenient, config.project.rebase.strict),
            };
            let outcome = domain::rebase(&patch, &old_base, &new_base, options)?;

            match &path {
                Some(path) => storage::write_patch(path, &outcome.patch)?,
                None if !output.is_structured() => write_stdout(&outcome.patch)?,
                None => {}
            }

            if output.is_structured() {
                output.data(&RebaseResult {
                    path: path.as_deref(),
                    operations: outcome.patch.len(),
                    outcome: &outcome,
                });
                return Ok(());
            }

            // Reassignments go to stderr when stdout carries the patch
            let lines = reassignment_lines(&outcome);
            match &path {
                Some(path) => {
                    output.success(&format!(
                        "Rebased {} operation(s) to {}",
                        outcome.patch.len(),
                        path.display()
                    ));
                    if !lines.is_empty() {
                        println!();
                        println!("{:<10} {:<12} {:<12} UUID", "TYPE", "FROM", "TO");
                        for line in &lines {
                            println!("{}", line);
                        }
                    }
                }
                None => {
                    for line in &lines {
                        eprintln!("{}", line);
                    }
                }
            }
        }

        PatchCommands::Summarize { patch, base, style } => {
            let patch = storage::read_patch(&patch)?;
            let base = base.as_deref().map(storage::read_snapshot).transpose()?;
            let summary = domain::summarize(&patch, base.as_ref())?;

            match style {
                SummaryStyle::Prose if !output.is_structured() => println!("{}", summary.prose()),
                SummaryStyle::Prose => output.data(&serde_json::json!({
                    "total": summary.total,
                    "summary": summary.prose(),
                })),
                SummaryStyle::Table if !output.is_structured() => print!("{}", summary.table()),
                SummaryStyle::Table | SummaryStyle::Record => output.data(&summary),
            }
        }
    }

    Ok(())
}

/// `--strict` / `--lenient` override the configured default
fn resolve_strict(strict: bool, lenient: bool, configured: bool) -> bool {
    if strict {
        true
    } else if lenient {
        false
    } else {
        configured
    }
}

fn describe_counts(counts: &OpCounts) -> String {
    let mut parts = vec![
        format!("+{}", counts.add),
        format!("~{}", counts.replace),
        format!("-{}", counts.remove),
    ];
    if counts.test > 0 {
        parts.push(format!("?{}", counts.test));
    }
    parts.join(" ")
}

fn reassignment_lines(outcome: &RebaseOutcome) -> Vec<String> {
    outcome
        .reassignments
        .iter()
        .flat_map(|(kind, list)| {
            list.iter().map(move |r| {
                format!("{:<10} {:<12} {:<12} {}", kind.name(), r.from, r.to, r.uuid)
            })
        })
        .collect()
}

fn write_stdout(patch: &Patch) -> Result<()> {
    let bytes = patch.to_vec_pretty().context("Failed to encode patch")?;
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&bytes)
        .and_then(|_| stdout.flush())
        .context("Failed to write patch to stdout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_configured_strictness() {
        assert!(resolve_strict(true, false, false));
        assert!(!resolve_strict(false, true, true));
        assert!(resolve_strict(false, false, true));
        assert!(!resolve_strict(false, false, false));
    }

    #[test]
    fn counts_description() {
        let counts = OpCounts {
            add: 2,
            remove: 1,
            replace: 0,
            test: 0,
        };
        assert_eq!(describe_counts(&counts), "+2 ~0 -1");

        let with_tests = OpCounts { test: 3, ..counts };
        assert_eq!(describe_counts(&with_tests), "+2 ~0 -1 ?3");
    }
}
