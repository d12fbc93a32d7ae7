//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project management | `init` |
//! | Snapshot | Live state export and checks | `snapshot export`, `snapshot verify` |
//! | Patch | Diff, apply and rebase | `patch create`, `patch apply`, `patch rebase` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//! - `yaml` - YAML
//!
//! Snapshot and patch bodies written to stdout are always raw JSON so they
//! can be redirected into files.
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Failure |
//! | 2 | Invariant violations found |
//! | 3 | `--if-match` revision conflict |
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output, or set `TASKPATCH_LOG`:
//! ```bash
//! TASKPATCH_LOG=taskpatch=debug taskpatch patch rebase p.json old.json new.json
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command,
//! then [`exit_code()`] to map a failure to the process exit status.

mod app;
mod output;
mod patch_cmd;
mod snapshot_cmd;

pub use app::{exit_code, run, Cli, Commands, ViolationsFound, EXIT_CONFLICT, EXIT_VIOLATIONS};
pub use output::{Output, OutputFormat};
