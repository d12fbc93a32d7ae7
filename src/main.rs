//! taskpatch - Deterministic snapshots, diffs and patches for task state

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = taskpatch::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::from(taskpatch::cli::exit_code(&e))
    } else {
        ExitCode::SUCCESS
    }
}
