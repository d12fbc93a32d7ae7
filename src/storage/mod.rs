//! # Storage Layer
//!
//! Collaborators around the pure domain core: the SQLite live store,
//! storage-facing patch application, snapshot/patch files and configuration.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Live state | SQLite (one table per collection) | `.taskpatch/state.db` |
//! | Snapshots | Canonical JSON (or pretty-printed) | anywhere |
//! | Patches | JSON array of operations | anywhere |
//! | Config | TOML | `.taskpatch/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`Store`] writes the whole state in one transaction
//! - [`apply_to_store`] guards writes with an optional `if-match` revision
//! - Snapshot and patch files are locked with `fs2` and written atomically
//!   (temp file + rename)
//!
//! ## Project Structure
//!
//! ```text
//! .taskpatch/
//! ├── state.db       # Live state (ignored by git)
//! ├── config.toml    # Project configuration
//! └── .gitignore
//! ```

mod apply;
mod config;
mod db;
mod files;
mod project;

pub use apply::{apply_to_store, ApplyOptions, ApplyReport, StoreApplyError};
pub use config::{Config, ConfigError, OutputFormat, ProjectConfig, PROJECT_DIR};
pub use db::{LiveState, Store, StoreError};
pub use files::{read_patch, read_snapshot, snapshot_bytes, write_patch, write_snapshot};
pub use project::{Project, ProjectError};
