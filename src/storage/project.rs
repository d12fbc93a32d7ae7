//! Project management
//!
//! Handles project initialization and provides access to the live store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::PROJECT_DIR;
use super::{Config, Store};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a taskpatch project. Run 'taskpatch init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# taskpatch configuration

# Live database, relative to .taskpatch/ unless absolute
# database = "state.db"

[apply]
# Refuse patches whose result violates invariants
strict = true

[rebase]
# Fail on malformed friendly IDs instead of suffixing them
strict = true

[snapshot]
# Export the indented rendering instead of canonical bytes
pretty = false
"#;

const GITIGNORE: &str = r#"# Live database (export snapshots to share state)
state.db
state.db-*
"#;

/// A taskpatch project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(PROJECT_DIR).is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path (idempotent)
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let data_dir = root.join(PROJECT_DIR);

        fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create {} directory: {}", PROJECT_DIR, data_dir.display())
        })?;

        let config_path = data_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = data_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        let project = Self::open(root)?;
        project.store()?;
        Ok(project)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .taskpatch directory path
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens the live store for this project
    pub fn store(&self) -> Result<Store> {
        let path = self.config.database_path()?;
        Store::open(&path)
            .with_context(|| format!("Failed to open live store: {}", path.display()))
    }
}
