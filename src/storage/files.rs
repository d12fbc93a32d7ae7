//! Snapshot and patch files
//!
//! Reads take a shared lock; writes go to a temp file under an exclusive
//! lock and are renamed into place, so readers never see half a file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::debug;

use crate::domain::{self, Patch, Snapshot};

/// Reads a snapshot file (canonical or pretty-printed)
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = read_locked(path)?;
    domain::decode(&bytes).with_context(|| format!("Failed to parse snapshot: {}", path.display()))
}

/// Writes a snapshot file, canonical unless `pretty`
pub fn write_snapshot(path: &Path, snapshot: &Snapshot, pretty: bool) -> Result<()> {
    let bytes = snapshot_bytes(snapshot, pretty)?;
    write_atomic(path, &bytes)
}

/// Encodes a snapshot for output
pub fn snapshot_bytes(snapshot: &Snapshot, pretty: bool) -> Result<Vec<u8>> {
    let bytes = if pretty {
        domain::encode_pretty(snapshot)
    } else {
        domain::encode(snapshot)
    };
    bytes.context("Failed to encode snapshot")
}

/// Reads and structurally checks a patch file
pub fn read_patch(path: &Path) -> Result<Patch> {
    let bytes = read_locked(path)?;
    Patch::from_slice(&bytes).with_context(|| format!("Failed to parse patch: {}", path.display()))
}

/// Writes a patch file (pretty-printed, trailing newline)
pub fn write_patch(path: &Path, patch: &Patch) -> Result<()> {
    let bytes = patch.to_vec_pretty().context("Failed to encode patch")?;
    write_atomic(path, &bytes)
}

fn read_locked(path: &Path) -> Result<Vec<u8>> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    // Acquire shared lock for reading
    file.lock_shared()
        .with_context(|| format!("Failed to acquire read lock on {}", path.display()))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    debug!(path = %path.display(), bytes = bytes.len(), "read file");
    // Lock is released when file is dropped
    Ok(bytes)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let temp = temp_path(path);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .with_context(|| format!("Failed to create temp file: {}", temp.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire write lock on {}", temp.display()))?;

        file.write_all(bytes)
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        file.flush()
            .with_context(|| format!("Failed to flush {}", temp.display()))?;
    }

    fs::rename(&temp, path).with_context(|| {
        format!("Failed to rename {} to {}", temp.display(), path.display())
    })?;

    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Actor, EntityKind, PatchOp};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot
            .actors
            .insert("a1".to_string(), Actor::new("A-0001", "ada", at));
        snapshot
    }

    #[test]
    fn canonical_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");

        write_snapshot(&path, &sample(), false).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes, domain::encode(&sample()).unwrap());
        assert_eq!(read_snapshot(&path).unwrap(), sample());
    }

    #[test]
    fn pretty_snapshot_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("snap.json");

        write_snapshot(&path, &sample(), true).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        assert_eq!(read_snapshot(&path).unwrap(), sample());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn patch_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("change.patch.json");
        let patch = Patch::from(vec![PatchOp::remove(EntityKind::Actor, "a1")]);

        write_patch(&path, &patch).unwrap();
        assert_eq!(read_patch(&path).unwrap(), patch);
    }

    #[test]
    fn errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let err = read_snapshot(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));

        let missing = dir.path().join("missing.json");
        let err = read_patch(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }
}
