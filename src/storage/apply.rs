//! Applying patches to the live store
//!
//! Load live state, check the optional `if-match` revision, apply in memory,
//! validate, then write everything back in one transaction. A dry run stops
//! before the write but still reports the revision the state would have.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::db::{LiveState, StoreError};
use crate::domain::{
    self, apply, normalize_revision, validate, ApplyError, CanonicalError, OpCounts, Patch,
    Violation,
};

#[derive(Debug, Error)]
pub enum StoreApplyError {
    /// Live state moved since the patch was computed; re-diff and retry
    #[error("Revision conflict: expected {expected}, live state is at {actual}")]
    Conflict { expected: String, actual: String },

    #[error(transparent)]
    Patch(#[from] ApplyError),

    #[error("Patched state violates {} invariant(s)", .0.len())]
    Invalid(Vec<Violation>),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

impl StoreApplyError {
    /// Returns true for `if-match` conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreApplyError::Conflict { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Expected live revision (`sha256:<hex>` or bare hex)
    pub if_match: Option<String>,

    /// Compute the result without writing it
    pub dry_run: bool,

    /// Refuse results with invariant violations
    pub strict: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            if_match: None,
            dry_run: false,
            strict: true,
        }
    }
}

/// Outcome of a store apply
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub operations: usize,
    pub counts: OpCounts,
    pub base_revision: String,
    pub new_revision: String,
    pub dry_run: bool,

    /// Violations tolerated in lenient mode
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

/// Applies a patch to live state
pub fn apply_to_store<S: LiveState>(
    store: &mut S,
    patch: &Patch,
    options: &ApplyOptions,
) -> Result<ApplyReport, StoreApplyError> {
    let expected = options.if_match.as_deref().map(normalize_revision);

    // Cheap pre-check against the cached revision
    if let (Some(expected), Some(cached)) = (&expected, store.live_revision()?) {
        if *expected != cached {
            return Err(StoreApplyError::Conflict {
                expected: expected.clone(),
                actual: cached,
            });
        }
    }

    let live = store.read_live_state()?;
    let base_revision = domain::revision(&live)?;

    if let Some(expected) = expected {
        if expected != base_revision {
            return Err(StoreApplyError::Conflict {
                expected,
                actual: base_revision,
            });
        }
    }

    let patched = apply(&live, patch)?;

    let violations = validate(&patched);
    if !violations.is_empty() {
        if options.strict {
            return Err(StoreApplyError::Invalid(violations));
        }
        debug!(count = violations.len(), "ignoring violations (lenient)");
    }

    let new_revision = if options.dry_run {
        domain::revision(&patched)?
    } else {
        store.write_live_state(&patched)?
    };

    info!(
        ops = patch.len(),
        base = %base_revision,
        new = %new_revision,
        dry_run = options.dry_run,
        "patch applied to store"
    );

    Ok(ApplyReport {
        operations: patch.len(),
        counts: patch.counts(),
        base_revision,
        new_revision,
        dry_run: options.dry_run,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{diff, Actor, Container, EntityKind, PatchOp, Snapshot, Task};
    use crate::storage::Store;
    use chrono::{TimeZone, Utc};

    const ACTOR: &str = "a1";
    const CONTAINER: &str = "c1";

    fn base() -> Snapshot {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot
            .actors
            .insert(ACTOR.to_string(), Actor::new("A-0001", "ada", at));
        snapshot.containers.insert(
            CONTAINER.to_string(),
            Container::new("C-0001", "core", "Core", ACTOR, at),
        );
        snapshot
    }

    fn with_task(key: &str, container: &str) -> Snapshot {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let mut snapshot = base();
        snapshot.tasks.insert(
            key.to_string(),
            Task::new("T-00001", "docs", "Docs", container, ACTOR, at),
        );
        snapshot
    }

    fn seeded() -> (Store, String) {
        let mut store = Store::open_in_memory().unwrap();
        let revision = store.write_live_state(&base()).unwrap();
        (store, revision)
    }

    #[test]
    fn applies_and_reports_new_revision() {
        let (mut store, base_rev) = seeded();
        let patch = diff(&base(), &with_task("t1", CONTAINER)).unwrap();

        let report = apply_to_store(&mut store, &patch, &ApplyOptions::default()).unwrap();

        assert_eq!(report.operations, 1);
        assert_eq!(report.counts.add, 1);
        assert_eq!(report.base_revision, base_rev);
        assert_ne!(report.new_revision, base_rev);
        assert!(!report.dry_run);
        assert_eq!(store.live_revision().unwrap(), Some(report.new_revision));
        assert_eq!(store.read_live_state().unwrap().tasks.len(), 1);
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let (mut store, base_rev) = seeded();
        let target = with_task("t1", CONTAINER);
        let patch = diff(&base(), &target).unwrap();
        let options = ApplyOptions {
            dry_run: true,
            ..ApplyOptions::default()
        };

        let report = apply_to_store(&mut store, &patch, &options).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.new_revision, domain::revision(&target).unwrap());
        assert_eq!(store.live_revision().unwrap(), Some(base_rev));
        assert!(store.read_live_state().unwrap().tasks.is_empty());
    }

    #[test]
    fn if_match_accepts_current_revision_in_any_form() {
        let (mut store, base_rev) = seeded();
        let patch = diff(&base(), &with_task("t1", CONTAINER)).unwrap();
        let bare = base_rev.trim_start_matches("sha256:").to_uppercase();
        let options = ApplyOptions {
            if_match: Some(bare),
            ..ApplyOptions::default()
        };

        assert!(apply_to_store(&mut store, &patch, &options).is_ok());
    }

    #[test]
    fn stale_if_match_is_a_conflict() {
        let (mut store, base_rev) = seeded();
        let patch = diff(&base(), &with_task("t1", CONTAINER)).unwrap();
        let options = ApplyOptions {
            if_match: Some("sha256:0000".to_string()),
            ..ApplyOptions::default()
        };

        let err = apply_to_store(&mut store, &patch, &options).unwrap_err();
        assert!(err.is_conflict());
        match err {
            StoreApplyError::Conflict { expected, actual } => {
                assert_eq!(expected, "sha256:0000");
                assert_eq!(actual, base_rev);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.read_live_state().unwrap().tasks.is_empty());
    }

    #[test]
    fn strict_mode_rejects_violations() {
        let (mut store, base_rev) = seeded();
        let patch = diff(&base(), &with_task("t1", "missing-container")).unwrap();

        let err = apply_to_store(&mut store, &patch, &ApplyOptions::default()).unwrap_err();
        match err {
            StoreApplyError::Invalid(violations) => assert_eq!(violations.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.live_revision().unwrap(), Some(base_rev));
    }

    #[test]
    fn lenient_mode_reports_violations_and_writes() {
        let (mut store, _) = seeded();
        let patch = diff(&base(), &with_task("t1", "missing-container")).unwrap();
        let options = ApplyOptions {
            strict: false,
            ..ApplyOptions::default()
        };

        let report = apply_to_store(&mut store, &patch, &options).unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(store.read_live_state().unwrap().tasks.len(), 1);
    }

    #[test]
    fn failing_operation_writes_nothing() {
        let (mut store, base_rev) = seeded();
        let patch = Patch::from(vec![
            PatchOp::remove(EntityKind::Container, CONTAINER),
            PatchOp::remove(EntityKind::Task, "ghost"),
        ]);

        let err = apply_to_store(&mut store, &patch, &ApplyOptions::default()).unwrap_err();
        assert!(matches!(err, StoreApplyError::Patch(_)));
        assert!(!err.is_conflict());
        assert_eq!(store.live_revision().unwrap(), Some(base_rev));
        assert_eq!(store.read_live_state().unwrap().containers.len(), 1);
    }
}
