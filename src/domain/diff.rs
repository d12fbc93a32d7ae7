//! Structural diff between two snapshots
//!
//! Diffs are entity-granular: any field change becomes one whole-entity
//! `replace`. Operations come out in collection order (actors, containers,
//! tasks, comments, links) and, within a collection, in key order, so the
//! same inputs always produce the same patch. `meta` and `events` are never
//! diffed.

use std::collections::BTreeSet;

use tracing::debug;

use super::canonical::{self, CanonicalError};
use super::patch::{Patch, PatchOp};
use super::snapshot::{EntityKind, Snapshot};

/// Computes the patch that turns `base` into `target`
pub fn diff(base: &Snapshot, target: &Snapshot) -> Result<Patch, CanonicalError> {
    let mut patch = Patch::new();

    for kind in EntityKind::ALL {
        diff_collection(kind, base, target, &mut patch)?;
    }

    debug!(ops = patch.len(), "diff computed");
    Ok(patch)
}

fn diff_collection(
    kind: EntityKind,
    base: &Snapshot,
    target: &Snapshot,
    patch: &mut Patch,
) -> Result<(), CanonicalError> {
    let keys: BTreeSet<&str> = base
        .keys(kind)
        .into_iter()
        .chain(target.keys(kind))
        .collect();

    for key in keys {
        match (base.get(kind, key), target.get(kind, key)) {
            (None, Some(added)) => {
                let value = added.to_value().map_err(CanonicalError::Encode)?;
                patch.push(PatchOp::add(kind, key, value));
            }
            (Some(_), None) => patch.push(PatchOp::remove(kind, key)),
            (Some(before), Some(after)) => {
                if !canonical::content_equal(before, after)? {
                    let value = after.to_value().map_err(CanonicalError::Encode)?;
                    patch.push(PatchOp::replace(kind, key, value));
                }
            }
            (None, None) => {}
        }
    }

    Ok(())
}
