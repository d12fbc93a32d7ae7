//! Collision-aware rebase
//!
//! Friendly IDs are minted from per-type counters, so two baselines that grew
//! independently can hand out the same `T-00042` to different tasks. Rebase
//! takes a patch computed as `diff(old_base, branch)` and re-expresses it
//! against `new_base`, renumbering the branch's new entities whose friendly
//! IDs collide with IDs already in use.
//!
//! Steps:
//! 1. `branch = apply(old_base, patch)`
//! 2. overlay the branch's entity-level changes (relative to `old_base`) on
//!    top of `new_base`
//! 3. renumber colliding new entities, in UUID order per type
//! 4. `diff(new_base, overlay)` is the rebased patch
//!
//! When `new_base == old_base` the overlay is exactly `branch`, nothing is
//! renumbered, and the rebased patch equals the original.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::apply::{apply, ApplyError};
use super::canonical::{self, CanonicalError};
use super::diff::diff;
use super::id::{max_sequence, FriendlyId, IdError};
use super::patch::Patch;
use super::snapshot::{EntityKind, Snapshot};

#[derive(Debug, Error)]
pub enum RebaseError {
    #[error("Patch does not apply cleanly to its old base: {0}")]
    DoesNotApply(#[source] ApplyError),

    #[error("Cannot renumber {kind} {uuid}: friendly ID '{friendly_id}' is not of the form Letters-digits")]
    MalformedId {
        kind: EntityKind,
        uuid: String,
        friendly_id: String,
    },

    #[error("Cannot renumber {kind} {uuid}: {source}")]
    Sequence {
        kind: EntityKind,
        uuid: String,
        #[source]
        source: IdError,
    },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug, Clone, Copy)]
pub struct RebaseOptions {
    /// Fail on malformed friendly IDs instead of suffixing them
    pub strict: bool,
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// One friendly-ID change made during rebase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub uuid: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebaseOutcome {
    /// The patch, re-expressed against the new base
    pub patch: Patch,

    /// Friendly-ID changes, grouped by entity type
    pub reassignments: BTreeMap<EntityKind, Vec<Reassignment>>,
}

impl RebaseOutcome {
    pub fn reassignment_count(&self) -> usize {
        self.reassignments.values().map(Vec::len).sum()
    }
}

/// Re-targets `patch` from `old_base` onto `new_base`
pub fn rebase(
    patch: &Patch,
    old_base: &Snapshot,
    new_base: &Snapshot,
    options: RebaseOptions,
) -> Result<RebaseOutcome, RebaseError> {
    let branch = apply(old_base, patch).map_err(RebaseError::DoesNotApply)?;

    let mut target = new_base.clone();
    let mut reassignments = BTreeMap::new();

    for kind in EntityKind::ALL {
        let created = overlay(kind, old_base, &branch, &mut target)?;

        if kind.has_friendly_id() && !created.is_empty() {
            let changes = renumber(kind, &created, &branch, &mut target, options)?;
            if !changes.is_empty() {
                reassignments.insert(kind, changes);
            }
        }
    }

    let rebased = diff(new_base, &target)?;
    debug!(
        ops = rebased.len(),
        reassigned = reassignments.values().map(Vec::len).sum::<usize>(),
        "patch rebased"
    );

    Ok(RebaseOutcome {
        patch: rebased,
        reassignments,
    })
}

/// Copies one collection's branch changes onto `target`; returns created keys
fn overlay(
    kind: EntityKind,
    old_base: &Snapshot,
    branch: &Snapshot,
    target: &mut Snapshot,
) -> Result<BTreeSet<String>, CanonicalError> {
    let keys: BTreeSet<&str> = old_base
        .keys(kind)
        .into_iter()
        .chain(branch.keys(kind))
        .collect();
    let mut created = BTreeSet::new();

    for key in keys {
        match (old_base.get(kind, key), branch.get(kind, key)) {
            (None, Some(added)) => {
                target.insert(key, added.to_entity());
                created.insert(key.to_string());
            }
            (Some(_), None) => {
                target.remove(kind, key);
            }
            (Some(before), Some(after)) => {
                if !canonical::content_equal(before, after)? {
                    target.insert(key, after.to_entity());
                }
            }
            (None, None) => {}
        }
    }

    Ok(created)
}

/// Assigns fresh friendly IDs to created entities that collide
fn renumber(
    kind: EntityKind,
    created: &BTreeSet<String>,
    branch: &Snapshot,
    target: &mut Snapshot,
    options: RebaseOptions,
) -> Result<Vec<Reassignment>, RebaseError> {
    let ids = target.friendly_ids(kind);

    // IDs already spoken for: everything in the target except the new entities
    let mut taken: BTreeSet<String> = ids
        .iter()
        .filter(|(key, _)| !created.contains(**key))
        .map(|(_, fid)| fid.to_string())
        .collect();

    // Original IDs of the new entities; replacements must not land on them
    let originals: BTreeSet<String> = branch
        .friendly_ids(kind)
        .into_iter()
        .filter(|(key, _)| created.contains(*key))
        .map(|(_, fid)| fid.to_string())
        .collect();

    // Candidates for the max suffix also include every new entity's original ID
    let mut seen: Vec<String> = taken.iter().cloned().collect();
    seen.extend(originals.iter().cloned());

    let mut changes = Vec::new();

    for key in created {
        let Some(original) = target.friendly_ids(kind).get(key.as_str()).map(|s| s.to_string())
        else {
            continue;
        };

        if !taken.contains(&original) {
            taken.insert(original);
            continue;
        }

        let replacement = match original.parse::<FriendlyId>() {
            Ok(id) => {
                let max = max_sequence(id.prefix(), seen.iter().map(String::as_str))
                    .unwrap_or(id.number());
                id.successor_of(max)
                    .map_err(|source| RebaseError::Sequence {
                        kind,
                        uuid: key.clone(),
                        source,
                    })?
                    .to_string()
            }
            Err(_) if options.strict => {
                return Err(RebaseError::MalformedId {
                    kind,
                    uuid: key.clone(),
                    friendly_id: original,
                })
            }
            Err(_) => suffixed(&original, &taken, &originals).ok_or_else(|| RebaseError::Sequence {
                kind,
                uuid: key.clone(),
                source: IdError::SequenceOverflow(original.clone()),
            })?,
        };

        debug!(%kind, uuid = %key, from = %original, to = %replacement, "friendly ID reassigned");
        target.set_friendly_id(kind, key, &replacement);
        taken.insert(replacement.clone());
        seen.push(replacement.clone());
        changes.push(Reassignment {
            uuid: key.clone(),
            from: original,
            to: replacement,
        });
    }

    Ok(changes)
}

/// First `<original>-N` (N >= 2) neither taken nor another new entity's original
fn suffixed(
    original: &str,
    taken: &BTreeSet<String>,
    originals: &BTreeSet<String>,
) -> Option<String> {
    (2u64..)
        .map(|n| format!("{}-{}", original, n))
        .find(|candidate| !taken.contains(candidate) && !originals.contains(candidate))
}
