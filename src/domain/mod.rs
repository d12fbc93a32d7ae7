//! Domain models for taskpatch
//!
//! The snapshot/patch core: entity model, canonical encoding, revision
//! hashing, validation, diff, apply, rebase and summaries. Nothing in here
//! touches the filesystem or the database.

mod apply;
mod canonical;
mod diff;
mod entity;
mod hash;
mod id;
mod patch;
mod rebase;
mod snapshot;
mod summary;
mod validate;

#[cfg(test)]
mod fixtures;

pub use apply::{apply, ApplyError};
pub use canonical::{check_meta, content_equal, decode, encode, encode_pretty, encode_unrevisioned, CanonicalError};
pub use diff::diff;
pub use entity::{Actor, ActorKind, Comment, Container, Event, Link, LinkKind, Priority, Task, TaskMeta, TaskState};
pub use hash::{content_hash, normalize_revision, revision, stamp_revision, verify_revision, RevisionCheck, REVISION_PREFIX};
pub use id::{max_sequence, FriendlyId, IdError};
pub use patch::{OpCounts, OpKind, Patch, PatchError, PatchOp, PatchPath, PathError};
pub use rebase::{rebase, Reassignment, RebaseError, RebaseOptions, RebaseOutcome};
pub use snapshot::{Entity, EntityKind, EntityRef, Snapshot, SnapshotMeta, INTERFACE_VERSION, SCHEMA_VERSION};
pub use summary::{summarize, KindCounts, OpDetail, PatchSummary};
pub use validate::{validate, Violation};
