//! taskpatch - Deterministic snapshots, diffs and patches for task state
//!
//! Live task state (actors, containers, tasks, comments, links) is kept in a
//! SQLite store and exchanged as canonical JSON snapshots carrying a content
//! revision. Changes travel as JSON Pointer patches that can be validated,
//! applied under an `if-match` guard, and rebased onto a newer baseline with
//! friendly IDs renumbered on collision.

pub mod cli;
pub mod domain;
pub mod storage;

pub use domain::{
    apply, diff, rebase, validate, Entity, EntityKind, FriendlyId, Patch, PatchOp, Snapshot,
};
