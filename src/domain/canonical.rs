//! Canonical snapshot encoding
//!
//! The canonical form is compact JSON with:
//! - top-level sections in the fixed order `meta, actors, containers, tasks,
//!   comments, links, events`, each omitted when empty
//! - collection keys sorted byte-wise (they are `BTreeMap`s)
//! - entity fields in each struct's declaration order
//! - optional and empty fields omitted, label sets sorted
//!
//! Two structurally equal snapshots always encode to the same bytes, and
//! `encode(decode(encode(x))) == encode(x)`. Hashing and diffing only ever
//! look at these bytes; [`encode_pretty`] is for humans.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::entity::{Actor, Comment, Container, Event, Link, Task};
use super::snapshot::{EntityRef, Snapshot, SnapshotMeta, SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Malformed snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid {field} {value}: must be at least 1")]
    InvalidVersion { field: &'static str, value: u32 },

    #[error("Unsupported schema version {found} (this build understands up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

fn map_is_empty<V>(map: &&BTreeMap<String, V>) -> bool {
    map.is_empty()
}

/// Borrowed view that fixes section order and emptiness rules
#[derive(Serialize)]
struct CanonicalForm<'a> {
    meta: Cow<'a, SnapshotMeta>,

    #[serde(skip_serializing_if = "map_is_empty")]
    actors: &'a BTreeMap<String, Actor>,

    #[serde(skip_serializing_if = "map_is_empty")]
    containers: &'a BTreeMap<String, Container>,

    #[serde(skip_serializing_if = "map_is_empty")]
    tasks: &'a BTreeMap<String, Task>,

    #[serde(skip_serializing_if = "map_is_empty")]
    comments: &'a BTreeMap<String, Comment>,

    #[serde(skip_serializing_if = "map_is_empty")]
    links: &'a BTreeMap<String, Link>,

    #[serde(skip_serializing_if = "map_is_empty")]
    events: &'a BTreeMap<String, Event>,
}

impl<'a> CanonicalForm<'a> {
    fn of(snapshot: &'a Snapshot) -> Self {
        Self::with_meta(snapshot, Cow::Borrowed(&snapshot.meta))
    }

    /// Same snapshot, revision field cleared
    fn unrevisioned(snapshot: &'a Snapshot) -> Self {
        if snapshot.meta.revision.is_none() {
            return Self::of(snapshot);
        }
        let meta = SnapshotMeta {
            revision: None,
            ..snapshot.meta.clone()
        };
        Self::with_meta(snapshot, Cow::Owned(meta))
    }

    fn with_meta(snapshot: &'a Snapshot, meta: Cow<'a, SnapshotMeta>) -> Self {
        Self {
            meta,
            actors: &snapshot.actors,
            containers: &snapshot.containers,
            tasks: &snapshot.tasks,
            comments: &snapshot.comments,
            links: &snapshot.links,
            events: &snapshot.events,
        }
    }
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        CanonicalForm::of(self).serialize(serializer)
    }
}

/// Encodes a snapshot to its canonical bytes
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, CanonicalError> {
    serde_json::to_vec(&CanonicalForm::of(snapshot)).map_err(CanonicalError::Encode)
}

/// Canonical bytes with `meta.revision` cleared (the input to revision hashing)
pub fn encode_unrevisioned(snapshot: &Snapshot) -> Result<Vec<u8>, CanonicalError> {
    serde_json::to_vec(&CanonicalForm::unrevisioned(snapshot)).map_err(CanonicalError::Encode)
}

/// Indented rendering for debugging and review; never hashed or diffed
pub fn encode_pretty(snapshot: &Snapshot) -> Result<Vec<u8>, CanonicalError> {
    let mut bytes =
        serde_json::to_vec_pretty(&CanonicalForm::of(snapshot)).map_err(CanonicalError::Encode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parses a snapshot from canonical or pretty-printed JSON
pub fn decode(bytes: &[u8]) -> Result<Snapshot, CanonicalError> {
    let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(CanonicalError::Decode)?;
    check_meta(&snapshot.meta)?;
    Ok(snapshot)
}

/// Checks the version fields of a snapshot header
pub fn check_meta(meta: &SnapshotMeta) -> Result<(), CanonicalError> {
    if meta.schema_version < 1 {
        return Err(CanonicalError::InvalidVersion {
            field: "schema_version",
            value: meta.schema_version,
        });
    }
    if meta.interface_version < 1 {
        return Err(CanonicalError::InvalidVersion {
            field: "interface_version",
            value: meta.interface_version,
        });
    }
    if meta.schema_version > SCHEMA_VERSION {
        return Err(CanonicalError::UnsupportedSchema {
            found: meta.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(())
}

/// Content equality: true iff both entities encode to identical bytes
pub fn content_equal(a: EntityRef<'_>, b: EntityRef<'_>) -> Result<bool, CanonicalError> {
    if a.kind() != b.kind() {
        return Ok(false);
    }
    let left = a.canonical_bytes().map_err(CanonicalError::Encode)?;
    let right = b.canonical_bytes().map_err(CanonicalError::Encode)?;
    Ok(left == right)
}
