//! In-memory patch application
//!
//! [`apply`] clones its input and replays operations on the clone in order.
//! The first failing operation aborts the whole apply; the caller's snapshot
//! is never touched, so a failed apply can be retried or inspected freely.
//!
//! Entity-level semantics:
//! - `add` inserts, overwriting any existing entry
//! - `remove` and `replace` require the entry to exist
//! - `test` compares the entry with the value by canonical bytes
//!
//! Field-level operations edit one field of an existing entry and re-decode
//! it, so the result is always a well-formed entity. Field-level `test` also
//! compares canonical bytes, so equal content spelled differently matches.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use super::patch::{OpKind, Patch, PatchOp, PatchPath, PathError};
use super::snapshot::{Entity, EntityKind, Snapshot};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Operation #{index} has invalid path '{path}': {source}")]
    Path {
        index: usize,
        path: String,
        #[source]
        source: PathError,
    },

    #[error("Operation #{index} ({op} {path}) requires a value")]
    MissingValue {
        index: usize,
        op: OpKind,
        path: String,
    },

    #[error("Operation #{index} ({op} {path}): no {kind} with UUID {key}")]
    MissingEntry {
        index: usize,
        op: OpKind,
        path: String,
        kind: EntityKind,
        key: String,
    },

    #[error("Operation #{index} (remove {path}): field '{field}' is not set")]
    MissingField {
        index: usize,
        path: String,
        field: String,
    },

    #[error("Operation #{index} (test {path}) failed: current value differs")]
    TestFailed { index: usize, path: String },

    #[error("Operation #{index} ({op} {path}): not a valid {kind}: {source}")]
    InvalidValue {
        index: usize,
        op: OpKind,
        path: String,
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode entity: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ApplyError {
    /// Index of the failing operation, if the error is tied to one
    pub fn index(&self) -> Option<usize> {
        match self {
            ApplyError::Path { index, .. }
            | ApplyError::MissingValue { index, .. }
            | ApplyError::MissingEntry { index, .. }
            | ApplyError::MissingField { index, .. }
            | ApplyError::TestFailed { index, .. }
            | ApplyError::InvalidValue { index, .. } => Some(*index),
            ApplyError::Encode(_) => None,
        }
    }
}

/// Applies a patch, returning a new snapshot
pub fn apply(snapshot: &Snapshot, patch: &Patch) -> Result<Snapshot, ApplyError> {
    let mut working = snapshot.clone();

    for (index, op) in patch.iter().enumerate() {
        trace!(index, op = %op.op, path = %op.path, "applying operation");
        apply_op(&mut working, index, op)?;
    }

    debug!(ops = patch.len(), "patch applied");
    Ok(working)
}

/// One operation, resolved
struct Step<'a> {
    index: usize,
    op: &'a PatchOp,
    target: PatchPath,
}

impl Step<'_> {
    fn value(&self) -> Result<&Value, ApplyError> {
        self.op.value.as_ref().ok_or_else(|| ApplyError::MissingValue {
            index: self.index,
            op: self.op.op,
            path: self.op.path.clone(),
        })
    }

    fn missing_entry(&self) -> ApplyError {
        ApplyError::MissingEntry {
            index: self.index,
            op: self.op.op,
            path: self.op.path.clone(),
            kind: self.target.kind,
            key: self.target.key.clone(),
        }
    }

    fn test_failed(&self) -> ApplyError {
        ApplyError::TestFailed {
            index: self.index,
            path: self.op.path.clone(),
        }
    }

    fn decode(&self, value: Value) -> Result<Entity, ApplyError> {
        Entity::from_value(self.target.kind, value).map_err(|source| ApplyError::InvalidValue {
            index: self.index,
            op: self.op.op,
            path: self.op.path.clone(),
            kind: self.target.kind,
            source,
        })
    }
}

fn apply_op(state: &mut Snapshot, index: usize, op: &PatchOp) -> Result<(), ApplyError> {
    let target = op.target().map_err(|source| ApplyError::Path {
        index,
        path: op.path.clone(),
        source,
    })?;
    let step = Step { index, op, target };

    match step.target.field.clone() {
        None => apply_entity(state, &step),
        Some(field) => apply_field(state, &step, &field),
    }
}

fn apply_entity(state: &mut Snapshot, step: &Step<'_>) -> Result<(), ApplyError> {
    let kind = step.target.kind;
    let key = step.target.key.as_str();

    match step.op.op {
        OpKind::Add => {
            let entity = step.decode(step.value()?.clone())?;
            state.insert(key, entity);
        }
        OpKind::Replace => {
            let entity = step.decode(step.value()?.clone())?;
            if !state.contains(kind, key) {
                return Err(step.missing_entry());
            }
            state.insert(key, entity);
        }
        OpKind::Remove => {
            state.remove(kind, key).ok_or_else(|| step.missing_entry())?;
        }
        OpKind::Test => {
            let expected = step.value()?;
            let matches = match state.get(kind, key) {
                Some(current) => match Entity::from_value(kind, expected.clone()) {
                    Ok(expected) => {
                        let left = current.canonical_bytes().map_err(ApplyError::Encode)?;
                        let right = expected
                            .entity_ref()
                            .canonical_bytes()
                            .map_err(ApplyError::Encode)?;
                        left == right
                    }
                    Err(_) => false,
                },
                None => expected.is_null(),
            };
            if !matches {
                return Err(step.test_failed());
            }
        }
    }
    Ok(())
}

fn apply_field(state: &mut Snapshot, step: &Step<'_>, field: &str) -> Result<(), ApplyError> {
    let kind = step.target.kind;
    let key = step.target.key.as_str();

    let current = state.get(kind, key).ok_or_else(|| step.missing_entry())?;
    let mut fields: Map<String, Value> =
        serde_json::from_value(current.to_value().map_err(ApplyError::Encode)?)
            .map_err(ApplyError::Encode)?;

    match step.op.op {
        OpKind::Test => {
            let expected = step.value()?;
            if fields.get(field).unwrap_or(&Value::Null) == expected {
                return Ok(());
            }

            // Content-equal spellings (set order, UTC offsets) match after re-encoding
            set_field(&mut fields, field, expected);
            let matches = match Entity::from_value(kind, Value::Object(fields)) {
                Ok(candidate) => {
                    let left = current.canonical_bytes().map_err(ApplyError::Encode)?;
                    let right = candidate
                        .entity_ref()
                        .canonical_bytes()
                        .map_err(ApplyError::Encode)?;
                    left == right
                }
                Err(_) => false,
            };
            if !matches {
                return Err(step.test_failed());
            }
            return Ok(());
        }
        OpKind::Add | OpKind::Replace => set_field(&mut fields, field, step.value()?),
        OpKind::Remove => {
            if fields.remove(field).is_none() {
                return Err(ApplyError::MissingField {
                    index: step.index,
                    path: step.op.path.clone(),
                    field: field.to_string(),
                });
            }
        }
    }

    let entity = step.decode(Value::Object(fields))?;
    state.insert(key, entity);
    Ok(())
}

/// Sets a field; `null` clears it
fn set_field(fields: &mut Map<String, Value>, field: &str, value: &Value) {
    if value.is_null() {
        fields.remove(field);
    } else {
        fields.insert(field.to_string(), value.clone());
    }
}
