//! Patch model
//!
//! A patch is an ordered JSON array of operations:
//!
//! ```json
//! [
//!   {"op": "test", "path": "/tasks/<uuid>/etag", "value": 3},
//!   {"op": "replace", "path": "/tasks/<uuid>", "value": {...}},
//!   {"op": "remove", "path": "/comments/<uuid>"}
//! ]
//! ```
//!
//! Paths are JSON Pointers into one of the five patchable collections,
//! either at entity level (`/<collection>/<uuid>`) or field level
//! (`/<collection>/<uuid>/<field>`).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::snapshot::EntityKind;

/// Why a patch path could not be resolved
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path must start with '/'")]
    MissingLeadingSlash,

    #[error("path needs at least a collection and a UUID")]
    MissingSegment,

    #[error("path has more than three segments")]
    TooDeep,

    #[error("empty segment")]
    EmptySegment,

    #[error("invalid escape sequence in '{0}'")]
    BadEscape(String),

    #[error("'{0}' is regenerated by producers and cannot be patched")]
    NotPatchable(String),

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Malformed patch: {0}")]
    NotAnArray(#[source] serde_json::Error),

    #[error("Malformed operation #{index}: {source}")]
    Malformed {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Operation #{index} ({op} {path}) requires a value")]
    MissingValue {
        index: usize,
        op: OpKind,
        path: String,
    },

    #[error("Operation #{index} has invalid path '{path}': {source}")]
    Path {
        index: usize,
        path: String,
        #[source]
        source: PathError,
    },

    #[error("Failed to encode patch: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Test,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
            OpKind::Test => "test",
        }
    }

    /// Returns true if the operation carries a `value`
    pub fn needs_value(&self) -> bool {
        !matches!(self, OpKind::Remove)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keeps an explicit `null` distinct from an absent value
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A single patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchOp {
    pub op: OpKind,

    pub path: String,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

impl PatchOp {
    pub fn add(kind: EntityKind, key: &str, value: Value) -> Self {
        Self::entity(OpKind::Add, kind, key, Some(value))
    }

    pub fn remove(kind: EntityKind, key: &str) -> Self {
        Self::entity(OpKind::Remove, kind, key, None)
    }

    pub fn replace(kind: EntityKind, key: &str, value: Value) -> Self {
        Self::entity(OpKind::Replace, kind, key, Some(value))
    }

    pub fn test(kind: EntityKind, key: &str, value: Value) -> Self {
        Self::entity(OpKind::Test, kind, key, Some(value))
    }

    /// Field-level operation (`/<collection>/<uuid>/<field>`)
    pub fn field(op: OpKind, kind: EntityKind, key: &str, field: &str, value: Option<Value>) -> Self {
        let path = PatchPath {
            kind,
            key: key.to_string(),
            field: Some(field.to_string()),
        };
        Self {
            op,
            path: path.to_string(),
            value,
        }
    }

    fn entity(op: OpKind, kind: EntityKind, key: &str, value: Option<Value>) -> Self {
        let path = PatchPath {
            kind,
            key: key.to_string(),
            field: None,
        };
        Self {
            op,
            path: path.to_string(),
            value,
        }
    }

    /// Parses this operation's path
    pub fn target(&self) -> Result<PatchPath, PathError> {
        self.path.parse()
    }
}

/// A resolved patch path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PatchPath {
    pub kind: EntityKind,
    pub key: String,
    pub field: Option<String>,
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> Result<String, PathError> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(PathError::BadEscape(segment.to_string())),
        }
    }
    Ok(out)
}

impl std::str::FromStr for PatchPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix('/').ok_or(PathError::MissingLeadingSlash)?;
        let segments = rest
            .split('/')
            .map(unescape)
            .collect::<Result<Vec<_>, _>>()?;

        if segments.iter().any(String::is_empty) {
            return Err(if segments.len() < 2 {
                PathError::MissingSegment
            } else {
                PathError::EmptySegment
            });
        }

        let collection = segments[0].as_str();
        let kind = match EntityKind::from_collection(collection) {
            Some(kind) => kind,
            None if collection == "meta" || collection == "events" => {
                return Err(PathError::NotPatchable(collection.to_string()))
            }
            None => return Err(PathError::UnknownCollection(collection.to_string())),
        };

        match segments.len() {
            1 => Err(PathError::MissingSegment),
            2 | 3 => Ok(Self {
                kind,
                key: segments[1].clone(),
                field: segments.get(2).cloned(),
            }),
            _ => Err(PathError::TooDeep),
        }
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.kind.collection(), escape(&self.key))?;
        if let Some(field) = &self.field {
            write!(f, "/{}", escape(field))?;
        }
        Ok(())
    }
}

/// Operation counts by type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounts {
    pub add: usize,
    pub remove: usize,
    pub replace: usize,
    pub test: usize,
}

impl OpCounts {
    pub fn total(&self) -> usize {
        self.add + self.remove + self.replace + self.test
    }
}

/// An ordered list of operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOp>);

impl Patch {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchOp> {
        self.0.iter()
    }

    pub fn push(&mut self, op: PatchOp) {
        self.0.push(op);
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    /// Counts operations by type
    pub fn counts(&self) -> OpCounts {
        let mut counts = OpCounts::default();
        for op in &self.0 {
            match op.op {
                OpKind::Add => counts.add += 1,
                OpKind::Remove => counts.remove += 1,
                OpKind::Replace => counts.replace += 1,
                OpKind::Test => counts.test += 1,
            }
        }
        counts
    }

    /// Checks every operation's path and value presence
    pub fn check(&self) -> Result<(), PatchError> {
        for (index, op) in self.0.iter().enumerate() {
            op.target().map_err(|source| PatchError::Path {
                index,
                path: op.path.clone(),
                source,
            })?;
            if op.op.needs_value() && op.value.is_none() {
                return Err(PatchError::MissingValue {
                    index,
                    op: op.op,
                    path: op.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Parses and structurally checks a patch document
    ///
    /// Operations are decoded one at a time so errors name the offending index.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PatchError> {
        let raw: Vec<Value> = serde_json::from_slice(bytes).map_err(PatchError::NotAnArray)?;

        let ops = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value(value)
                    .map_err(|source| PatchError::Malformed { index, source })
            })
            .collect::<Result<Vec<PatchOp>, _>>()?;

        let patch = Self(ops);
        patch.check()?;
        Ok(patch)
    }

    /// Pretty-printed patch document with a trailing newline
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>, PatchError> {
        let mut bytes = serde_json::to_vec_pretty(&self.0).map_err(PatchError::Encode)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl From<Vec<PatchOp>> for Patch {
    fn from(ops: Vec<PatchOp>) -> Self {
        Self(ops)
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
