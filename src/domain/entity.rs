//! Entity records
//!
//! One struct per snapshot collection. Field declaration order is the
//! canonical field order for schema version 1; do not reorder fields without
//! bumping [`SCHEMA_VERSION`](super::SCHEMA_VERSION).
//!
//! References between entities are plain UUID strings. Resolving them is the
//! validator's job, not the model's.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

/// Kind of actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    #[default]
    Human,
    Agent,
    System,
}

/// Someone (or something) that creates and edits entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Actor {
    pub friendly_id: String,

    /// Short login-style name
    pub handle: String,

    #[serde(default, skip_serializing_if = "is_blank")]
    pub display_name: Option<String>,

    pub kind: ActorKind,

    /// Optimistic-concurrency counter, bumped on each live mutation
    pub etag: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Actor {
    /// Creates a human actor
    pub fn new(friendly_id: impl Into<String>, handle: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            friendly_id: friendly_id.into(),
            handle: handle.into(),
            display_name: None,
            kind: ActorKind::Human,
            etag: 1,
            created_at: at,
            updated_at: at,
        }
    }

    /// Returns the display name, falling back to the handle
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.handle)
    }
}

/// A node in the container tree (project, area, milestone...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Container {
    pub friendly_id: String,

    /// Unique among containers sharing the same parent
    pub slug: String,

    pub title: String,

    /// Parent container UUID (None for roots)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "is_blank")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,

    pub etag: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl Container {
    /// Creates a root container
    pub fn new(
        friendly_id: impl Into<String>,
        slug: impl Into<String>,
        title: impl Into<String>,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let actor = actor.into();
        Self {
            friendly_id: friendly_id.into(),
            slug: slug.into(),
            title: title.into(),
            parent: None,
            description: None,
            archived: false,
            etag: 1,
            created_at: at,
            updated_at: at,
            created_by: actor.clone(),
            updated_by: actor,
        }
    }

    /// Sets the parent container
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Workflow state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
    Canceled,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Todo => "todo",
            TaskState::InProgress => "in_progress",
            TaskState::Blocked => "blocked",
            TaskState::Done => "done",
            TaskState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Extensible task metadata - free-form key-value pairs, kept in key order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskMeta(BTreeMap<String, serde_json::Value>);

impl TaskMeta {
    /// Creates empty metadata
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Gets a value by key
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Sets a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Removes a value
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    /// Returns true if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all key-value pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// A unit of work inside a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub friendly_id: String,

    /// Unique among tasks of the same container
    pub slug: String,

    pub title: String,

    /// Owning container UUID
    pub container: String,

    pub state: TaskState,

    pub priority: Priority,

    #[serde(default, skip_serializing_if = "is_blank")]
    pub description: Option<String>,

    /// Labels are a set; the sorted form is what gets encoded
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,

    /// Assigned actor UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "TaskMeta::is_empty")]
    pub meta: TaskMeta,

    pub etag: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl Task {
    /// Creates a new todo task in a container
    pub fn new(
        friendly_id: impl Into<String>,
        slug: impl Into<String>,
        title: impl Into<String>,
        container: impl Into<String>,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let actor = actor.into();
        Self {
            friendly_id: friendly_id.into(),
            slug: slug.into(),
            title: title.into(),
            container: container.into(),
            state: TaskState::Todo,
            priority: Priority::Medium,
            description: None,
            labels: BTreeSet::new(),
            assignee: None,
            due_at: None,
            completed_at: None,
            meta: TaskMeta::new(),
            etag: 1,
            created_at: at,
            updated_at: at,
            created_by: actor.clone(),
            updated_by: actor,
        }
    }

    /// Adds a label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }
}

/// A comment on a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comment {
    /// Task UUID
    pub task: String,

    /// Actor UUID
    pub author: String,

    pub body: String,

    pub etag: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        task: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            task: task.into(),
            author: author.into(),
            body: body.into(),
            etag: 1,
            created_at: at,
            updated_at: at,
        }
    }

    /// First line of the body, cut to `max` characters
    pub fn excerpt(&self, max: usize) -> String {
        let line = self.body.lines().next().unwrap_or_default();
        if line.chars().count() > max {
            let cut: String = line.chars().take(max.saturating_sub(3)).collect();
            format!("{}...", cut)
        } else {
            line.to_string()
        }
    }
}

/// Type of relation between two tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// `from` must finish before `to` can start
    #[default]
    Blocks,
    Relates,
    Duplicates,
}

impl LinkKind {
    pub fn label(&self) -> &'static str {
        match self {
            LinkKind::Blocks => "blocks",
            LinkKind::Relates => "relates to",
            LinkKind::Duplicates => "duplicates",
        }
    }
}

/// A directed relation between two tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    /// Source task UUID
    pub from: String,

    /// Target task UUID
    pub to: String,

    pub kind: LinkKind,

    pub etag: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl Link {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: LinkKind,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            etag: 1,
            created_at: at,
            created_by: actor.into(),
        }
    }
}

/// An audit log record
///
/// Events ride along in snapshots for completeness but are never diffed or
/// patched; producers regenerate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Event {
    pub at: DateTime<Utc>,

    /// What happened (e.g., `task.created`)
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// UUID of the entity the event is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}
