//! Snapshot model
//!
//! A [`Snapshot`] is the complete exportable state at one instant: a `meta`
//! header plus one map per collection, keyed by durable UUID. Maps are
//! `BTreeMap`s so iteration (and therefore encoding) is always in byte-wise
//! key order, regardless of how the snapshot was built.
//!
//! Per-collection access goes through [`EntityKind`] with exhaustive matches,
//! so adding a collection is a compile error everywhere it needs handling.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Actor, Comment, Container, Event, Link, Task};

/// Current snapshot schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Current machine-interface version
pub const INTERFACE_VERSION: u32 = 1;

/// Snapshot header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotMeta {
    pub schema_version: u32,

    pub interface_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    /// Content hash (`sha256:<hex>`) of the snapshot with this field cleared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Default for SnapshotMeta {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            interface_version: INTERFACE_VERSION,
            generated_at: None,
            revision: None,
        }
    }
}

/// The five patchable collections
///
/// Declaration order is the collection order used by diffs and encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Actor,
    Container,
    Task,
    Comment,
    Link,
}

impl EntityKind {
    /// All kinds in canonical collection order
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Actor,
        EntityKind::Container,
        EntityKind::Task,
        EntityKind::Comment,
        EntityKind::Link,
    ];

    /// Collection name as used in snapshots and patch paths
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Actor => "actors",
            EntityKind::Container => "containers",
            EntityKind::Task => "tasks",
            EntityKind::Comment => "comments",
            EntityKind::Link => "links",
        }
    }

    /// Singular type name (e.g., `task`)
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Actor => "actor",
            EntityKind::Container => "container",
            EntityKind::Task => "task",
            EntityKind::Comment => "comment",
            EntityKind::Link => "link",
        }
    }

    /// Looks up a kind by collection name
    pub fn from_collection(collection: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == collection)
    }

    /// Friendly-ID prefix minted for this kind, if it carries friendly IDs
    pub fn friendly_prefix(&self) -> Option<&'static str> {
        match self {
            EntityKind::Actor => Some("A"),
            EntityKind::Container => Some("C"),
            EntityKind::Task => Some("T"),
            EntityKind::Comment | EntityKind::Link => None,
        }
    }

    /// Returns true if entries of this kind carry a friendly ID
    pub fn has_friendly_id(&self) -> bool {
        self.friendly_prefix().is_some()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s || k.collection() == s)
            .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

/// An owned entity of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Actor(Actor),
    Container(Container),
    Task(Task),
    Comment(Comment),
    Link(Link),
}

impl Entity {
    /// Decodes a JSON value as an entity of the given kind
    pub fn from_value(kind: EntityKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EntityKind::Actor => Entity::Actor(serde_json::from_value(value)?),
            EntityKind::Container => Entity::Container(serde_json::from_value(value)?),
            EntityKind::Task => Entity::Task(serde_json::from_value(value)?),
            EntityKind::Comment => Entity::Comment(serde_json::from_value(value)?),
            EntityKind::Link => Entity::Link(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.entity_ref().kind()
    }

    pub fn entity_ref(&self) -> EntityRef<'_> {
        match self {
            Entity::Actor(e) => EntityRef::Actor(e),
            Entity::Container(e) => EntityRef::Container(e),
            Entity::Task(e) => EntityRef::Task(e),
            Entity::Comment(e) => EntityRef::Comment(e),
            Entity::Link(e) => EntityRef::Link(e),
        }
    }
}

/// A borrowed entity of any kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Actor(&'a Actor),
    Container(&'a Container),
    Task(&'a Task),
    Comment(&'a Comment),
    Link(&'a Link),
}

impl<'a> EntityRef<'a> {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Actor(_) => EntityKind::Actor,
            EntityRef::Container(_) => EntityKind::Container,
            EntityRef::Task(_) => EntityKind::Task,
            EntityRef::Comment(_) => EntityKind::Comment,
            EntityRef::Link(_) => EntityKind::Link,
        }
    }

    /// Friendly ID, for kinds that carry one
    pub fn friendly_id(&self) -> Option<&'a str> {
        match self {
            EntityRef::Actor(e) => Some(&e.friendly_id),
            EntityRef::Container(e) => Some(&e.friendly_id),
            EntityRef::Task(e) => Some(&e.friendly_id),
            EntityRef::Comment(_) | EntityRef::Link(_) => None,
        }
    }

    /// Clones into an owned entity
    pub fn to_entity(&self) -> Entity {
        match self {
            EntityRef::Actor(e) => Entity::Actor((*e).clone()),
            EntityRef::Container(e) => Entity::Container((*e).clone()),
            EntityRef::Task(e) => Entity::Task((*e).clone()),
            EntityRef::Comment(e) => Entity::Comment((*e).clone()),
            EntityRef::Link(e) => Entity::Link((*e).clone()),
        }
    }

    /// Serializes to a JSON value (object with keys in sorted order)
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            EntityRef::Actor(e) => serde_json::to_value(e),
            EntityRef::Container(e) => serde_json::to_value(e),
            EntityRef::Task(e) => serde_json::to_value(e),
            EntityRef::Comment(e) => serde_json::to_value(e),
            EntityRef::Link(e) => serde_json::to_value(e),
        }
    }

    /// Canonical bytes of this entity alone
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            EntityRef::Actor(e) => serde_json::to_vec(e),
            EntityRef::Container(e) => serde_json::to_vec(e),
            EntityRef::Task(e) => serde_json::to_vec(e),
            EntityRef::Comment(e) => serde_json::to_vec(e),
            EntityRef::Link(e) => serde_json::to_vec(e),
        }
    }
}

/// Complete system state at one instant
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    pub meta: SnapshotMeta,

    #[serde(default)]
    pub actors: BTreeMap<String, Actor>,

    #[serde(default)]
    pub containers: BTreeMap<String, Container>,

    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,

    #[serde(default)]
    pub comments: BTreeMap<String, Comment>,

    #[serde(default)]
    pub links: BTreeMap<String, Link>,

    #[serde(default)]
    pub events: BTreeMap<String, Event>,
}

impl Snapshot {
    /// Creates an empty snapshot at the current schema version
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a collection
    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Actor => self.actors.len(),
            EntityKind::Container => self.containers.len(),
            EntityKind::Task => self.tasks.len(),
            EntityKind::Comment => self.comments.len(),
            EntityKind::Link => self.links.len(),
        }
    }

    /// Number of entities across all collections (events excluded)
    pub fn entity_count(&self) -> usize {
        EntityKind::ALL.iter().map(|k| self.len(*k)).sum()
    }

    /// Returns true if every collection (events included) is empty
    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.iter().all(|k| self.len(*k) == 0) && self.events.is_empty()
    }

    /// Returns true if the collection holds `key`
    pub fn contains(&self, kind: EntityKind, key: &str) -> bool {
        match kind {
            EntityKind::Actor => self.actors.contains_key(key),
            EntityKind::Container => self.containers.contains_key(key),
            EntityKind::Task => self.tasks.contains_key(key),
            EntityKind::Comment => self.comments.contains_key(key),
            EntityKind::Link => self.links.contains_key(key),
        }
    }

    /// Collection keys in sorted order
    pub fn keys(&self, kind: EntityKind) -> Vec<&str> {
        match kind {
            EntityKind::Actor => self.actors.keys().map(String::as_str).collect(),
            EntityKind::Container => self.containers.keys().map(String::as_str).collect(),
            EntityKind::Task => self.tasks.keys().map(String::as_str).collect(),
            EntityKind::Comment => self.comments.keys().map(String::as_str).collect(),
            EntityKind::Link => self.links.keys().map(String::as_str).collect(),
        }
    }

    /// Borrows an entry
    pub fn get(&self, kind: EntityKind, key: &str) -> Option<EntityRef<'_>> {
        match kind {
            EntityKind::Actor => self.actors.get(key).map(EntityRef::Actor),
            EntityKind::Container => self.containers.get(key).map(EntityRef::Container),
            EntityKind::Task => self.tasks.get(key).map(EntityRef::Task),
            EntityKind::Comment => self.comments.get(key).map(EntityRef::Comment),
            EntityKind::Link => self.links.get(key).map(EntityRef::Link),
        }
    }

    /// Inserts (or overwrites) an entry, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, entity: Entity) -> Option<Entity> {
        let key = key.into();
        match entity {
            Entity::Actor(e) => self.actors.insert(key, e).map(Entity::Actor),
            Entity::Container(e) => self.containers.insert(key, e).map(Entity::Container),
            Entity::Task(e) => self.tasks.insert(key, e).map(Entity::Task),
            Entity::Comment(e) => self.comments.insert(key, e).map(Entity::Comment),
            Entity::Link(e) => self.links.insert(key, e).map(Entity::Link),
        }
    }

    /// Removes an entry
    pub fn remove(&mut self, kind: EntityKind, key: &str) -> Option<Entity> {
        match kind {
            EntityKind::Actor => self.actors.remove(key).map(Entity::Actor),
            EntityKind::Container => self.containers.remove(key).map(Entity::Container),
            EntityKind::Task => self.tasks.remove(key).map(Entity::Task),
            EntityKind::Comment => self.comments.remove(key).map(Entity::Comment),
            EntityKind::Link => self.links.remove(key).map(Entity::Link),
        }
    }

    /// Friendly IDs of a collection, keyed by UUID (empty for kinds without them)
    pub fn friendly_ids(&self, kind: EntityKind) -> BTreeMap<&str, &str> {
        match kind {
            EntityKind::Actor => self
                .actors
                .iter()
                .map(|(k, e)| (k.as_str(), e.friendly_id.as_str()))
                .collect(),
            EntityKind::Container => self
                .containers
                .iter()
                .map(|(k, e)| (k.as_str(), e.friendly_id.as_str()))
                .collect(),
            EntityKind::Task => self
                .tasks
                .iter()
                .map(|(k, e)| (k.as_str(), e.friendly_id.as_str()))
                .collect(),
            EntityKind::Comment | EntityKind::Link => BTreeMap::new(),
        }
    }

    /// Overwrites the friendly ID of an entry; false if absent or the kind has none
    pub fn set_friendly_id(&mut self, kind: EntityKind, key: &str, friendly_id: &str) -> bool {
        let slot = match kind {
            EntityKind::Actor => self.actors.get_mut(key).map(|e| &mut e.friendly_id),
            EntityKind::Container => self.containers.get_mut(key).map(|e| &mut e.friendly_id),
            EntityKind::Task => self.tasks.get_mut(key).map(|e| &mut e.friendly_id),
            EntityKind::Comment | EntityKind::Link => None,
        };
        match slot {
            Some(slot) => {
                *slot = friendly_id.to_string();
                true
            }
            None => false,
        }
    }

    /// Slash-joined slug path of a container, root first (e.g., `core/api`)
    ///
    /// Stops at missing parents and at cycles.
    pub fn container_path(&self, key: &str) -> Option<String> {
        let mut segments = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        let mut current = Some(key);

        while let Some(k) = current {
            if !seen.insert(k) {
                break;
            }
            let Some(container) = self.containers.get(k) else {
                break;
            };
            segments.push(container.slug.as_str());
            current = container.parent.as_deref();
        }

        if segments.is_empty() {
            return None;
        }
        segments.reverse();
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures;

    #[test]
    fn kind_collection_names_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_collection(kind.collection()), Some(kind));
            assert_eq!(kind.name().parse::<EntityKind>(), Ok(kind));
        }
        assert_eq!(EntityKind::from_collection("events"), None);
        assert_eq!(EntityKind::from_collection("meta"), None);
    }

    #[test]
    fn insert_get_remove_dispatch_by_kind() {
        let mut snapshot = fixtures::base();
        let task = fixtures::task("T-00009", "extra", "Extra", fixtures::CONTAINER);

        assert!(snapshot.insert("t-new", Entity::Task(task.clone())).is_none());
        assert!(snapshot.contains(EntityKind::Task, "t-new"));
        assert!(!snapshot.contains(EntityKind::Comment, "t-new"));
        assert_eq!(snapshot.get(EntityKind::Task, "t-new"), Some(EntityRef::Task(&task)));

        let removed = snapshot.remove(EntityKind::Task, "t-new");
        assert_eq!(removed, Some(Entity::Task(task)));
        assert!(!snapshot.contains(EntityKind::Task, "t-new"));
    }

    #[test]
    fn friendly_ids_only_for_kinds_that_have_them() {
        let snapshot = fixtures::base();

        assert_eq!(
            snapshot.friendly_ids(EntityKind::Actor).get(fixtures::ACTOR),
            Some(&"A-0001")
        );
        assert!(snapshot.friendly_ids(EntityKind::Comment).is_empty());
    }

    #[test]
    fn set_friendly_id_updates_entry() {
        let mut snapshot = fixtures::with_task();

        assert!(snapshot.set_friendly_id(EntityKind::Task, fixtures::TASK, "T-00077"));
        assert_eq!(snapshot.tasks[fixtures::TASK].friendly_id, "T-00077");
        assert!(!snapshot.set_friendly_id(EntityKind::Task, "missing", "T-1"));
        assert!(!snapshot.set_friendly_id(EntityKind::Link, fixtures::TASK, "L-1"));
    }

    #[test]
    fn container_path_walks_parents() {
        let mut snapshot = fixtures::base();
        let child = fixtures::container("C-0002", "api").with_parent(fixtures::CONTAINER);
        snapshot.containers.insert("c-child".to_string(), child);

        assert_eq!(snapshot.container_path("c-child"), Some("core/api".to_string()));
        assert_eq!(snapshot.container_path("missing"), None);
    }

    #[test]
    fn entity_from_value_uses_kind() {
        let snapshot = fixtures::with_task();
        let value = snapshot.get(EntityKind::Task, fixtures::TASK).unwrap().to_value().unwrap();

        assert!(Entity::from_value(EntityKind::Task, value.clone()).is_ok());
        assert!(Entity::from_value(EntityKind::Actor, value).is_err());
    }
}
