//! Snapshot invariant checks
//!
//! [`validate`] never stops at the first problem: every violation found is
//! returned so a caller can report them all at once. An empty list means the
//! snapshot is valid. Whether violations are fatal is the caller's call.
//!
//! Checks, in reporting order:
//! 1. task -> container references
//! 2. comment -> task and comment -> author references
//! 3. container -> parent references
//! 4. container parent cycles
//! 5. slug uniqueness among siblings (containers per parent, tasks per container)
//! 6. friendly ID uniqueness per entity type
//! 7. actor references (created_by, updated_by, assignee)
//! 8. link endpoints
//! 9. header versions

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::snapshot::{EntityKind, Snapshot};

/// A single broken invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    MissingContainer {
        task: String,
        container: String,
    },
    MissingCommentTask {
        comment: String,
        task: String,
    },
    MissingCommentAuthor {
        comment: String,
        actor: String,
    },
    MissingParent {
        container: String,
        parent: String,
    },
    ContainerCycle {
        container: String,
        repeated: String,
    },
    DuplicateContainerSlug {
        parent: Option<String>,
        slug: String,
        first: String,
        second: String,
    },
    DuplicateTaskSlug {
        container: String,
        slug: String,
        first: String,
        second: String,
    },
    DuplicateFriendlyId {
        kind: EntityKind,
        friendly_id: String,
        first: String,
        second: String,
    },
    MissingActor {
        kind: EntityKind,
        entity: String,
        field: &'static str,
        actor: String,
    },
    MissingLinkTask {
        link: String,
        field: &'static str,
        task: String,
    },
    InvalidMeta {
        field: &'static str,
        value: u32,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingContainer { task, container } => {
                write!(f, "task {} references missing container {}", task, container)
            }
            Violation::MissingCommentTask { comment, task } => {
                write!(f, "comment {} references missing task {}", comment, task)
            }
            Violation::MissingCommentAuthor { comment, actor } => {
                write!(f, "comment {} references missing author {}", comment, actor)
            }
            Violation::MissingParent { container, parent } => {
                write!(f, "container {} references missing parent {}", container, parent)
            }
            Violation::ContainerCycle { container, repeated } => write!(
                f,
                "container {} has a cyclic parent chain (revisits {})",
                container, repeated
            ),
            Violation::DuplicateContainerSlug {
                parent,
                slug,
                first,
                second,
            } => write!(
                f,
                "containers {} and {} share slug '{}' under {}",
                first,
                second,
                slug,
                parent.as_deref().unwrap_or("the root")
            ),
            Violation::DuplicateTaskSlug {
                container,
                slug,
                first,
                second,
            } => write!(
                f,
                "tasks {} and {} share slug '{}' in container {}",
                first, second, slug, container
            ),
            Violation::DuplicateFriendlyId {
                kind,
                friendly_id,
                first,
                second,
            } => write!(
                f,
                "{}s {} and {} share friendly ID {}",
                kind, first, second, friendly_id
            ),
            Violation::MissingActor {
                kind,
                entity,
                field,
                actor,
            } => write!(
                f,
                "{} {} {} references missing actor {}",
                kind, entity, field, actor
            ),
            Violation::MissingLinkTask { link, field, task } => {
                write!(f, "link {} {} references missing task {}", link, field, task)
            }
            Violation::InvalidMeta { field, value } => {
                write!(f, "meta.{} is {} (must be at least 1)", field, value)
            }
        }
    }
}

/// Checks every invariant and returns all violations found
pub fn validate(snapshot: &Snapshot) -> Vec<Violation> {
    let mut violations = Vec::new();

    check_task_containers(snapshot, &mut violations);
    check_comment_refs(snapshot, &mut violations);
    check_parents(snapshot, &mut violations);
    check_cycles(snapshot, &mut violations);
    check_container_slugs(snapshot, &mut violations);
    check_task_slugs(snapshot, &mut violations);
    for kind in EntityKind::ALL {
        check_friendly_ids(snapshot, kind, &mut violations);
    }
    check_actor_refs(snapshot, &mut violations);
    check_links(snapshot, &mut violations);
    check_meta(snapshot, &mut violations);

    violations
}

fn check_task_containers(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    for (key, task) in &snapshot.tasks {
        if !snapshot.containers.contains_key(&task.container) {
            out.push(Violation::MissingContainer {
                task: key.clone(),
                container: task.container.clone(),
            });
        }
    }
}

fn check_comment_refs(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    for (key, comment) in &snapshot.comments {
        if !snapshot.tasks.contains_key(&comment.task) {
            out.push(Violation::MissingCommentTask {
                comment: key.clone(),
                task: comment.task.clone(),
            });
        }
        if !snapshot.actors.contains_key(&comment.author) {
            out.push(Violation::MissingCommentAuthor {
                comment: key.clone(),
                actor: comment.author.clone(),
            });
        }
    }
}

fn check_parents(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    for (key, container) in &snapshot.containers {
        if let Some(parent) = &container.parent {
            if !snapshot.containers.contains_key(parent) {
                out.push(Violation::MissingParent {
                    container: key.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }
}

/// Walks each container's parent chain; a UUID seen twice in one walk is a cycle
fn check_cycles(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    for start in snapshot.containers.keys() {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut current = Some(start.as_str());

        while let Some(key) = current {
            if !visited.insert(key) {
                out.push(Violation::ContainerCycle {
                    container: start.clone(),
                    repeated: key.to_string(),
                });
                break;
            }
            // Missing parents end the walk; they are reported separately.
            current = snapshot
                .containers
                .get(key)
                .and_then(|c| c.parent.as_deref());
        }
    }
}

fn check_container_slugs(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    let mut seen: BTreeMap<(Option<&str>, &str), &str> = BTreeMap::new();

    for (key, container) in &snapshot.containers {
        let scope = (container.parent.as_deref(), container.slug.as_str());
        if let Some(first) = seen.get(&scope) {
            out.push(Violation::DuplicateContainerSlug {
                parent: container.parent.clone(),
                slug: container.slug.clone(),
                first: first.to_string(),
                second: key.clone(),
            });
        } else {
            seen.insert(scope, key);
        }
    }
}

fn check_task_slugs(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    let mut seen: BTreeMap<(&str, &str), &str> = BTreeMap::new();

    for (key, task) in &snapshot.tasks {
        let scope = (task.container.as_str(), task.slug.as_str());
        if let Some(first) = seen.get(&scope) {
            out.push(Violation::DuplicateTaskSlug {
                container: task.container.clone(),
                slug: task.slug.clone(),
                first: first.to_string(),
                second: key.clone(),
            });
        } else {
            seen.insert(scope, key);
        }
    }
}

fn check_friendly_ids(snapshot: &Snapshot, kind: EntityKind, out: &mut Vec<Violation>) {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();

    for (key, friendly_id) in snapshot.friendly_ids(kind) {
        if let Some(first) = seen.get(friendly_id) {
            out.push(Violation::DuplicateFriendlyId {
                kind,
                friendly_id: friendly_id.to_string(),
                first: first.to_string(),
                second: key.to_string(),
            });
        } else {
            seen.insert(friendly_id, key);
        }
    }
}

fn check_actor_refs(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    let mut check = |kind: EntityKind, entity: &str, field: &'static str, actor: &str| {
        if !snapshot.actors.contains_key(actor) {
            out.push(Violation::MissingActor {
                kind,
                entity: entity.to_string(),
                field,
                actor: actor.to_string(),
            });
        }
    };

    for (key, container) in &snapshot.containers {
        check(EntityKind::Container, key, "created_by", &container.created_by);
        check(EntityKind::Container, key, "updated_by", &container.updated_by);
    }
    for (key, task) in &snapshot.tasks {
        check(EntityKind::Task, key, "created_by", &task.created_by);
        check(EntityKind::Task, key, "updated_by", &task.updated_by);
        if let Some(assignee) = &task.assignee {
            check(EntityKind::Task, key, "assignee", assignee);
        }
    }
    for (key, link) in &snapshot.links {
        check(EntityKind::Link, key, "created_by", &link.created_by);
    }
}

fn check_links(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    for (key, link) in &snapshot.links {
        for (field, task) in [("from", &link.from), ("to", &link.to)] {
            if !snapshot.tasks.contains_key(task) {
                out.push(Violation::MissingLinkTask {
                    link: key.clone(),
                    field,
                    task: task.clone(),
                });
            }
        }
    }
}

fn check_meta(snapshot: &Snapshot, out: &mut Vec<Violation>) {
    if snapshot.meta.schema_version < 1 {
        out.push(Violation::InvalidMeta {
            field: "schema_version",
            value: snapshot.meta.schema_version,
        });
    }
    if snapshot.meta.interface_version < 1 {
        out.push(Violation::InvalidMeta {
            field: "interface_version",
            value: snapshot.meta.interface_version,
        });
    }
}
