//! Patch summaries for humans and LLMs
//!
//! A [`PatchSummary`] counts operations per entity type and lists one
//! [`OpDetail`] per operation, enriched with friendly IDs and labels from the
//! operation's value or, failing that, from an optional base snapshot.
//! Details are sorted by type name, op name, then UUID, so summarizing the
//! same patch twice is byte-identical.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use super::patch::{OpKind, Patch, PatchError, PatchPath};
use super::snapshot::{Entity, EntityKind, EntityRef, Snapshot};

const EXCERPT_LEN: usize = 48;

/// Operation counts for one entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub add: usize,
    pub replace: usize,
    pub remove: usize,

    #[serde(skip_serializing_if = "is_zero")]
    pub test: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl KindCounts {
    fn bump(&mut self, op: OpKind) {
        match op {
            OpKind::Add => self.add += 1,
            OpKind::Replace => self.replace += 1,
            OpKind::Remove => self.remove += 1,
            OpKind::Test => self.test += 1,
        }
    }
}

/// One operation, described
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpDetail {
    pub entity_type: EntityKind,
    pub op: OpKind,
    pub uuid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Field name, for field-level operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// New field value, for field-level operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchSummary {
    pub total: usize,
    pub counts: BTreeMap<EntityKind, KindCounts>,
    pub details: Vec<OpDetail>,
}

/// Summarizes a patch, optionally resolving names against `base`
pub fn summarize(patch: &Patch, base: Option<&Snapshot>) -> Result<PatchSummary, PatchError> {
    let mut counts: BTreeMap<EntityKind, KindCounts> = BTreeMap::new();
    let mut details = Vec::with_capacity(patch.len());

    for (index, op) in patch.iter().enumerate() {
        let target: PatchPath = op.target().map_err(|source| PatchError::Path {
            index,
            path: op.path.clone(),
            source,
        })?;

        counts.entry(target.kind).or_default().bump(op.op);

        let mut detail = OpDetail {
            entity_type: target.kind,
            op: op.op,
            uuid: target.key.clone(),
            friendly_id: None,
            label: None,
            field: None,
            value: None,
        };

        // Entity-level values describe the new state; otherwise fall back to base.
        let from_value = match (&target.field, &op.value) {
            (None, Some(value)) => Entity::from_value(target.kind, value.clone()).ok(),
            _ => None,
        };
        let entity = from_value
            .as_ref()
            .map(Entity::entity_ref)
            .or_else(|| base.and_then(|b| b.get(target.kind, &target.key)));

        if let Some(entity) = entity {
            detail.friendly_id = entity.friendly_id().map(str::to_string);
            detail.label = Some(label(entity, base));
        }

        if let Some(field) = target.field {
            detail.field = Some(field);
            detail.value = op.value.clone();
        }

        details.push(detail);
    }

    details.sort_by(|a, b| {
        (a.entity_type.name(), a.op.name(), &a.uuid).cmp(&(b.entity_type.name(), b.op.name(), &b.uuid))
    });

    Ok(PatchSummary {
        total: patch.len(),
        counts,
        details,
    })
}

/// Human label for an entity: title, slug path, actor name, excerpt or link
fn label(entity: EntityRef<'_>, base: Option<&Snapshot>) -> String {
    match entity {
        EntityRef::Actor(actor) => actor.label().to_string(),
        EntityRef::Container(container) => {
            let parent_path = container
                .parent
                .as_deref()
                .and_then(|parent| base.and_then(|b| b.container_path(parent)));
            join_path(parent_path, &container.slug)
        }
        EntityRef::Task(task) => task.title.clone(),
        EntityRef::Comment(comment) => comment.excerpt(EXCERPT_LEN),
        EntityRef::Link(link) => {
            let name = |uuid: &str| {
                base.and_then(|b| b.tasks.get(uuid))
                    .map(|t| t.friendly_id.clone())
                    .unwrap_or_else(|| uuid.to_string())
            };
            format!("{} {} {}", name(&link.from), link.kind.label(), name(&link.to))
        }
    }
}

fn join_path(parent: Option<String>, slug: &str) -> String {
    match parent {
        Some(parent) => format!("{}/{}", parent, slug),
        None => slug.to_string(),
    }
}

fn plural(n: usize, kind: EntityKind) -> String {
    if n == 1 {
        format!("1 {}", kind.name())
    } else {
        format!("{} {}s", n, kind.name())
    }
}

impl PatchSummary {
    /// One-line description (e.g., `3 operations: 1 task added, 2 comments removed`)
    pub fn prose(&self) -> String {
        if self.total == 0 {
            return "No changes".to_string();
        }

        let mut parts = Vec::new();
        for (kind, counts) in &self.counts {
            for (n, verb) in [
                (counts.add, "added"),
                (counts.replace, "replaced"),
                (counts.remove, "removed"),
                (counts.test, "tested"),
            ] {
                if n > 0 {
                    parts.push(format!("{} {}", plural(n, *kind), verb));
                }
            }
        }

        let noun = if self.total == 1 { "operation" } else { "operations" };
        format!("{} {}: {}", self.total, noun, parts.join(", "))
    }

    /// Column-aligned report: counts per type, then one row per operation
    pub fn table(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "{:<12} {:>5} {:>8} {:>7}", "TYPE", "ADD", "REPLACE", "REMOVE");
        for (kind, counts) in &self.counts {
            let _ = writeln!(
                out,
                "{:<12} {:>5} {:>8} {:>7}",
                kind.name(),
                counts.add,
                counts.replace,
                counts.remove
            );
        }

        if !self.details.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "{:<12} {:<8} {:<12} LABEL", "TYPE", "OP", "ID");
            for detail in &self.details {
                let id = detail.friendly_id.as_deref().unwrap_or(&detail.uuid);
                let mut label = detail.label.clone().unwrap_or_default();
                if let Some(field) = &detail.field {
                    let value = detail
                        .value
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_default();
                    label = format!("{} [{} = {}]", label, field, value).trim().to_string();
                }
                let _ = writeln!(
                    out,
                    "{:<12} {:<8} {:<12} {}",
                    detail.entity_type.name(),
                    detail.op.name(),
                    id,
                    label
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diff::diff;
    use crate::domain::entity::{Comment, Link, LinkKind};
    use crate::domain::fixtures::{self, ACTOR, CONTAINER, TASK};
    use crate::domain::patch::PatchOp;
    use serde_json::json;

    #[test]
    fn counts_and_details_for_added_task() {
        let patch = diff(&fixtures::base(), &fixtures::with_task()).unwrap();
        let summary = summarize(&patch, None).unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.counts[&EntityKind::Task].add, 1);
        let detail = &summary.details[0];
        assert_eq!(detail.friendly_id.as_deref(), Some("T-00001"));
        assert_eq!(detail.label.as_deref(), Some("Write docs"));
        assert_eq!(summary.prose(), "1 operation: 1 task added");
    }

    #[test]
    fn removals_resolve_through_base() {
        let base = fixtures::with_task();
        let patch = Patch::from(vec![PatchOp::remove(EntityKind::Task, TASK)]);

        let bare = summarize(&patch, None).unwrap();
        assert_eq!(bare.details[0].friendly_id, None);

        let enriched = summarize(&patch, Some(&base)).unwrap();
        assert_eq!(enriched.details[0].friendly_id.as_deref(), Some("T-00001"));
        assert_eq!(enriched.details[0].label.as_deref(), Some("Write docs"));
    }

    #[test]
    fn details_sorted_by_type_op_uuid() {
        let mut target = fixtures::with_task();
        target.comments.insert(
            "m1".to_string(),
            Comment::new(TASK, ACTOR, "Looks good\nmore", fixtures::at()),
        );
        target.actors.insert("z".to_string(), fixtures::actor("A-0002", "zed"));
        target.actors.insert("b".to_string(), fixtures::actor("A-0003", "bo"));
        let patch = diff(&fixtures::base(), &target).unwrap();

        let summary = summarize(&patch, None).unwrap();
        let order: Vec<_> = summary
            .details
            .iter()
            .map(|d| (d.entity_type.name(), d.uuid.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("actor", "b"), ("actor", "z"), ("comment", "m1"), ("task", TASK)]
        );
        assert_eq!(summary.details[2].label.as_deref(), Some("Looks good"));
    }

    #[test]
    fn container_label_is_slug_path() {
        let base = fixtures::base();
        let mut target = base.clone();
        target.containers.insert(
            "child".to_string(),
            fixtures::container("C-0002", "api").with_parent(CONTAINER),
        );
        let patch = diff(&base, &target).unwrap();

        let summary = summarize(&patch, Some(&base)).unwrap();
        assert_eq!(summary.details[0].label.as_deref(), Some("core/api"));
    }

    #[test]
    fn link_label_names_both_tasks() {
        let base = fixtures::with_task();
        let link = Link::new(TASK, TASK, LinkKind::Relates, ACTOR, fixtures::at());
        let patch = Patch::from(vec![PatchOp::add(
            EntityKind::Link,
            "l1",
            serde_json::to_value(&link).unwrap(),
        )]);

        let summary = summarize(&patch, Some(&base)).unwrap();
        assert_eq!(
            summary.details[0].label.as_deref(),
            Some("T-00001 relates to T-00001")
        );
    }

    #[test]
    fn field_ops_report_field_and_value() {
        let base = fixtures::with_task();
        let patch = Patch::from(vec![PatchOp::field(
            OpKind::Replace,
            EntityKind::Task,
            TASK,
            "state",
            Some(json!("done")),
        )]);

        let summary = summarize(&patch, Some(&base)).unwrap();
        let detail = &summary.details[0];
        assert_eq!(detail.field.as_deref(), Some("state"));
        assert_eq!(detail.value, Some(json!("done")));
        assert!(summary.table().contains("Write docs [state = \"done\"]"));
    }

    #[test]
    fn summary_is_byte_stable() {
        let patch = diff(&fixtures::base(), &fixtures::with_task()).unwrap();
        let a = serde_json::to_string(&summarize(&patch, None).unwrap()).unwrap();
        let b = serde_json::to_string(&summarize(&patch, None).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_patch() {
        let summary = summarize(&Patch::new(), None).unwrap();
        assert_eq!(summary.prose(), "No changes");
        assert!(summary.details.is_empty());
    }

    #[test]
    fn prose_pluralizes() {
        let patch = Patch::from(vec![
            PatchOp::remove(EntityKind::Comment, "a"),
            PatchOp::remove(EntityKind::Comment, "b"),
            PatchOp::remove(EntityKind::Task, "c"),
        ]);
        let summary = summarize(&patch, None).unwrap();
        assert_eq!(
            summary.prose(),
            "3 operations: 1 task removed, 2 comments removed"
        );
    }
}
