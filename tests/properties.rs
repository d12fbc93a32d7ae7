//! Property tests for the snapshot/patch core

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::Value;

use taskpatch::domain::{
    self, Actor, ActorKind, Comment, Container, Event, Link, LinkKind, Priority, RebaseOptions,
    Snapshot, Task, TaskState,
};

const ACTOR: &str = "actor-0";
const CONTAINER: &str = "container-0";

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn base() -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot
        .actors
        .insert(ACTOR.to_string(), Actor::new("A-0001", "ada", at()));
    snapshot.containers.insert(
        CONTAINER.to_string(),
        Container::new("C-0001", "core", "Core", ACTOR, at()),
    );
    snapshot
}

/// Task slugged by its key, so slugs never collide when friendly IDs do
fn new_task(key: &str, number: usize, title: &str, state: TaskState) -> Task {
    let mut task = Task::new(format!("T-{:05}", number), key, title, CONTAINER, ACTOR, at());
    task.state = state;
    task
}

// =============================================================================
// Strategies
// =============================================================================

fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_600_000_000i64..1_900_000_000, 0u32..1000)
        .prop_map(|(secs, millis)| Utc.timestamp_opt(secs, millis * 1_000_000).unwrap())
}

fn state() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        Just(TaskState::Todo),
        Just(TaskState::InProgress),
        Just(TaskState::Blocked),
        Just(TaskState::Done),
        Just(TaskState::Canceled),
    ]
}

fn priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Urgent),
    ]
}

fn actor_kind() -> impl Strategy<Value = ActorKind> {
    prop_oneof![Just(ActorKind::Human), Just(ActorKind::Agent), Just(ActorKind::System)]
}

fn link_kind() -> impl Strategy<Value = LinkKind> {
    prop_oneof![
        Just(LinkKind::Blocks),
        Just(LinkKind::Relates),
        Just(LinkKind::Duplicates),
    ]
}

/// Any finite float, subnormals and signed zero included
fn finite_f64() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        finite_f64().prop_map(Value::from),
        "[ -~]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(2, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::from),
            json_object(inner),
        ]
    })
}

fn json_object(values: impl Strategy<Value = Value>) -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,4}", values, 0..3)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

#[derive(Debug, Clone)]
struct ActorSeed {
    handle: String,
    display_name: Option<String>,
    kind: ActorKind,
    at: DateTime<Utc>,
}

prop_compose! {
    fn actor_seed()(
        handle in "[a-z]{1,8}",
        display_name in prop::option::of("[A-Za-z ]{1,12}"),
        kind in actor_kind(),
        at in timestamp(),
    ) -> ActorSeed {
        ActorSeed { handle, display_name, kind, at }
    }
}

#[derive(Debug, Clone)]
struct ContainerSeed {
    slug: String,
    title: String,
    description: Option<String>,
    archived: bool,
    parent: Option<Index>,
}

prop_compose! {
    fn container_seed()(
        slug in "[a-z]{1,8}",
        title in "[ -~]{1,16}",
        description in prop::option::of("[ -~]{1,24}"),
        archived in any::<bool>(),
        parent in prop::option::of(any::<Index>()),
    ) -> ContainerSeed {
        ContainerSeed { slug, title, description, archived, parent }
    }
}

#[derive(Debug, Clone)]
struct TaskSeed {
    title: String,
    state: TaskState,
    priority: Priority,
    description: Option<String>,
    labels: BTreeSet<String>,
    assignee: Option<Index>,
    due_at: Option<DateTime<Utc>>,
    meta: BTreeMap<String, Value>,
    container: Index,
}

prop_compose! {
    fn task_seed()(
        title in "[ -~]{1,16}",
        state in state(),
        priority in priority(),
        description in prop::option::of("[ -~]{1,24}"),
        labels in prop::collection::btree_set("[a-z]{1,6}", 0..3),
        assignee in prop::option::of(any::<Index>()),
        due_at in prop::option::of(timestamp()),
        meta in prop::collection::btree_map("[a-z]{1,6}", json_value(), 0..3),
        container in any::<Index>(),
    ) -> TaskSeed {
        TaskSeed { title, state, priority, description, labels, assignee, due_at, meta, container }
    }
}

prop_compose! {
    fn event_seed()(
        at in timestamp(),
        action in "[a-z]{1,8}\\.[a-z]{1,8}",
        with_actor in any::<bool>(),
        payload in prop::option::of(json_object(json_value())),
    ) -> Event {
        Event {
            at,
            action,
            actor: with_actor.then(|| ACTOR.to_string()),
            entity: None,
            payload,
        }
    }
}

/// Every collection populated: optional fields, labels, float-bearing meta, events
fn snapshot() -> impl Strategy<Value = Snapshot> {
    (
        prop::collection::vec(actor_seed(), 1..3),
        prop::collection::vec(container_seed(), 1..3),
        prop::collection::vec(task_seed(), 0..5),
        prop::collection::vec(("[ -~]{1,24}", any::<Index>(), any::<Index>()), 0..3),
        prop::collection::vec((link_kind(), any::<Index>(), any::<Index>()), 0..3),
        prop::collection::vec(event_seed(), 0..3),
    )
        .prop_map(|(actors, containers, tasks, comments, links, events)| {
            let mut snapshot = Snapshot::new();
            let actor_keys: Vec<String> = (0..actors.len()).map(|i| format!("actor-{}", i)).collect();
            let container_keys: Vec<String> =
                (0..containers.len()).map(|i| format!("container-{}", i)).collect();
            let task_keys: Vec<String> = (0..tasks.len()).map(|i| format!("task-{}", i)).collect();

            for (i, seed) in actors.into_iter().enumerate() {
                let mut actor = Actor::new(format!("A-{:04}", i + 1), seed.handle, seed.at);
                actor.display_name = seed.display_name;
                actor.kind = seed.kind;
                snapshot.actors.insert(actor_keys[i].clone(), actor);
            }

            for (i, seed) in containers.into_iter().enumerate() {
                let mut container =
                    Container::new(format!("C-{:04}", i + 1), seed.slug, seed.title, ACTOR, at());
                container.description = seed.description;
                container.archived = seed.archived;
                // Parents only point backwards, so containers never form cycles
                if i > 0 {
                    container.parent = seed.parent.map(|p| container_keys[p.index(i)].clone());
                }
                snapshot.containers.insert(container_keys[i].clone(), container);
            }

            for (i, seed) in tasks.into_iter().enumerate() {
                let container = &container_keys[seed.container.index(container_keys.len())];
                let mut task = Task::new(
                    format!("T-{:05}", i + 1),
                    task_keys[i].clone(),
                    seed.title,
                    container.clone(),
                    ACTOR,
                    at(),
                );
                task.state = seed.state;
                task.priority = seed.priority;
                task.description = seed.description;
                task.labels = seed.labels;
                task.assignee = seed.assignee.map(|a| actor_keys[a.index(actor_keys.len())].clone());
                task.due_at = seed.due_at;
                for (key, value) in seed.meta {
                    task.meta.set(key, value);
                }
                snapshot.tasks.insert(task_keys[i].clone(), task);
            }

            if !task_keys.is_empty() {
                for (i, (body, task, author)) in comments.into_iter().enumerate() {
                    let comment = Comment::new(
                        task_keys[task.index(task_keys.len())].clone(),
                        actor_keys[author.index(actor_keys.len())].clone(),
                        body,
                        at(),
                    );
                    snapshot.comments.insert(format!("comment-{}", i), comment);
                }
                for (i, (kind, from, to)) in links.into_iter().enumerate() {
                    let link = Link::new(
                        task_keys[from.index(task_keys.len())].clone(),
                        task_keys[to.index(task_keys.len())].clone(),
                        kind,
                        ACTOR,
                        at(),
                    );
                    snapshot.links.insert(format!("link-{}", i), link);
                }
            }

            for (i, event) in events.into_iter().enumerate() {
                snapshot.events.insert(format!("event-{}", i), event);
            }

            snapshot
        })
}

/// A snapshot and a descendant: some tasks dropped, some retitled, some added
fn snapshot_and_edit() -> impl Strategy<Value = (Snapshot, Snapshot)> {
    snapshot().prop_flat_map(|before| {
        let n = before.tasks.len();
        (
            Just(before),
            prop::collection::vec((any::<bool>(), prop::option::of("[a-z]{1,8}")), n),
            prop::collection::vec("[A-Za-z ]{1,12}", 0..4),
        )
            .prop_map(|(before, edits, added)| {
                let mut after = before.clone();
                let keys: Vec<String> = before.tasks.keys().cloned().collect();
                for (key, (keep, retitle)) in keys.iter().zip(edits) {
                    if !keep {
                        after.tasks.remove(key);
                    } else if let (Some(title), Some(task)) = (retitle, after.tasks.get_mut(key)) {
                        task.title = title;
                    }
                }
                for (j, title) in added.iter().enumerate() {
                    let key = format!("b-{:04}", j);
                    let task = new_task(&key, keys.len() + j + 1, title, TaskState::Todo);
                    after.tasks.insert(key, task);
                }
                (before, after)
            })
    })
}

/// Changes exactly one field (or adds one event); every choice alters content
fn change_one_field(snapshot: &mut Snapshot, choice: usize) {
    let Some(task) = snapshot.tasks.values_mut().next() else {
        return;
    };

    match choice {
        0 => task.title.push('!'),
        1 => {
            task.state = if task.state == TaskState::Done {
                TaskState::Todo
            } else {
                TaskState::Done
            }
        }
        2 => {
            task.priority = if task.priority == Priority::Urgent {
                Priority::Low
            } else {
                Priority::Urgent
            }
        }
        // Generated labels never contain '-'
        3 => {
            task.labels.insert("new-label".to_string());
        }
        // Generated meta keys are at most six characters
        4 => task.meta.set("estimate", 0.1),
        5 => task.due_at = if task.due_at.is_some() { None } else { Some(at()) },
        6 => task.etag += 1,
        7 => {
            if let Some(actor) = snapshot.actors.values_mut().next() {
                actor.handle.push('x');
            }
        }
        8 => {
            if let Some(container) = snapshot.containers.values_mut().next() {
                container.archived = !container.archived;
            }
        }
        _ => {
            snapshot.events.insert(
                "event-new".to_string(),
                Event {
                    at: at(),
                    action: "task.touched".to_string(),
                    actor: None,
                    entity: None,
                    payload: None,
                },
            );
        }
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn encoding_is_deterministic(snapshot in snapshot()) {
        let bytes = domain::encode(&snapshot).unwrap();
        prop_assert_eq!(&bytes, &domain::encode(&snapshot.clone()).unwrap());

        let decoded = domain::decode(&bytes).unwrap();
        prop_assert_eq!(&decoded, &snapshot);
        prop_assert_eq!(domain::encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn floats_roundtrip_through_meta_and_payloads(values in prop::collection::vec(finite_f64(), 1..8)) {
        let mut snapshot = base();
        let mut task = new_task("task-0", 1, "Estimate", TaskState::Todo);
        for (i, value) in values.iter().enumerate() {
            task.meta.set(format!("f{}", i), *value);
        }
        snapshot.tasks.insert("task-0".to_string(), task);
        snapshot.events.insert(
            "event-0".to_string(),
            Event {
                at: at(),
                action: "task.estimated".to_string(),
                actor: None,
                entity: None,
                payload: Some(Value::from(values.clone())),
            },
        );

        let bytes = domain::encode(&snapshot).unwrap();
        let decoded = domain::decode(&bytes).unwrap();
        prop_assert_eq!(domain::encode(&decoded).unwrap(), bytes);
        prop_assert_eq!(domain::revision(&decoded).unwrap(), domain::revision(&snapshot).unwrap());
    }

    #[test]
    fn revision_is_stable(snapshot in snapshot()) {
        prop_assert_eq!(
            domain::revision(&snapshot).unwrap(),
            domain::revision(&snapshot.clone()).unwrap()
        );
    }

    #[test]
    fn revision_changes_with_any_field(mut snapshot in snapshot(), choice in 0usize..10) {
        if snapshot.tasks.is_empty() {
            snapshot.tasks.insert("task-0".to_string(), new_task("task-0", 1, "Only", TaskState::Todo));
        }
        let before = domain::revision(&snapshot).unwrap();

        let mut changed = snapshot.clone();
        change_one_field(&mut changed, choice);
        prop_assert_ne!(before, domain::revision(&changed).unwrap());
    }

    #[test]
    fn stamping_does_not_change_revision(snapshot in snapshot()) {
        let mut stamped = snapshot.clone();
        let revision = domain::stamp_revision(&mut stamped).unwrap();
        prop_assert_eq!(&revision, &domain::revision(&snapshot).unwrap());
        prop_assert!(domain::verify_revision(&stamped).unwrap().is_ok());

        let reparsed = domain::decode(&domain::encode(&stamped).unwrap()).unwrap();
        prop_assert!(domain::verify_revision(&reparsed).unwrap().is_ok());
    }

    #[test]
    fn diff_of_identical_snapshots_is_empty(snapshot in snapshot()) {
        prop_assert!(domain::diff(&snapshot, &snapshot).unwrap().is_empty());
    }

    #[test]
    fn apply_inverts_diff(a in snapshot(), b in snapshot()) {
        let patch = domain::diff(&a, &b).unwrap();
        let result = domain::apply(&a, &patch).unwrap();
        prop_assert_eq!(domain::encode(&result).unwrap(), domain::encode(&b).unwrap());
    }

    #[test]
    fn rebase_onto_same_base_is_identity((before, after) in snapshot_and_edit()) {
        let patch = domain::diff(&before, &after).unwrap();
        let outcome = domain::rebase(&patch, &before, &before, RebaseOptions::default()).unwrap();

        prop_assert_eq!(outcome.reassignment_count(), 0);
        prop_assert_eq!(outcome.patch, patch);
    }

    #[test]
    fn rebase_resolves_every_collision(
        shared in 0usize..4,
        upstream_new in 0usize..4,
        ours_new in 0usize..4,
    ) {
        let mut old_base = base();
        for i in 0..shared {
            let key = format!("s-{:04}", i);
            let task = new_task(&key, i + 1, "Shared", TaskState::Todo);
            old_base.tasks.insert(key, task);
        }

        let mut upstream = old_base.clone();
        for i in 0..upstream_new {
            let key = format!("u-{:04}", i);
            let task = new_task(&key, shared + i + 1, "Theirs", TaskState::Todo);
            upstream.tasks.insert(key, task);
        }

        let mut ours = old_base.clone();
        for i in 0..ours_new {
            let key = format!("o-{:04}", i);
            let task = new_task(&key, shared + i + 1, "Ours", TaskState::Todo);
            ours.tasks.insert(key, task);
        }

        let patch = domain::diff(&old_base, &ours).unwrap();
        let outcome = domain::rebase(&patch, &old_base, &upstream, RebaseOptions::default()).unwrap();
        prop_assert_eq!(outcome.reassignment_count(), upstream_new.min(ours_new));

        let result = domain::apply(&upstream, &outcome.patch).unwrap();
        prop_assert_eq!(result.tasks.len(), shared + upstream_new + ours_new);

        let ids: BTreeSet<&str> = result.tasks.values().map(|t| t.friendly_id.as_str()).collect();
        prop_assert_eq!(ids.len(), result.tasks.len());

        for (key, task) in &upstream.tasks {
            prop_assert_eq!(&result.tasks[key].friendly_id, &task.friendly_id);
        }
        prop_assert!(domain::validate(&result).is_empty());
    }
}
