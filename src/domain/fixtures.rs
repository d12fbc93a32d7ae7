//! Shared test fixtures for domain unit tests

use chrono::{DateTime, TimeZone, Utc};

use super::entity::{Actor, Container, Task};
use super::snapshot::Snapshot;

pub const ACTOR: &str = "0b5e6c1a-5d2f-4c1e-9a61-000000000001";
pub const CONTAINER: &str = "1c7d2e3f-6e3a-4d2f-8b72-000000000001";
pub const TASK: &str = "2d8e3f40-7f4b-4e3a-9c83-000000000001";

pub fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn actor(friendly_id: &str, handle: &str) -> Actor {
    Actor::new(friendly_id, handle, at())
}

pub fn container(friendly_id: &str, slug: &str) -> Container {
    Container::new(friendly_id, slug, slug.to_uppercase(), ACTOR, at())
}

pub fn task(friendly_id: &str, slug: &str, title: &str, container: &str) -> Task {
    Task::new(friendly_id, slug, title, container, ACTOR, at())
}

/// One actor and one root container
pub fn base() -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.actors.insert(ACTOR.to_string(), actor("A-0001", "ada"));
    snapshot
        .containers
        .insert(CONTAINER.to_string(), container("C-0001", "core"));
    snapshot
}

/// [`base`] plus one task in the container
pub fn with_task() -> Snapshot {
    let mut snapshot = base();
    snapshot.tasks.insert(
        TASK.to_string(),
        task("T-00001", "write-docs", "Write docs", CONTAINER),
    );
    snapshot
}
