//! SQLite live state
//!
//! The live store sits in `.taskpatch/state.db`. Each collection has its own
//! table with the relational columns queries need (friendly ID, parent and
//! owner references) plus the entity's canonical JSON document, which is
//! the source of truth when a snapshot is rebuilt.
//!
//! Writes replace the whole state inside one transaction and cache the new
//! revision in `state_meta`, so `if-match` checks can usually skip a full
//! snapshot build.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    self, CanonicalError, Entity, EntityKind, EntityRef, Event, Snapshot, SnapshotMeta,
    INTERFACE_VERSION, SCHEMA_VERSION,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row {uuid} in {table}: {source}")]
    Corrupt {
        table: &'static str,
        uuid: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {uuid} for {table}: {source}")]
    Encode {
        table: &'static str,
        uuid: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database schema version {found} is newer than this build supports ({supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Access to the live state a patch is applied against
pub trait LiveState {
    /// Builds a snapshot of the current live state
    fn read_live_state(&self) -> Result<Snapshot, StoreError>;

    /// Replaces the live state in one transaction; returns the new revision
    fn write_live_state(&mut self, snapshot: &Snapshot) -> Result<String, StoreError>;

    /// Cached revision of the live state, if one has been recorded
    fn live_revision(&self) -> Result<Option<String>, StoreError>;
}

/// SQLite-backed live state
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Schema version - bump when tables change
    const SCHEMA_VERSION: i32 = 1;

    /// Opens (or creates) the store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets readers continue while an apply commits
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut store = Self { conn };
        store.ensure_schema()?;
        debug!(path = %path.display(), "opened live store");

        Ok(store)
    }

    /// Opens a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Number of stored entries per collection
    pub fn counts(&self) -> Result<Vec<(EntityKind, usize)>, StoreError> {
        EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let sql = format!("SELECT COUNT(*) FROM {}", table(kind));
                let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
                Ok((kind, usize::try_from(n).unwrap_or(0)))
            })
            .collect()
    }

    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        let current: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        match current {
            0 => self.create_schema(),
            v if v == Self::SCHEMA_VERSION => Ok(()),
            found => Err(StoreError::UnsupportedSchema {
                found,
                supported: Self::SCHEMA_VERSION,
            }),
        }
    }

    fn create_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS actors (
                uuid TEXT PRIMARY KEY,
                friendly_id TEXT NOT NULL,
                handle TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS containers (
                uuid TEXT PRIMARY KEY,
                friendly_id TEXT NOT NULL,
                parent TEXT,
                slug TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                uuid TEXT PRIMARY KEY,
                friendly_id TEXT NOT NULL,
                container TEXT NOT NULL,
                slug TEXT NOT NULL,
                state TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                uuid TEXT PRIMARY KEY,
                task TEXT NOT NULL,
                author TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS links (
                uuid TEXT PRIMARY KEY,
                from_task TEXT NOT NULL,
                to_task TEXT NOT NULL,
                kind TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                uuid TEXT PRIMARY KEY,
                at TEXT NOT NULL,
                action TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS state_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_containers_parent ON containers(parent);
            CREATE INDEX IF NOT EXISTS idx_tasks_container ON tasks(container);
            CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state);
            CREATE INDEX IF NOT EXISTS idx_comments_task ON comments(task);
            CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_task);
            CREATE INDEX IF NOT EXISTS idx_links_to ON links(to_task);
            CREATE INDEX IF NOT EXISTS idx_events_at ON events(at);
            ",
        )?;

        self.conn.execute(
            &format!("PRAGMA user_version = {}", Self::SCHEMA_VERSION),
            [],
        )?;

        Ok(())
    }

    fn meta_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM state_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn version(&self, key: &str, default: u32) -> Result<u32, StoreError> {
        Ok(self
            .meta_value(key)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    fn read_collection(&self, kind: EntityKind, snapshot: &mut Snapshot) -> Result<(), StoreError> {
        let name = table(kind);
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT uuid, doc FROM {} ORDER BY uuid", name))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (uuid, doc) = row?;
            let entity = serde_json::from_str(&doc)
                .and_then(|value| Entity::from_value(kind, value))
                .map_err(|source| StoreError::Corrupt {
                    table: name,
                    uuid: uuid.clone(),
                    source,
                })?;
            snapshot.insert(uuid, entity);
        }

        Ok(())
    }

    fn read_events(&self, snapshot: &mut Snapshot) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, doc FROM events ORDER BY at, uuid")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (uuid, doc) = row?;
            let event: Event = serde_json::from_str(&doc).map_err(|source| StoreError::Corrupt {
                table: "events",
                uuid: uuid.clone(),
                source,
            })?;
            snapshot.events.insert(uuid, event);
        }

        Ok(())
    }
}

/// Table backing a collection
fn table(kind: EntityKind) -> &'static str {
    kind.collection()
}

fn doc<T: Serialize>(table: &'static str, uuid: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Encode {
        table,
        uuid: uuid.to_string(),
        source,
    })
}

fn insert_entity(tx: &Transaction<'_>, uuid: &str, entity: EntityRef<'_>) -> Result<(), StoreError> {
    match entity {
        EntityRef::Actor(actor) => {
            tx.prepare_cached(
                "INSERT INTO actors (uuid, friendly_id, handle, doc) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                uuid,
                actor.friendly_id,
                actor.handle,
                doc("actors", uuid, actor)?
            ])?;
        }
        EntityRef::Container(container) => {
            tx.prepare_cached(
                "INSERT INTO containers (uuid, friendly_id, parent, slug, doc) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                uuid,
                container.friendly_id,
                container.parent,
                container.slug,
                doc("containers", uuid, container)?
            ])?;
        }
        EntityRef::Task(task) => {
            tx.prepare_cached(
                "INSERT INTO tasks (uuid, friendly_id, container, slug, state, doc) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                uuid,
                task.friendly_id,
                task.container,
                task.slug,
                task.state.to_string(),
                doc("tasks", uuid, task)?
            ])?;
        }
        EntityRef::Comment(comment) => {
            tx.prepare_cached(
                "INSERT INTO comments (uuid, task, author, doc) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                uuid,
                comment.task,
                comment.author,
                doc("comments", uuid, comment)?
            ])?;
        }
        EntityRef::Link(link) => {
            tx.prepare_cached(
                "INSERT INTO links (uuid, from_task, to_task, kind, doc) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                uuid,
                link.from,
                link.to,
                link.kind.label(),
                doc("links", uuid, link)?
            ])?;
        }
    }
    Ok(())
}

/// The live view of a snapshot: same content, no export-only header fields
fn live_view(snapshot: &Snapshot) -> Snapshot {
    let mut live = snapshot.clone();
    live.meta = SnapshotMeta {
        schema_version: snapshot.meta.schema_version,
        interface_version: snapshot.meta.interface_version,
        generated_at: None,
        revision: None,
    };
    live
}

impl LiveState for Store {
    fn read_live_state(&self) -> Result<Snapshot, StoreError> {
        let mut snapshot = Snapshot::new();
        snapshot.meta.schema_version = self.version("schema_version", SCHEMA_VERSION)?;
        snapshot.meta.interface_version = self.version("interface_version", INTERFACE_VERSION)?;

        for kind in EntityKind::ALL {
            self.read_collection(kind, &mut snapshot)?;
        }
        self.read_events(&mut snapshot)?;

        debug!(
            actors = snapshot.actors.len(),
            containers = snapshot.containers.len(),
            tasks = snapshot.tasks.len(),
            "read live state"
        );
        Ok(snapshot)
    }

    fn write_live_state(&mut self, snapshot: &Snapshot) -> Result<String, StoreError> {
        let live = live_view(snapshot);
        let revision = domain::revision(&live)?;

        let tx = self.conn.transaction()?;

        for kind in EntityKind::ALL {
            tx.execute(&format!("DELETE FROM {}", table(kind)), [])?;
        }
        tx.execute("DELETE FROM events", [])?;

        for kind in EntityKind::ALL {
            for uuid in live.keys(kind) {
                if let Some(entity) = live.get(kind, uuid) {
                    insert_entity(&tx, uuid, entity)?;
                }
            }
        }

        {
            let mut stmt =
                tx.prepare("INSERT INTO events (uuid, at, action, doc) VALUES (?1, ?2, ?3, ?4)")?;
            for (uuid, event) in &live.events {
                stmt.execute(params![
                    uuid,
                    event.at.to_rfc3339(),
                    event.action,
                    doc("events", uuid, event)?
                ])?;
            }
        }

        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO state_meta (key, value) VALUES (?1, ?2)")?;
            stmt.execute(params!["schema_version", live.meta.schema_version.to_string()])?;
            stmt.execute(params!["interface_version", live.meta.interface_version.to_string()])?;
            stmt.execute(params!["revision", revision])?;
        }

        tx.commit()?;

        debug!(%revision, "wrote live state");
        Ok(revision)
    }

    fn live_revision(&self) -> Result<Option<String>, StoreError> {
        self.meta_value("revision")
    }
}
