//! The durable Task Store (§4.1).
//!
//! Holds exactly the non-terminal tasks: a row exists iff invariant 4
//! holds. Backed by SQLite via `rusqlite`, with parameterized statements
//! throughout (§9: "String-formatted SQL: not safe").

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use clone_collab::{PeerId, RepositoryId};

/// One durable row: everything needed to rehydrate a [`crate::task::Task`]
/// at restart, minus the transient fields that are never persisted (state,
/// error kind, transfer handle, indexed root — §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRow {
    /// Repository identity; primary key.
    pub repo_id: RepositoryId,
    /// Display name.
    pub repo_name: String,
    /// Bearer token.
    pub token: String,
    /// The peer backing this clone (`dest_id` column).
    pub peer_id: PeerId,
    /// Target worktree path (`worktree_parent` column).
    pub worktree: PathBuf,
    /// Encryption password, if any (`passwd` column, nullable).
    pub password: Option<String>,
    /// Peer address (`server_addr` column).
    pub peer_addr: String,
    /// Peer port (`server_port` column; stored as text per §6).
    pub peer_port: u16,
    /// Owner email.
    pub email: String,
}

/// Errors from durable store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database returned a failure.
    #[error("task store I/O failure: {0}")]
    Backend(#[from] rusqlite::Error),
}

/// Durable persistence for non-terminal tasks.
///
/// `upsert`/`delete` must be durable before returning success (§4.1). A
/// failed `upsert` at admission aborts admission; a failed `delete` during
/// a terminal transition is logged but not retried (the in-memory terminal
/// state still holds — §4.1 "Failure").
pub trait TaskStore: Send + Sync {
    /// Replace the row keyed by `repo_id` atomically.
    fn upsert(&self, row: &TaskRow) -> Result<(), StoreError>;

    /// Remove the row for `repo_id`. A no-op (not an error) if no such row
    /// exists.
    fn delete(&self, repo_id: &RepositoryId) -> Result<(), StoreError>;

    /// Invoke `callback` exactly once per row, in unspecified order.
    fn scan_all(&self, callback: &mut dyn FnMut(TaskRow)) -> Result<(), StoreError>;
}

/// SQLite-backed [`TaskStore`].
///
/// Wraps the connection in a `Mutex` purely to satisfy `Send + Sync` for
/// `Arc<dyn TaskStore>` sharing — all real access happens from the single
/// control thread (§5), so the mutex is never contended in practice.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (creating if absent) the SQLite database at `path` and ensure
    /// the `tasks` table exists.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the file cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory store, for tests.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the in-memory database cannot be
    /// created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                repo_id         TEXT PRIMARY KEY,
                repo_name       TEXT NOT NULL,
                token           TEXT NOT NULL,
                dest_id         TEXT NOT NULL,
                worktree_parent TEXT NOT NULL,
                passwd          TEXT,
                server_addr     TEXT NOT NULL,
                server_port     TEXT NOT NULL,
                email           TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    #[allow(clippy::significant_drop_tightening)]
    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R, rusqlite::Error>) -> Result<R, StoreError> {
        let guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard).map_err(StoreError::from)
    }
}

impl TaskStore for SqliteTaskStore {
    fn upsert(&self, row: &TaskRow) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks
                    (repo_id, repo_name, token, dest_id, worktree_parent, passwd, server_addr, server_port, email)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(repo_id) DO UPDATE SET
                    repo_name = excluded.repo_name,
                    token = excluded.token,
                    dest_id = excluded.dest_id,
                    worktree_parent = excluded.worktree_parent,
                    passwd = excluded.passwd,
                    server_addr = excluded.server_addr,
                    server_port = excluded.server_port,
                    email = excluded.email",
                params![
                    row.repo_id.as_str(),
                    row.repo_name,
                    row.token,
                    row.peer_id.as_str(),
                    row.worktree.to_string_lossy(),
                    row.password,
                    row.peer_addr,
                    row.peer_port.to_string(),
                    row.email,
                ],
            )?;
            Ok(())
        })
    }

    fn delete(&self, repo_id: &RepositoryId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM tasks WHERE repo_id = ?1",
                params![repo_id.as_str()],
            )?;
            Ok(())
        })
    }

    fn scan_all(&self, callback: &mut dyn FnMut(TaskRow)) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT repo_id, repo_name, token, dest_id, worktree_parent, passwd, server_addr, server_port, email
                 FROM tasks",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let repo_id_s: String = row.get(0)?;
                let repo_name: String = row.get(1)?;
                let token: String = row.get(2)?;
                let dest_id_s: String = row.get(3)?;
                let worktree_s: String = row.get(4)?;
                let passwd: Option<String> = row.get(5)?;
                let server_addr: String = row.get(6)?;
                let server_port_s: String = row.get(7)?;
                let email: String = row.get(8)?;

                let Ok(repo_id) = RepositoryId::new(repo_id_s) else {
                    continue;
                };
                let Ok(peer_id) = PeerId::new(dest_id_s) else {
                    continue;
                };
                let peer_port = server_port_s.parse().unwrap_or(0);

                callback(TaskRow {
                    repo_id,
                    repo_name,
                    token,
                    peer_id,
                    worktree: PathBuf::from(worktree_s),
                    password: passwd,
                    peer_addr: server_addr,
                    peer_port,
                    email,
                });
            }
            Ok(())
        })
    }
}

/// Look up a single row by id, convenience wrapper used by the manager when
/// re-reading a row it just wrote (e.g. test assertions). Not part of the
/// trait: production code should not need point lookups beyond `scan_all`.
#[cfg(test)]
pub(crate) fn row_exists(store: &SqliteTaskStore, repo_id: &RepositoryId) -> Result<bool, StoreError> {
    store.with_conn(|conn| {
        conn.query_row(
            "SELECT 1 FROM tasks WHERE repo_id = ?1",
            params![repo_id.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
    })
}
