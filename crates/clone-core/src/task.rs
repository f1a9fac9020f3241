//! The in-memory task record and its caller-visible snapshot.

use std::path::PathBuf;

use serde::Serialize;

use clone_collab::{PeerId, RepositoryId, RootTreeId};
use clone_collab::traits::TransferHandle;

use crate::state::{ErrorKind, TaskState};

/// One clone in flight (or terminal). Mutated solely by the manager's state
/// machine and completion dispatcher on the control thread — no other code
/// should hold a `&mut Task`.
#[derive(Clone, Debug)]
pub struct Task {
    /// Repository identity; the dedup/lookup key (invariant 1).
    pub repo_id: RepositoryId,
    /// The peer currently backing this clone.
    pub peer_id: PeerId,
    /// Display name, used by the worktree resolver's basename check.
    pub repo_name: String,
    /// Bearer token for relay calls. Never logged.
    pub token: String,
    /// Encryption password, if the repository is encrypted. Never logged.
    pub password: Option<String>,
    /// The target worktree directory (invariant 2: unique across tasks).
    pub worktree: PathBuf,
    /// Peer network address.
    pub peer_addr: String,
    /// Peer network port.
    pub peer_port: u16,
    /// Owner email, used as the local branch label in three-way merges.
    pub email: String,

    /// Non-empty only while `state` is `Fetch` or transitioning out of it
    /// via `CancelPending` (invariant 3).
    pub transfer_handle: Option<TransferHandle>,
    /// The root-tree id of the pre-existing worktree, set once indexing
    /// completes. Empty until then.
    pub local_root: Option<RootTreeId>,
    /// The root-tree id the transfer fetched, set once `FETCH` succeeds.
    /// Used to set the repository's HEAD and as the remote side of a merge.
    pub remote_root: Option<RootTreeId>,
    /// The identity of whoever authored the fetched head commit, set once
    /// `FETCH` succeeds. Used as the `remote_label` in a full three-way
    /// merge (§4.4).
    pub remote_creator: Option<String>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// The most recent error kind (`Ok` if none).
    pub last_error: ErrorKind,
}

impl Task {
    /// Build a fresh `Init` task for admission. Transient fields start empty.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo_id: RepositoryId,
        peer_id: PeerId,
        repo_name: String,
        token: String,
        password: Option<String>,
        worktree: PathBuf,
        peer_addr: String,
        peer_port: u16,
        email: String,
    ) -> Self {
        Self {
            repo_id,
            peer_id,
            repo_name,
            token,
            password,
            worktree,
            peer_addr,
            peer_port,
            email,
            transfer_handle: None,
            local_root: None,
            remote_root: None,
            remote_creator: None,
            state: TaskState::Init,
            last_error: ErrorKind::Ok,
        }
    }

    /// Immutable, secret-free view of this task for callers.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            repo_id: self.repo_id.clone(),
            peer_id: self.peer_id.clone(),
            repo_name: self.repo_name.clone(),
            worktree: self.worktree.clone(),
            peer_addr: self.peer_addr.clone(),
            peer_port: self.peer_port,
            email: self.email.clone(),
            state: self.state.as_str(),
            error_kind: self.last_error.as_str(),
        }
    }
}

/// A caller-visible, secret-free snapshot of a [`Task`] (`get_task`,
/// `list_tasks`). Distinct from `Task` so callers can never observe (or
/// mutate) the transfer handle, password, or token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    /// Repository identity.
    pub repo_id: RepositoryId,
    /// The peer currently backing this clone.
    pub peer_id: PeerId,
    /// Display name.
    pub repo_name: String,
    /// The target worktree directory.
    pub worktree: PathBuf,
    /// Peer network address.
    pub peer_addr: String,
    /// Peer network port.
    pub peer_port: u16,
    /// Owner email.
    pub email: String,
    /// The exact state string (§3/§6).
    pub state: &'static str,
    /// The exact error-kind string (§3/§6/§7).
    pub error_kind: &'static str,
}
