//! The manager's caller-facing error type.
//!
//! This is distinct from [`crate::state::ErrorKind`], which classifies why
//! a *task* failed. `ManagerError` classifies why a *Caller API call*
//! failed (e.g. `add_task` on a name already in use).

use std::path::PathBuf;

use clone_collab::RepositoryId;
use thiserror::Error;

/// Errors returned by [`crate::manager::CloneManager`]'s caller-facing API.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// `add_task` was called for a repository that already has a
    /// non-terminal task (invariant 1).
    #[error("repository '{repo_id}' already has an active clone task")]
    DuplicateTask {
        /// The repository id that collided.
        repo_id: RepositoryId,
    },

    /// `add_task` was called for a repository the repository store already
    /// knows about with a fully-formed local copy.
    #[error("repository '{repo_id}' already exists locally")]
    RepositoryExists {
        /// The repository id that already exists.
        repo_id: RepositoryId,
    },

    /// The resolved worktree's basename does not begin with the repository
    /// display name (§4.2 admission integrity check), or the candidate
    /// path could not be turned into a usable directory name.
    #[error("invalid local directory name for '{path}': {reason}")]
    InvalidDirectoryName {
        /// The path that failed the check.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// The target worktree path collides with another repository or
    /// non-terminal task (invariant 2), and commit mode does not
    /// synthesize alternatives.
    #[error("worktree path '{path}' is already in sync with another repository")]
    WorktreeConflict {
        /// The colliding path.
        path: PathBuf,
    },

    /// A durable store write failed.
    #[error("failed to persist task state for '{repo_id}': {detail}")]
    PersistenceFailure {
        /// The repository id whose row failed to write.
        repo_id: RepositoryId,
        /// The underlying failure.
        detail: String,
    },

    /// The requested repository id has no live task.
    #[error("no task found for repository '{repo_id}'")]
    NotFound {
        /// The repository id that was not found.
        repo_id: RepositoryId,
    },

    /// `remove_task` was called on a task that has not reached a terminal
    /// state.
    #[error("task '{repo_id}' is still in state {state}; only terminal tasks can be removed")]
    NotTerminal {
        /// The repository id of the non-terminal task.
        repo_id: RepositoryId,
        /// Its current state string.
        state: &'static str,
    },

    /// `cancel_task` was called on a task already in a terminal state.
    #[error("task '{repo_id}' is already terminal (state {state}) and cannot be canceled")]
    NotCancelable {
        /// The repository id of the terminal task.
        repo_id: RepositoryId,
        /// Its current state string.
        state: &'static str,
    },
}
