//! The single event type consumed by the Completion Dispatcher (§4.6).
//!
//! Every asynchronous collaborator completion — and the connectivity
//! watcher's tick — becomes one `CompletionEvent`, delivered over a
//! `std::sync::mpsc` channel and drained on the control thread by
//! [`crate::manager::CloneManager::pump_events`]. This unifies the mixed
//! worker-job / done-callback / signal-bus control flow the Design Notes
//! call out into one serial queue.

use clone_collab::RepositoryId;
use clone_collab::traits::TransferOutcome;

/// One asynchronous notification bound for the control thread.
#[derive(Clone, Debug)]
pub enum CompletionEvent {
    /// The connectivity watcher's timer fired; re-examine `CONNECT` tasks.
    WatcherTick,
    /// A transfer handle reported a terminal outcome.
    Transfer(TransferOutcome),
    /// A worktree-indexing job finished.
    Index {
        /// The task it concerns.
        repo_id: RepositoryId,
        /// `Ok(root)` on success, `Err(detail)` on failure.
        result: Result<clone_collab::RootTreeId, String>,
    },
    /// A checkout job finished.
    Checkout {
        /// The task it concerns.
        repo_id: RepositoryId,
        /// Whether it succeeded.
        success: bool,
    },
    /// A merge job finished.
    Merge {
        /// The task it concerns.
        repo_id: RepositoryId,
        /// Whether it succeeded.
        success: bool,
    },
}
