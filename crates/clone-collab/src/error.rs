//! Errors returned by collaborator trait methods.

use thiserror::Error;

/// Errors surfaced by a collaborator (transfer engine, peer layer, repo
/// store, indexer, checkout/merge engines).
///
/// This is deliberately coarse: the clone manager only needs to know
/// whether a collaborator call failed, not the fine-grained reason — the
/// reason is folded into the owning task's `ErrorKind` (see `clone-core`).
#[derive(Debug, Error)]
pub enum CollabError {
    /// The collaborator could not find the thing it was asked to operate on
    /// (a repository record, a peer record, a transfer handle).
    #[error("not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// An I/O error occurred while a collaborator touched the local disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying collaborator backend returned an unclassified
    /// failure. `message` should carry enough context to diagnose it.
    #[error("collaborator backend error: {message}")]
    BackendError {
        /// Freeform error description from the backend.
        message: String,
    },
}
