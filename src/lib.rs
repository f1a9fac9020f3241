//! Clone task lifecycle engine: durable, resumable acquisition of remote
//! versioned repositories onto the local host.
//!
//! This crate is a thin re-export shim over `clone-core` (the engine) and
//! `clone-collab` (the collaborator trait vocabulary) — see each crate's
//! own documentation for the implementation. Host processes depend on this
//! crate, construct real collaborator implementations, and hand them to
//! [`CloneManager::new`].

pub use clone_collab::traits::{
    CheckoutCallback, CheckoutEngine, CryptoContext, Indexer, IndexHandle, JobRunner,
    MergeEngines, MergeOutcome, PeerConnectionState, PeerLayer, PeerRecord, RepoRecord, RepoStore,
    Timer, TransferEngine, TransferEventKind, TransferHandle, TransferOutcome, TreeDescriptor,
};
pub use clone_collab::{CollabError, OidParseError, PeerId, RepositoryId, RootTreeId};

pub use clone_core::{
    CloneManager, Collaborators, CompletionEvent, ErrorKind, IntervalTimer, ManagerConfig,
    ManagerError, SqliteTaskStore, StoreError, Task, TaskSnapshot, TaskState, TaskStore,
    ThreadJobRunner,
};

/// Install a process-wide `tracing` subscriber reading its filter from the
/// `RUST_LOG` environment variable, defaulting to `info` when unset.
///
/// Mirrors the teacher crate's binary-entrypoint logging setup; library
/// consumers that already have a subscriber installed should not call this.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}
