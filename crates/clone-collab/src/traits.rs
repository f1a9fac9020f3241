//! Collaborator traits.
//!
//! Every trait here is object-safe: no generic methods, no `Self` outside of
//! `Result`/`Option`. Callers hold `Arc<dyn Trait>` (or `Box<dyn Trait>` for
//! single-owner cases) chosen at construction time rather than a compiled-in
//! backend, so tests can substitute fakes without feature flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CollabError;
use crate::ids::{PeerId, RepositoryId, RootTreeId};

// ---------------------------------------------------------------------------
// Repository store
// ---------------------------------------------------------------------------

/// A record held by the repository manager — shared state the clone
/// manager reads at restart and writes at checkout/merge/fetch completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoRecord {
    /// The commit the repository's HEAD currently points at, if set.
    pub head: Option<RootTreeId>,
    /// The worktree path bound to this repository, if materialized.
    pub worktree: Option<PathBuf>,
    /// The root-tree id of the most recently fetched (but not yet
    /// checked-out or merged) remote head, if a fetch has completed since
    /// the last full checkout/merge. Distinct from `head`: `head` only
    /// updates once the worktree is actually brought in sync.
    pub fetched_root: Option<RootTreeId>,
    /// Whether the repository's objects are stored encrypted.
    pub encrypted: bool,
    /// Whether `encrypted` repositories of this one's kind can have a
    /// supplied password checked against stored metadata before use. When
    /// `false`, a supplied password is trusted without verification (§4.4).
    pub password_verifiable: bool,
}

/// Lookup and mutation surface for repository records.
///
/// This is the repository manager's half of the contract — the clone
/// manager never owns this data, it only reads and updates it.
pub trait RepoStore: Send + Sync {
    /// Look up a repository record by id. Returns `None` if the repository
    /// is not yet known locally.
    fn lookup_by_id(&self, repo_id: &RepositoryId) -> Result<Option<RepoRecord>, CollabError>;

    /// The worktree paths of every repository this store currently knows
    /// about, used by the worktree resolver's conflict oracle (§4.2 step 4).
    fn known_worktrees(&self) -> Result<Vec<PathBuf>, CollabError>;

    /// Check `password` against the repository's stored encryption
    /// metadata. Only called when `encrypted && password_verifiable`.
    fn verify_password(&self, repo_id: &RepositoryId, password: &str) -> Result<bool, CollabError>;

    /// Set the repository's HEAD commit.
    fn set_head(&self, repo_id: &RepositoryId, head: RootTreeId) -> Result<(), CollabError>;

    /// Record the root-tree id a completed fetch delivered, ahead of the
    /// checkout/merge that will apply it. Cleared implicitly once `head` is
    /// set to the same value.
    fn set_fetched_root(&self, repo_id: &RepositoryId, root: RootTreeId) -> Result<(), CollabError>;

    /// Bind the repository to a worktree path.
    fn set_worktree(&self, repo_id: &RepositoryId, worktree: &Path) -> Result<(), CollabError>;

    /// Record the auth token to use for subsequent relay calls.
    fn set_token(&self, repo_id: &RepositoryId, token: &str) -> Result<(), CollabError>;

    /// Record the owner's contact email (used as the local label in
    /// three-way merges).
    fn set_email(&self, repo_id: &RepositoryId, email: &str) -> Result<(), CollabError>;

    /// Record relay/peer connection info.
    fn set_relay_info(
        &self,
        repo_id: &RepositoryId,
        peer_id: &PeerId,
        addr: &str,
        port: u16,
    ) -> Result<(), CollabError>;

    /// Install a (verified, or unverifiable-but-accepted) encryption
    /// password on the repository record.
    fn set_password(&self, repo_id: &RepositoryId, password: &str) -> Result<(), CollabError>;
}

// ---------------------------------------------------------------------------
// Transfer engine
// ---------------------------------------------------------------------------

/// An opaque handle to an in-flight transfer. Non-owning: cancel/remove take
/// it by value or reference, they do not consume collaborator state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransferHandle(pub u64);

/// The terminal state of a transfer, as reported by one completion event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferEventKind {
    /// The transfer completed and all requested objects are present.
    Success,
    /// The transfer was canceled cleanly (in response to `cancel`).
    Canceled,
    /// The transfer failed.
    Error,
}

/// One completion event emitted by the transfer engine for a handle it
/// previously returned from `start_download`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Which handle this event concerns.
    pub handle: TransferHandle,
    /// How the transfer ended.
    pub kind: TransferEventKind,
    /// `true` if this handle was a full clone transfer, `false` if it was a
    /// plain fetch (used only for observability — the manager's own state
    /// already knows which it asked for).
    pub is_clone: bool,
    /// Present when `kind` is `Success`: the root-tree id of the fetched
    /// commit, used both to set the repository's HEAD and as the merge
    /// algorithm's remote-side tree.
    pub fetched_root: Option<RootTreeId>,
    /// Present when `kind` is `Success`: the identity (name/email) of
    /// whoever authored the fetched head commit, used as the `remote_label`
    /// in a full three-way merge (§4.4: "the remote head's creator as
    /// remote label").
    pub remote_creator: Option<String>,
    /// Present when `kind` is `Error`: a short diagnostic.
    pub error_detail: Option<String>,
}

/// Bulk object transfer. Produces fetched commits/trees/blobs out of band;
/// this crate only defines the call/callback shape.
pub trait TransferEngine: Send + Sync {
    /// Begin transferring objects for `repo_id` from `peer_id`.
    ///
    /// `fetch_head_ref` names the ref the transfer should leave pointing at
    /// the fetched tip (the spec's literal default is `"fetch_head"`);
    /// `target_branch` is the branch the transfer should populate (default
    /// `"master"`). Both are request parameters here, not hardcoded, so a
    /// caller may override them.
    fn start_download(
        &self,
        repo_id: &RepositoryId,
        peer_id: &PeerId,
        fetch_head_ref: &str,
        target_branch: &str,
        token: &str,
    ) -> Result<TransferHandle, CollabError>;

    /// Request cancellation of an in-flight transfer. Cancellation is
    /// asynchronous: the caller observes the outcome via a later
    /// `TransferOutcome` event, not via this call's return value.
    fn cancel(&self, handle: &TransferHandle) -> Result<(), CollabError>;

    /// Release any resources the engine holds for a finished handle.
    fn remove(&self, handle: &TransferHandle) -> Result<(), CollabError>;
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

/// Pre-clone indexing of an existing local worktree. Runs on a worker
/// thread; the result is delivered back via a completion event, never
/// returned synchronously to the control thread.
pub trait Indexer: Send + Sync {
    /// Compute the root-tree identifier of the pre-existing worktree at
    /// `worktree_path`, decrypting with `password` if the repository is
    /// encrypted (pass `None` for unencrypted repositories).
    fn index_worktree(
        &self,
        repo_id: &RepositoryId,
        worktree_path: &Path,
        password: Option<&str>,
    ) -> Result<RootTreeId, CollabError>;
}

// ---------------------------------------------------------------------------
// Checkout engine
// ---------------------------------------------------------------------------

/// A callback invoked on the control thread once with a single success
/// flag. Boxed because the checkout engine runs on a worker and must be
/// able to hand ownership of the callback across the thread boundary.
pub type CheckoutCallback = Box<dyn FnOnce(bool) + Send>;

/// Materializes a repository's current tree into an empty worktree.
pub trait CheckoutEngine: Send + Sync {
    /// Begin a checkout of `repo_id`'s current tree into `worktree`.
    /// `callback` is invoked exactly once, on the control thread, with
    /// `true` on success.
    fn start_checkout(&self, repo_id: &RepositoryId, worktree: &Path, callback: CheckoutCallback);
}

// ---------------------------------------------------------------------------
// Merge engines
// ---------------------------------------------------------------------------

/// A tree descriptor as understood by the merge engines: an opaque,
/// content-addressed root. The manager only ever passes `RootTreeId`s
/// through — it never inspects tree contents itself.
pub type TreeDescriptor = RootTreeId;

/// An opaque handle to a persisted index (path -> object-id snapshot) the
/// merge engines read and rewrite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexHandle(pub PathBuf);

/// Decryption/encryption context threaded through merge calls for
/// encrypted repositories. Opaque to the clone manager.
#[derive(Clone, Debug, Default)]
pub struct CryptoContext {
    /// The password to use, if the repository is encrypted.
    pub password: Option<String>,
}

/// Outcome of either merge engine: success/failure plus the new index
/// state (fast-forward case only — full three-way merges do not update the
/// index, per the merge algorithm's contract).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Whether the merge/unpack completed without a fatal error. Conflicts
    /// are not a failure — they are materialized into the worktree.
    pub success: bool,
    /// The index state to persist after a fast-forward unpack. `None` for
    /// full three-way merges, which leave index updates to a later
    /// auto-commit cycle.
    pub new_index: Option<IndexHandle>,
}

/// The recursive three-way merge and two-way fast-forward unpack
/// algorithms. Both are out of scope to implement here — only the call
/// shape the clone manager drives them with is defined.
pub trait MergeEngines: Send + Sync {
    /// Two-way tree unpack with "update" and "merge" flags: apply the diff
    /// between `local` and `remote` straight into the worktree, used for
    /// the fast-forward merge path.
    fn unpack_two_way(
        &self,
        index: &IndexHandle,
        local: &TreeDescriptor,
        remote: &TreeDescriptor,
        crypto: &CryptoContext,
    ) -> Result<MergeOutcome, CollabError>;

    /// Recursive three-way merge with an explicit ancestor, used for the
    /// non-fast-forward merge path. `local_label`/`remote_label` are the
    /// branch labels surfaced in any conflict markers.
    fn merge_three_way(
        &self,
        index: &IndexHandle,
        ancestor: &TreeDescriptor,
        local: &TreeDescriptor,
        remote: &TreeDescriptor,
        local_label: &str,
        remote_label: &str,
        crypto: &CryptoContext,
    ) -> Result<MergeOutcome, CollabError>;

    /// Walk `head`'s ancestor chain looking for `target`; returns `true` and
    /// halts on the first ancestor that matches. Used to decide whether a
    /// merge can fast-forward.
    fn is_ancestor(&self, head: &TreeDescriptor, target: &TreeDescriptor) -> Result<bool, CollabError>;
}

// ---------------------------------------------------------------------------
// Peer layer
// ---------------------------------------------------------------------------

/// Whether a peer is currently reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerConnectionState {
    /// The peer is reachable.
    Connected,
    /// The peer is not currently reachable.
    NotConnected,
}

/// A peer (relay) record as reported by the peer layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    /// Whether the peer is currently reachable.
    pub state: PeerConnectionState,
}

/// Peer discovery and connectivity.
pub trait PeerLayer: Send + Sync {
    /// Look up a peer's current connection state.
    fn get_peer(&self, peer_id: &PeerId) -> Result<Option<PeerRecord>, CollabError>;

    /// Register (or re-register) a peer by host/port via a text command,
    /// requesting the peer layer attempt to connect.
    fn add_peer(&self, peer_id: &PeerId, host: &str, port: u16) -> Result<(), CollabError>;
}

// ---------------------------------------------------------------------------
// Periodic timer and worker job runner
// ---------------------------------------------------------------------------

/// Schedules a repeating callback. The clone manager's connectivity watcher
/// is the sole user of this trait; it is injected so tests can fire ticks
/// manually instead of waiting on a real clock.
pub trait Timer: Send + Sync {
    /// Arrange for `callback` to run roughly every `interval`, starting
    /// after the first interval elapses.
    fn schedule(&self, interval: Duration, callback: Box<dyn Fn() + Send + Sync>);
}

/// Runs a unit of work off the control thread. Production code spawns an OS
/// thread per job; tests may run the closure inline for determinism.
pub trait JobRunner: Send + Sync {
    /// Run `job` on a worker. The job must deliver its result back to the
    /// control thread itself (e.g. through a `CompletionDispatcher`
    /// channel) — `spawn` does not return a handle or a result.
    fn spawn(&self, job: Box<dyn FnOnce() + Send>);
}
