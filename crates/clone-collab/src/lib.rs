//! Trait-based interface to the clone manager's external collaborators.
//!
//! The clone manager (in `clone-core`) never talks to a transfer protocol,
//! an object store, a checkout engine, a merge engine, or a peer layer
//! directly. Instead it programs against the traits defined here, the same
//! way `maw-git`'s `GitRepo` trait is the single abstraction boundary
//! between `maw` and git. Implementations of these traits — a real
//! transfer engine, a real checkout engine — are out of scope for this
//! crate; only the call shape is defined.

pub mod error;
pub mod ids;
pub mod traits;

pub use error::CollabError;
pub use ids::{OidParseError, PeerId, RepositoryId, RootTreeId};
pub use traits::{
    CheckoutCallback, CheckoutEngine, Indexer, JobRunner, MergeEngines, PeerConnectionState,
    PeerLayer, PeerRecord, RepoRecord, RepoStore, Timer, TransferEngine, TransferEventKind,
    TransferOutcome,
};
