//! Task state and error-kind enums, and the state-transition DAG.
//!
//! The string forms below are exposed for observability verbatim — callers
//! (and any wire-compatible status reporting built on top of this crate)
//! depend on these exact spellings, so changing them is a breaking change.

use std::fmt;

/// The lifecycle state of a clone task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Just admitted; peer connectivity not yet evaluated.
    Init,
    /// Waiting for the peer to become reachable.
    Connect,
    /// Indexing a pre-existing worktree to compute its root-tree id.
    Index,
    /// Bulk object transfer in progress.
    Fetch,
    /// Materializing a clean (empty-worktree) checkout.
    Checkout,
    /// Reconciling fetched objects with pre-existing worktree content.
    Merge,
    /// Terminal: the clone completed successfully.
    Done,
    /// Terminal: the clone failed (see the task's error kind).
    Error,
    /// Cancellation requested; waiting for the in-flight collaborator job
    /// to report back before collapsing to `Canceled`.
    CancelPending,
    /// Terminal: the clone was canceled.
    Canceled,
}

impl TaskState {
    /// Terminal states are sticky until the caller explicitly removes the
    /// task (invariant 6).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    /// Whether a row for a task in this state belongs in the durable store
    /// (invariant 4: present iff state is not in {DONE, ERROR, CANCELED}).
    #[must_use]
    pub const fn is_durable(self) -> bool {
        !self.is_terminal()
    }

    /// The exact observability string for this state (§3/§6).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Connect => "CONNECT",
            Self::Index => "INDEX",
            Self::Fetch => "FETCH",
            Self::Checkout => "CHECKOUT",
            Self::Merge => "MERGE",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::CancelPending => "CANCEL_PENDING",
            Self::Canceled => "CANCELED",
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is one of the
    /// §4.4 DAG edges. Off-DAG transitions are programming errors
    /// (invariant 5) and should be caught with a debug assertion at every
    /// call site that performs a transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Init => matches!(next, Self::Connect | Self::Index | Self::Fetch | Self::Canceled),
            Self::Connect => matches!(next, Self::Index | Self::Fetch | Self::Canceled),
            Self::Index => matches!(next, Self::Fetch | Self::Error | Self::CancelPending),
            Self::Fetch => matches!(
                next,
                Self::Checkout | Self::Merge | Self::Error | Self::CancelPending
            ),
            Self::Checkout => matches!(next, Self::Done | Self::Error | Self::CancelPending),
            Self::Merge => matches!(next, Self::Done | Self::Error | Self::CancelPending),
            Self::CancelPending => matches!(next, Self::Canceled | Self::CancelPending),
            Self::Done | Self::Error | Self::Canceled => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classification of the last error a task encountered. `Ok` is the
/// default/non-error value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    /// No error.
    #[default]
    Ok,
    /// Reserved for a future connect-failure report; never produced today.
    Connect,
    /// Pre-clone worktree indexing failed.
    Index,
    /// The bulk transfer failed.
    Fetch,
    /// Missing or wrong password for an encrypted repository.
    Password,
    /// The checkout engine failed.
    Checkout,
    /// A merge engine failed.
    Merge,
    /// An invariant violation or missing collaborator state.
    Internal,
}

impl ErrorKind {
    /// The exact observability string for this error kind (§3/§6/§7).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Connect => "CONNECT",
            Self::Index => "INDEX",
            Self::Fetch => "FETCH",
            Self::Password => "PASSWORD",
            Self::Checkout => "CHECKOUT",
            Self::Merge => "MERGE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
