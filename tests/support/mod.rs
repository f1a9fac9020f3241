//! Shared fake collaborators for the integration suite.
//!
//! Each fake is a minimal, deterministic stand-in for the real collaborator
//! it replaces — no timing, no I/O beyond what the test itself sets up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clone_collab::traits::{
    CheckoutCallback, CheckoutEngine, CryptoContext, Indexer, IndexHandle, JobRunner, MergeEngines,
    MergeOutcome, PeerConnectionState, PeerLayer, PeerRecord, RepoRecord, RepoStore, Timer,
    TransferEngine, TransferHandle, TreeDescriptor,
};
use clone_collab::{CollabError, PeerId, RepositoryId, RootTreeId};
use clone_core::{CloneManager, Collaborators, ManagerConfig, SqliteTaskStore};

/// Runs every spawned job inline, on the caller's thread. Makes worker
/// completions deterministic and immediately visible in the event channel.
#[derive(Default)]
pub struct SyncJobRunner;

impl JobRunner for SyncJobRunner {
    fn spawn(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

/// A `Timer` whose callbacks only fire when the test explicitly calls
/// [`FakeTimer::fire`].
#[derive(Default)]
pub struct FakeTimer {
    callbacks: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl FakeTimer {
    pub fn fire(&self) {
        let callbacks = self.callbacks.lock().expect("lock");
        for cb in callbacks.iter() {
            cb();
        }
    }
}

impl Timer for FakeTimer {
    fn schedule(&self, _interval: Duration, callback: Box<dyn Fn() + Send + Sync>) {
        self.callbacks.lock().expect("lock").push(callback);
    }
}

#[derive(Default)]
pub struct FakeRepoStore {
    records: Mutex<HashMap<RepositoryId, RepoRecord>>,
}

impl FakeRepoStore {
    pub fn seed(&self, repo_id: RepositoryId, record: RepoRecord) {
        self.records.lock().expect("lock").insert(repo_id, record);
    }

    pub fn head_of(&self, repo_id: &RepositoryId) -> Option<RootTreeId> {
        self.records.lock().expect("lock").get(repo_id).and_then(|r| r.head.clone())
    }
}

impl RepoStore for FakeRepoStore {
    fn lookup_by_id(&self, repo_id: &RepositoryId) -> Result<Option<RepoRecord>, CollabError> {
        Ok(self.records.lock().expect("lock").get(repo_id).cloned())
    }

    fn known_worktrees(&self) -> Result<Vec<PathBuf>, CollabError> {
        Ok(self
            .records
            .lock()
            .expect("lock")
            .values()
            .filter_map(|r| r.worktree.clone())
            .collect())
    }

    fn verify_password(&self, _repo_id: &RepositoryId, password: &str) -> Result<bool, CollabError> {
        Ok(password == "correct-horse-battery-staple")
    }

    fn set_head(&self, repo_id: &RepositoryId, head: RootTreeId) -> Result<(), CollabError> {
        self.records.lock().expect("lock").entry(repo_id.clone()).or_default().head = Some(head);
        Ok(())
    }

    fn set_fetched_root(&self, repo_id: &RepositoryId, root: RootTreeId) -> Result<(), CollabError> {
        self.records
            .lock()
            .expect("lock")
            .entry(repo_id.clone())
            .or_default()
            .fetched_root = Some(root);
        Ok(())
    }

    fn set_worktree(&self, repo_id: &RepositoryId, worktree: &Path) -> Result<(), CollabError> {
        self.records
            .lock()
            .expect("lock")
            .entry(repo_id.clone())
            .or_default()
            .worktree = Some(worktree.to_owned());
        Ok(())
    }

    fn set_token(&self, _repo_id: &RepositoryId, _token: &str) -> Result<(), CollabError> {
        Ok(())
    }

    fn set_email(&self, _repo_id: &RepositoryId, _email: &str) -> Result<(), CollabError> {
        Ok(())
    }

    fn set_relay_info(
        &self,
        _repo_id: &RepositoryId,
        _peer_id: &PeerId,
        _addr: &str,
        _port: u16,
    ) -> Result<(), CollabError> {
        Ok(())
    }

    fn set_password(&self, _repo_id: &RepositoryId, _password: &str) -> Result<(), CollabError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePeerLayer {
    peers: Mutex<HashMap<PeerId, PeerRecord>>,
}

impl FakePeerLayer {
    pub fn set_connected(&self, peer_id: PeerId, connected: bool) {
        let state = if connected {
            PeerConnectionState::Connected
        } else {
            PeerConnectionState::NotConnected
        };
        self.peers.lock().expect("lock").insert(peer_id, PeerRecord { state });
    }
}

impl PeerLayer for FakePeerLayer {
    fn get_peer(&self, peer_id: &PeerId) -> Result<Option<PeerRecord>, CollabError> {
        Ok(self.peers.lock().expect("lock").get(peer_id).cloned())
    }

    fn add_peer(&self, peer_id: &PeerId, _host: &str, _port: u16) -> Result<(), CollabError> {
        self.peers
            .lock()
            .expect("lock")
            .entry(peer_id.clone())
            .or_insert(PeerRecord {
                state: PeerConnectionState::NotConnected,
            });
        Ok(())
    }
}

/// Hands out sequential handles; does not deliver outcomes on its own — the
/// test calls `CloneManager::report_transfer_outcome` to simulate delivery.
#[derive(Default)]
pub struct FakeTransferEngine {
    next: AtomicU64,
    pub fail: Mutex<bool>,
}

impl TransferEngine for FakeTransferEngine {
    fn start_download(
        &self,
        _repo_id: &RepositoryId,
        _peer_id: &PeerId,
        _fetch_head_ref: &str,
        _target_branch: &str,
        _token: &str,
    ) -> Result<TransferHandle, CollabError> {
        if *self.fail.lock().expect("lock") {
            return Err(CollabError::BackendError {
                message: "simulated transfer-start failure".to_owned(),
            });
        }
        Ok(TransferHandle(self.next.fetch_add(1, Ordering::Relaxed)))
    }

    fn cancel(&self, _handle: &TransferHandle) -> Result<(), CollabError> {
        Ok(())
    }

    fn remove(&self, _handle: &TransferHandle) -> Result<(), CollabError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIndexer {
    pub fail: Mutex<bool>,
}

impl Indexer for FakeIndexer {
    fn index_worktree(
        &self,
        _repo_id: &RepositoryId,
        _worktree_path: &Path,
        _password: Option<&str>,
    ) -> Result<RootTreeId, CollabError> {
        if *self.fail.lock().expect("lock") {
            return Err(CollabError::BackendError {
                message: "simulated index failure".to_owned(),
            });
        }
        Ok(RootTreeId::new("1".repeat(40)).expect("valid"))
    }
}

#[derive(Default)]
pub struct FakeCheckoutEngine {
    pub succeed: Mutex<bool>,
}

impl CheckoutEngine for FakeCheckoutEngine {
    fn start_checkout(&self, _repo_id: &RepositoryId, _worktree: &Path, callback: CheckoutCallback) {
        let ok = *self.succeed.lock().expect("lock");
        callback(ok);
    }
}

#[derive(Default)]
pub struct FakeMergeEngines {
    pub ancestor: Mutex<bool>,
    pub succeed: Mutex<bool>,
    pub last_remote_label: Mutex<Option<String>>,
}

impl MergeEngines for FakeMergeEngines {
    fn unpack_two_way(
        &self,
        _index: &IndexHandle,
        _local: &TreeDescriptor,
        _remote: &TreeDescriptor,
        _crypto: &CryptoContext,
    ) -> Result<MergeOutcome, CollabError> {
        Ok(MergeOutcome {
            success: *self.succeed.lock().expect("lock"),
            new_index: None,
        })
    }

    fn merge_three_way(
        &self,
        _index: &IndexHandle,
        _ancestor: &TreeDescriptor,
        _local: &TreeDescriptor,
        _remote: &TreeDescriptor,
        _local_label: &str,
        remote_label: &str,
        _crypto: &CryptoContext,
    ) -> Result<MergeOutcome, CollabError> {
        *self.last_remote_label.lock().expect("lock") = Some(remote_label.to_owned());
        Ok(MergeOutcome {
            success: *self.succeed.lock().expect("lock"),
            new_index: None,
        })
    }

    fn is_ancestor(&self, _head: &TreeDescriptor, _target: &TreeDescriptor) -> Result<bool, CollabError> {
        Ok(*self.ancestor.lock().expect("lock"))
    }
}

/// Everything a test needs to construct a [`CloneManager`] plus handles to
/// poke the fakes directly.
pub struct Harness {
    pub manager: Arc<CloneManager>,
    pub store: Arc<SqliteTaskStore>,
    pub repo_store: Arc<FakeRepoStore>,
    pub peer_layer: Arc<FakePeerLayer>,
    pub transfer: Arc<FakeTransferEngine>,
    pub indexer: Arc<FakeIndexer>,
    pub checkout: Arc<FakeCheckoutEngine>,
    pub merge: Arc<FakeMergeEngines>,
    pub timer: Arc<FakeTimer>,
}

pub fn build_harness() -> Harness {
    let store = Arc::new(SqliteTaskStore::open_in_memory().expect("in-memory store"));
    let repo_store = Arc::new(FakeRepoStore::default());
    let peer_layer = Arc::new(FakePeerLayer::default());
    let transfer = Arc::new(FakeTransferEngine::default());
    let indexer = Arc::new(FakeIndexer::default());
    let checkout = Arc::new(FakeCheckoutEngine {
        succeed: Mutex::new(true),
    });
    let merge = Arc::new(FakeMergeEngines {
        ancestor: Mutex::new(true),
        succeed: Mutex::new(true),
        last_remote_label: Mutex::new(None),
    });
    let timer = Arc::new(FakeTimer::default());

    let collab = Collaborators {
        store: store.clone(),
        repo_store: repo_store.clone(),
        transfer: transfer.clone(),
        indexer: indexer.clone(),
        checkout: checkout.clone(),
        merge: merge.clone(),
        peer_layer: peer_layer.clone(),
        job_runner: Arc::new(SyncJobRunner),
        timer: timer.clone(),
    };

    let manager = CloneManager::new(collab, ManagerConfig::default()).expect("manager");

    Harness {
        manager,
        store,
        repo_store,
        peer_layer,
        transfer,
        indexer,
        checkout,
        merge,
        timer,
    }
}

pub fn sample_repo_id(byte: u8) -> RepositoryId {
    RepositoryId::new((byte as char).to_string().repeat(36)).expect("valid")
}

pub fn sample_peer_id(byte: u8) -> PeerId {
    PeerId::new((byte as char).to_string().repeat(40)).expect("valid")
}
