//! The `CloneManager` facade (§2 "Manager facade", §4.3–§4.6).
//!
//! Owns the task map and the handles to every injected collaborator, and is
//! the sole entry point for the Caller API (§6) and for feeding the
//! Completion Dispatcher. All mutation happens through `&self` methods
//! backed by a single `Mutex<State>` — only one control thread is ever
//! meant to call `pump_events`/`tick_connectivity`, matching §5's
//! single-control-thread model; the mutex exists for `Send + Sync`, not to
//! support concurrent mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clone_collab::traits::{
    CheckoutEngine, CryptoContext, Indexer, IndexHandle, JobRunner, MergeEngines, PeerLayer,
    PeerConnectionState, RepoStore, Timer, TransferEngine, TransferEventKind, TransferHandle,
};
use clone_collab::{PeerId, RepositoryId, RootTreeId};

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::events::CompletionEvent;
use crate::resolver::{self, ResolveMode};
use crate::state::{ErrorKind, TaskState};
use crate::store::{StoreError, TaskRow, TaskStore};
use crate::task::{Task, TaskSnapshot};

/// The well-known empty-tree sentinel used as the merge ancestor when no
/// real common ancestor is available (fresh, non-fast-forward merges).
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Every collaborator handle the manager needs, bundled for ergonomic
/// construction (§6 "Trait shapes", §9 "dependency injection").
pub struct Collaborators {
    /// Durable task persistence.
    pub store: Arc<dyn TaskStore>,
    /// Repository record lookup/mutation.
    pub repo_store: Arc<dyn RepoStore>,
    /// Bulk object transfer.
    pub transfer: Arc<dyn TransferEngine>,
    /// Pre-clone worktree indexing.
    pub indexer: Arc<dyn Indexer>,
    /// Clean-worktree checkout.
    pub checkout: Arc<dyn CheckoutEngine>,
    /// Fast-forward and three-way merge algorithms.
    pub merge: Arc<dyn MergeEngines>,
    /// Peer discovery and connectivity.
    pub peer_layer: Arc<dyn PeerLayer>,
    /// Worker-thread job runner.
    pub job_runner: Arc<dyn JobRunner>,
    /// Periodic timer backing the connectivity watcher.
    pub timer: Arc<dyn Timer>,
}

struct State {
    tasks: HashMap<RepositoryId, Task>,
    handle_to_repo: HashMap<TransferHandle, RepositoryId>,
}

/// The clone task lifecycle engine.
pub struct CloneManager {
    state: Mutex<State>,
    store: Arc<dyn TaskStore>,
    repo_store: Arc<dyn RepoStore>,
    transfer: Arc<dyn TransferEngine>,
    indexer: Arc<dyn Indexer>,
    checkout: Arc<dyn CheckoutEngine>,
    merge: Arc<dyn MergeEngines>,
    peer_layer: Arc<dyn PeerLayer>,
    job_runner: Arc<dyn JobRunner>,
    #[allow(dead_code)]
    timer: Arc<dyn Timer>,
    config: ManagerConfig,
    event_tx: mpsc::Sender<CompletionEvent>,
    event_rx: Mutex<mpsc::Receiver<CompletionEvent>>,
}

impl CloneManager {
    /// Construct a manager, rehydrating any tasks left non-terminal by a
    /// previous process (§4.4 "Restart classification"), and arm the
    /// connectivity watcher's timer.
    ///
    /// # Errors
    /// Returns a [`ManagerError`] if the durable store cannot be scanned.
    pub fn new(collab: Collaborators, config: ManagerConfig) -> Result<Arc<Self>, ManagerError> {
        let (event_tx, event_rx) = mpsc::channel();
        let manager = Arc::new(Self {
            state: Mutex::new(State {
                tasks: HashMap::new(),
                handle_to_repo: HashMap::new(),
            }),
            store: collab.store,
            repo_store: collab.repo_store,
            transfer: collab.transfer,
            indexer: collab.indexer,
            checkout: collab.checkout,
            merge: collab.merge,
            peer_layer: collab.peer_layer,
            job_runner: collab.job_runner,
            timer: collab.timer,
            config,
            event_tx,
            event_rx: Mutex::new(event_rx),
        });
        manager.rehydrate()?;
        manager.arm_watcher();
        Ok(manager)
    }

    fn arm_watcher(self: &Arc<Self>) {
        let tx = self.event_tx.clone();
        let interval = Duration::from_millis(self.config.watcher_tick_ms);
        self.timer.schedule(
            interval,
            Box::new(move || {
                let _ = tx.send(CompletionEvent::WatcherTick);
            }),
        );
    }

    fn rehydrate(self: &Arc<Self>) -> Result<(), ManagerError> {
        let mut rows = Vec::new();
        self.store
            .scan_all(&mut |row| rows.push(row))
            .map_err(|e: StoreError| ManagerError::PersistenceFailure {
                repo_id: RepositoryId::new("0".repeat(36)).unwrap_or_else(|_| unreachable!()),
                detail: e.to_string(),
            })?;

        for row in rows {
            self.restart_classify(row);
        }
        Ok(())
    }

    /// Restart classification (§4.4): decide a rehydrated row's first live
    /// state without re-running admission.
    fn restart_classify(self: &Arc<Self>, row: TaskRow) {
        let mut task = Task::new(
            row.repo_id.clone(),
            row.peer_id,
            row.repo_name,
            row.token,
            row.password,
            row.worktree,
            row.peer_addr,
            row.peer_port,
            row.email,
        );

        let record = self.repo_store.lookup_by_id(&task.repo_id).ok().flatten();

        if let Some(rec) = &record {
            if rec.head.is_some() {
                // Case 1: repository already has a head — nothing left to do.
                let _ = self.store.delete(&task.repo_id);
                tracing::info!(repo_id = %task.repo_id, "restart: repository already complete, pruning row");
                return;
            }
            // Case 2: repository exists with no head — decide checkout vs merge directly.
            // `fetched_root` is the repo store's durable record of what the
            // prior process's FETCH delivered (§3/§4.4 restart case 2:
            // "object data is assumed already fetched"). Passing through
            // `Fetch` keeps this on the same DAG edge a normal
            // post-transfer transition uses, rather than adding an
            // Init-to-Checkout/Merge shortcut to the state machine.
            task.remote_root = rec.fetched_root.clone();
            task.state = TaskState::Fetch;
            tracing::info!(repo_id = %task.repo_id, "restart: resuming directly into checkout/merge decision");
            self.begin_checkout_or_merge(&mut task);
            self.insert_task(task);
            return;
        }

        // Cases 3/4: dispatch exactly as a fresh INIT would.
        tracing::info!(repo_id = %task.repo_id, "restart: re-dispatching from INIT");
        self.advance_from_init(&mut task);
        self.insert_task(task);
    }

    fn insert_task(&self, task: Task) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = task.transfer_handle.clone() {
            state.handle_to_repo.insert(handle, task.repo_id.clone());
        }
        state.tasks.insert(task.repo_id.clone(), task);
    }

    // -----------------------------------------------------------------
    // Caller API (§6)
    // -----------------------------------------------------------------

    /// Admit a new clone task.
    ///
    /// # Errors
    /// See [`ManagerError`] variants: `RepositoryExists`, `DuplicateTask`,
    /// `InvalidDirectoryName`, `WorktreeConflict`, `PersistenceFailure`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_task(
        self: &Arc<Self>,
        repo_id: RepositoryId,
        peer_id: PeerId,
        repo_name: String,
        token: String,
        password: Option<String>,
        candidate_worktree: &Path,
        peer_addr: String,
        peer_port: u16,
        email: String,
    ) -> Result<RepositoryId, ManagerError> {
        if let Some(rec) = self
            .repo_store
            .lookup_by_id(&repo_id)
            .map_err(|e| ManagerError::PersistenceFailure {
                repo_id: repo_id.clone(),
                detail: e.to_string(),
            })?
        {
            if rec.head.is_some() {
                return Err(ManagerError::RepositoryExists { repo_id });
            }
        }

        {
            let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if state
                .tasks
                .get(&repo_id)
                .is_some_and(|t| !t.state.is_terminal())
            {
                return Err(ManagerError::DuplicateTask { repo_id });
            }
        }

        let worktree = self.resolve_commit(candidate_worktree)?;

        let basename_ok = worktree
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(repo_name.as_str()));
        if !basename_ok {
            return Err(ManagerError::InvalidDirectoryName {
                path: worktree,
                reason: format!("basename does not start with repository name '{repo_name}'"),
            });
        }

        let mut task = Task::new(
            repo_id.clone(),
            peer_id,
            repo_name,
            token,
            password,
            worktree,
            peer_addr,
            peer_port,
            email,
        );

        self.store
            .upsert(&row_of(&task))
            .map_err(|e| ManagerError::PersistenceFailure {
                repo_id: repo_id.clone(),
                detail: e.to_string(),
            })?;

        self.advance_from_init(&mut task);
        self.insert_task(task);

        Ok(repo_id)
    }

    fn resolve_commit(&self, candidate: &Path) -> Result<PathBuf, ManagerError> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let active: Vec<PathBuf> = state
            .tasks
            .values()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.worktree.clone())
            .collect();
        drop(state);
        let known = self
            .repo_store
            .known_worktrees()
            .map_err(|e| ManagerError::PersistenceFailure {
                repo_id: RepositoryId::new("0".repeat(36)).unwrap_or_else(|_| unreachable!()),
                detail: e.to_string(),
            })?;

        resolver::resolve(candidate, ResolveMode::Commit, self.config.worktree_synth_cap, &|p| {
            active.iter().any(|a| a == p) || known.iter().any(|k| k == p)
        })
        .map_err(|e| match e {
            resolver::ResolveError::AlreadyInSync(path) => ManagerError::WorktreeConflict { path },
            resolver::ResolveError::InvalidLocalDirectory(path) => ManagerError::InvalidDirectoryName {
                path,
                reason: "path exists and is not a directory".to_owned(),
            },
            resolver::ResolveError::CreateFailed { path, detail } => {
                ManagerError::InvalidDirectoryName { path, reason: detail }
            }
        })
    }

    /// Produce a non-colliding default worktree path under `parent_dir`.
    #[must_use]
    pub fn gen_default_worktree(&self, parent_dir: &Path, repo_name: &str) -> PathBuf {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let active: Vec<PathBuf> = state
            .tasks
            .values()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.worktree.clone())
            .collect();
        drop(state);
        let known = self.repo_store.known_worktrees().unwrap_or_default();
        resolver::gen_default_worktree(parent_dir, repo_name, self.config.worktree_synth_cap, &|p| {
            active.iter().any(|a| a == p) || known.iter().any(|k| k == p)
        })
    }

    /// Request cancellation of a task (§4.5).
    ///
    /// # Errors
    /// [`ManagerError::NotFound`] if no such task exists;
    /// [`ManagerError::NotCancelable`] if it is already terminal.
    pub fn cancel_task(&self, repo_id: &RepositoryId) -> Result<(), ManagerError> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let task = state
            .tasks
            .get_mut(repo_id)
            .ok_or_else(|| ManagerError::NotFound { repo_id: repo_id.clone() })?;

        match task.state {
            TaskState::Init | TaskState::Connect => {
                let _ = self.store.delete(repo_id);
                task.state = TaskState::Canceled;
                tracing::info!(repo_id = %repo_id, from = "INIT/CONNECT", "canceled");
                Ok(())
            }
            TaskState::Fetch => {
                if let Some(handle) = &task.transfer_handle {
                    let _ = self.transfer.cancel(handle);
                }
                task.state = TaskState::CancelPending;
                tracing::info!(repo_id = %repo_id, "cancel requested during FETCH");
                Ok(())
            }
            TaskState::Index | TaskState::Checkout | TaskState::Merge => {
                task.state = TaskState::CancelPending;
                tracing::info!(repo_id = %repo_id, "cancel requested, awaiting in-flight job");
                Ok(())
            }
            TaskState::CancelPending => Ok(()),
            TaskState::Done | TaskState::Error | TaskState::Canceled => {
                Err(ManagerError::NotCancelable {
                    repo_id: repo_id.clone(),
                    state: task.state.as_str(),
                })
            }
        }
    }

    /// Remove a terminal task's in-memory record. A no-op if the task does
    /// not exist (§8 "remove_task is a no-op when the task does not
    /// exist").
    ///
    /// # Errors
    /// [`ManagerError::NotTerminal`] if the task exists but has not reached
    /// a terminal state.
    pub fn remove_task(&self, repo_id: &RepositoryId) -> Result<(), ManagerError> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(task) = state.tasks.get(repo_id) else {
            return Ok(());
        };
        if !task.state.is_terminal() {
            return Err(ManagerError::NotTerminal {
                repo_id: repo_id.clone(),
                state: task.state.as_str(),
            });
        }
        state.tasks.remove(repo_id);
        Ok(())
    }

    /// Fetch a single task's caller-visible snapshot.
    ///
    /// # Errors
    /// [`ManagerError::NotFound`] if no such task exists.
    pub fn get_task(&self, repo_id: &RepositoryId) -> Result<TaskSnapshot, ManagerError> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .tasks
            .get(repo_id)
            .map(Task::snapshot)
            .ok_or_else(|| ManagerError::NotFound { repo_id: repo_id.clone() })
    }

    /// List every task's caller-visible snapshot, in unspecified order.
    #[must_use]
    pub fn list_tasks(&self) -> Vec<TaskSnapshot> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.tasks.values().map(Task::snapshot).collect()
    }

    // -----------------------------------------------------------------
    // State machine dispatch (§4.3, §4.4)
    // -----------------------------------------------------------------

    fn advance_from_init(self: &Arc<Self>, task: &mut Task) {
        let connected = self
            .peer_layer
            .get_peer(&task.peer_id)
            .ok()
            .flatten()
            .is_some_and(|rec| rec.state == PeerConnectionState::Connected);

        if connected {
            self.dispatch_peer_connected(task);
        } else {
            debug_assert!(task.state.can_transition_to(TaskState::Connect));
            task.state = TaskState::Connect;
            let _ = self.peer_layer.add_peer(&task.peer_id, &task.peer_addr, task.peer_port);
            tracing::info!(repo_id = %task.repo_id, to = "CONNECT", "awaiting peer");
        }
    }

    fn dispatch_peer_connected(self: &Arc<Self>, task: &mut Task) {
        let empty = is_worktree_empty(&task.worktree);
        if empty {
            self.start_fetch(task);
        } else {
            debug_assert!(task.state.can_transition_to(TaskState::Index));
            task.state = TaskState::Index;
            tracing::info!(repo_id = %task.repo_id, to = "INDEX", "pre-existing worktree found");
            self.spawn_index_job(task.repo_id.clone(), task.worktree.clone(), task.password.clone());
        }
    }

    fn start_fetch(self: &Arc<Self>, task: &mut Task) {
        match self.transfer.start_download(
            &task.repo_id,
            &task.peer_id,
            &self.config.default_fetch_head_ref,
            &self.config.default_target_branch,
            &task.token,
        ) {
            Ok(handle) => {
                debug_assert!(task.state.can_transition_to(TaskState::Fetch));
                let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                state.handle_to_repo.insert(handle.clone(), task.repo_id.clone());
                drop(state);
                task.transfer_handle = Some(handle);
                task.state = TaskState::Fetch;
                tracing::info!(repo_id = %task.repo_id, to = "FETCH", "transfer started");
            }
            Err(e) => {
                tracing::warn!(repo_id = %task.repo_id, error = %e, "transfer failed to start");
                self.fail(task, ErrorKind::Fetch);
            }
        }
    }

    fn spawn_index_job(self: &Arc<Self>, repo_id: RepositoryId, worktree: PathBuf, password: Option<String>) {
        let indexer = Arc::clone(&self.indexer);
        let tx = self.event_tx.clone();
        self.job_runner.spawn(Box::new(move || {
            let result = indexer
                .index_worktree(&repo_id, &worktree, password.as_deref())
                .map_err(|e| e.to_string());
            let _ = tx.send(CompletionEvent::Index { repo_id, result });
        }));
    }

    /// Apply the encryption/password gate, then enter `CHECKOUT` or `MERGE`
    /// depending on whether the worktree is empty (§4.4 "Checkout vs merge
    /// decision"). Used both after a successful `FETCH` and at restart
    /// case 2.
    fn begin_checkout_or_merge(self: &Arc<Self>, task: &mut Task) {
        if let Err(kind) = self.apply_password_gate(task) {
            self.fail(task, kind);
            return;
        }

        if is_worktree_empty(&task.worktree) {
            debug_assert!(task.state.can_transition_to(TaskState::Checkout));
            task.state = TaskState::Checkout;
            tracing::info!(repo_id = %task.repo_id, to = "CHECKOUT", "empty worktree");
            self.spawn_checkout(task);
        } else {
            debug_assert!(task.state.can_transition_to(TaskState::Merge));
            task.state = TaskState::Merge;
            tracing::info!(repo_id = %task.repo_id, to = "MERGE", "non-empty worktree");
            self.spawn_merge(task);
        }
    }

    /// §4.4 "Encryption/password gate": verify (when verifiable) a
    /// supplied password, or fail with `ErrorKind::Password` when none was
    /// supplied for an encrypted repository.
    fn apply_password_gate(&self, task: &Task) -> Result<(), ErrorKind> {
        let record = self
            .repo_store
            .lookup_by_id(&task.repo_id)
            .map_err(|_| ErrorKind::Internal)?;
        let Some(record) = record else {
            return Ok(());
        };
        if !record.encrypted {
            return Ok(());
        }

        let Some(password) = &task.password else {
            return Err(ErrorKind::Password);
        };

        if record.password_verifiable {
            let ok = self
                .repo_store
                .verify_password(&task.repo_id, password)
                .map_err(|_| ErrorKind::Internal)?;
            if !ok {
                return Err(ErrorKind::Password);
            }
        }

        self.repo_store
            .set_password(&task.repo_id, password)
            .map_err(|_| ErrorKind::Internal)
    }

    fn spawn_checkout(self: &Arc<Self>, task: &Task) {
        let repo_id = task.repo_id.clone();
        let tx = self.event_tx.clone();
        self.checkout.start_checkout(
            &task.repo_id,
            &task.worktree,
            Box::new(move |success| {
                let _ = tx.send(CompletionEvent::Checkout { repo_id, success });
            }),
        );
    }

    fn spawn_merge(self: &Arc<Self>, task: &Task) {
        let merge = Arc::clone(&self.merge);
        let indexer = Arc::clone(&self.indexer);
        let tx = self.event_tx.clone();
        let repo_id = task.repo_id.clone();
        let worktree = task.worktree.clone();
        let password = task.password.clone();
        let local_root = task.local_root.clone();
        let remote_root = task.remote_root.clone();
        let remote_creator = task.remote_creator.clone();
        let email = task.email.clone();

        self.job_runner.spawn(Box::new(move || {
            let success = run_merge(
                merge.as_ref(),
                indexer.as_ref(),
                &repo_id,
                &worktree,
                password.as_deref(),
                local_root,
                remote_root,
                &email,
                remote_creator.as_deref(),
            )
            .is_ok();
            let _ = tx.send(CompletionEvent::Merge { repo_id, success });
        }));
    }

    // -----------------------------------------------------------------
    // Completion Dispatcher (§4.6)
    // -----------------------------------------------------------------

    /// Feed a transfer engine's outcome notification into the dispatcher.
    ///
    /// The transfer engine (§6) has no callback parameter on
    /// `start_download` the way `CheckoutEngine` does — it is expected to
    /// deliver outcomes through whatever notification mechanism the host
    /// process wires it up with (a bus, a poll loop). The host forwards
    /// each one here.
    pub fn report_transfer_outcome(&self, outcome: clone_collab::traits::TransferOutcome) {
        let _ = self.event_tx.send(CompletionEvent::Transfer(outcome));
    }

    /// Drain and process every completion event currently queued. Intended
    /// to be called in a loop by the host process's control thread; blocks
    /// only long enough to drain the channel's current backlog.
    pub fn pump_events(self: &Arc<Self>) {
        let pending: Vec<CompletionEvent> = {
            let rx = self.event_rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            rx.try_iter().collect()
        };
        for event in pending {
            self.dispatch(event);
        }
    }

    fn dispatch(self: &Arc<Self>, event: CompletionEvent) {
        match event {
            CompletionEvent::WatcherTick => self.tick_connectivity(),
            CompletionEvent::Index { repo_id, result } => self.on_index(&repo_id, result),
            CompletionEvent::Transfer(outcome) => self.on_transfer(outcome),
            CompletionEvent::Checkout { repo_id, success } => self.on_checkout(&repo_id, success),
            CompletionEvent::Merge { repo_id, success } => self.on_merge(&repo_id, success),
        }
    }

    /// The connectivity watcher's tick (§4.3): re-examine every `CONNECT`
    /// task.
    fn tick_connectivity(self: &Arc<Self>) {
        let pending: Vec<RepositoryId> = {
            let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state
                .tasks
                .iter()
                .filter(|(_, t)| t.state == TaskState::Connect)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for repo_id in pending {
            let Some(mut task) = self.take_task(&repo_id) else {
                continue;
            };
            if task.state != TaskState::Connect {
                self.reinsert(task);
                continue;
            }
            let connected = self
                .peer_layer
                .get_peer(&task.peer_id)
                .ok()
                .flatten()
                .is_some_and(|rec| rec.state == PeerConnectionState::Connected);
            if connected {
                self.dispatch_peer_connected(&mut task);
            }
            self.reinsert(task);
        }
    }

    fn reinsert(&self, task: Task) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = task.transfer_handle.clone() {
            state.handle_to_repo.insert(handle, task.repo_id.clone());
        }
        state.tasks.insert(task.repo_id.clone(), task);
    }

    fn on_index(self: &Arc<Self>, repo_id: &RepositoryId, result: Result<RootTreeId, String>) {
        let Some(mut task) = self.take_task(repo_id) else {
            tracing::warn!(repo_id = %repo_id, "INDEX completion for unknown task");
            return;
        };

        if task.state == TaskState::CancelPending {
            self.finalize_canceled(&mut task);
            self.reinsert(task);
            return;
        }

        match result {
            Ok(root) => {
                task.local_root = Some(root);
                self.start_fetch(&mut task);
            }
            Err(detail) => {
                tracing::warn!(repo_id = %repo_id, error = %detail, "indexing failed");
                self.fail(&mut task, ErrorKind::Index);
            }
        }
        self.reinsert(task);
    }

    fn on_transfer(self: &Arc<Self>, outcome: clone_collab::traits::TransferOutcome) {
        let repo_id = {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.handle_to_repo.remove(&outcome.handle)
        };
        let _ = self.transfer.remove(&outcome.handle);

        let Some(repo_id) = repo_id else {
            tracing::warn!(handle = ?outcome.handle, "transfer completion for unknown handle");
            return;
        };
        let Some(mut task) = self.take_task(&repo_id) else {
            tracing::warn!(repo_id = %repo_id, "transfer completion for unknown task");
            return;
        };

        if task.state == TaskState::CancelPending {
            match outcome.kind {
                TransferEventKind::Error => self.fail(&mut task, ErrorKind::Fetch),
                TransferEventKind::Canceled | TransferEventKind::Success => {
                    self.finalize_canceled(&mut task);
                }
            }
            self.reinsert(task);
            return;
        }

        match outcome.kind {
            TransferEventKind::Success => {
                task.remote_root = outcome.fetched_root.clone();
                task.remote_creator = outcome.remote_creator.clone();
                task.transfer_handle = None;
                if let Some(root) = outcome.fetched_root {
                    if let Err(e) = self.repo_store.set_fetched_root(&task.repo_id, root) {
                        tracing::warn!(repo_id = %task.repo_id, error = %e, "failed to persist fetched root");
                    }
                }
                self.begin_checkout_or_merge(&mut task);
            }
            TransferEventKind::Error => {
                tracing::warn!(repo_id = %repo_id, detail = ?outcome.error_detail, "transfer failed");
                self.fail(&mut task, ErrorKind::Fetch);
            }
            TransferEventKind::Canceled => {
                tracing::warn!(repo_id = %repo_id, "unexpected CANCELED transfer outcome outside CANCEL_PENDING");
                self.fail(&mut task, ErrorKind::Internal);
            }
        }
        self.reinsert(task);
    }

    fn on_checkout(self: &Arc<Self>, repo_id: &RepositoryId, success: bool) {
        let Some(mut task) = self.take_task(repo_id) else {
            tracing::warn!(repo_id = %repo_id, "CHECKOUT completion for unknown task");
            return;
        };

        if task.state == TaskState::CancelPending {
            self.finalize_canceled(&mut task);
            self.reinsert(task);
            return;
        }

        if success {
            self.finalize_done(&mut task);
        } else {
            self.fail(&mut task, ErrorKind::Checkout);
        }
        self.reinsert(task);
    }

    fn on_merge(self: &Arc<Self>, repo_id: &RepositoryId, success: bool) {
        let Some(mut task) = self.take_task(repo_id) else {
            tracing::warn!(repo_id = %repo_id, "MERGE completion for unknown task");
            return;
        };

        if task.state == TaskState::CancelPending {
            self.finalize_canceled(&mut task);
            self.reinsert(task);
            return;
        }

        if success {
            self.finalize_done(&mut task);
        } else {
            self.fail(&mut task, ErrorKind::Merge);
        }
        self.reinsert(task);
    }

    fn take_task(&self, repo_id: &RepositoryId) -> Option<Task> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.tasks.remove(repo_id)
    }

    /// §5 "Repository record: ... the clone manager writes to it only at
    /// checkout/merge entry (password) and merge/fetch completion (head,
    /// worktree, token, email, relay info)".
    fn finalize_done(&self, task: &mut Task) {
        let head = task.remote_root.clone();
        let _ = self.store.delete(&task.repo_id);
        if let Some(head) = head {
            if let Err(e) = self.repo_store.set_head(&task.repo_id, head) {
                tracing::warn!(repo_id = %task.repo_id, error = %e, "failed to persist repository head");
            }
        }
        let _ = self.repo_store.set_worktree(&task.repo_id, &task.worktree);
        if let Err(e) = self.repo_store.set_token(&task.repo_id, &task.token) {
            tracing::warn!(repo_id = %task.repo_id, error = %e, "failed to persist repository token");
        }
        if let Err(e) = self.repo_store.set_email(&task.repo_id, &task.email) {
            tracing::warn!(repo_id = %task.repo_id, error = %e, "failed to persist repository email");
        }
        if let Err(e) =
            self.repo_store
                .set_relay_info(&task.repo_id, &task.peer_id, &task.peer_addr, task.peer_port)
        {
            tracing::warn!(repo_id = %task.repo_id, error = %e, "failed to persist repository relay info");
        }
        debug_assert!(task.state.can_transition_to(TaskState::Done));
        task.state = TaskState::Done;
        tracing::info!(repo_id = %task.repo_id, to = "DONE", "clone complete");
    }

    fn fail(&self, task: &mut Task, kind: ErrorKind) {
        let _ = self.store.delete(&task.repo_id);
        debug_assert!(task.state.can_transition_to(TaskState::Error) || task.state == TaskState::CancelPending);
        task.state = TaskState::Error;
        task.last_error = kind;
        tracing::warn!(repo_id = %task.repo_id, error = %kind, "clone failed");
    }

    fn finalize_canceled(&self, task: &mut Task) {
        let _ = self.store.delete(&task.repo_id);
        debug_assert!(task.state.can_transition_to(TaskState::Canceled));
        task.state = TaskState::Canceled;
        tracing::info!(repo_id = %task.repo_id, to = "CANCELED", "cancellation finalized");
    }
}

fn row_of(task: &Task) -> TaskRow {
    TaskRow {
        repo_id: task.repo_id.clone(),
        repo_name: task.repo_name.clone(),
        token: task.token.clone(),
        peer_id: task.peer_id.clone(),
        worktree: task.worktree.clone(),
        password: task.password.clone(),
        peer_addr: task.peer_addr.clone(),
        peer_port: task.peer_port,
        email: task.email.clone(),
    }
}

fn is_worktree_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut it| it.next().is_none()).unwrap_or(false)
}

/// The merge algorithm (§4.4): decide fast-forward vs full three-way and
/// drive the corresponding `MergeEngines` call. Runs on a worker thread.
#[allow(clippy::too_many_arguments)]
fn run_merge(
    merge: &dyn MergeEngines,
    indexer: &dyn Indexer,
    repo_id: &RepositoryId,
    worktree: &Path,
    password: Option<&str>,
    local_root: Option<RootTreeId>,
    remote_root: Option<RootTreeId>,
    email: &str,
    remote_creator: Option<&str>,
) -> Result<(), ()> {
    let Some(remote_root) = remote_root else {
        return Err(());
    };
    // Restart case 2 may not have an in-memory local_root; it is a pure
    // function of worktree content, so recomputing it here is safe and
    // idempotent (§7 "merge/checkout path is re-entered").
    let local_root = match local_root {
        Some(root) => root,
        None => indexer.index_worktree(repo_id, worktree, password).map_err(|_| ())?,
    };

    let index = IndexHandle(worktree.join(".clone-index"));
    let crypto = CryptoContext {
        password: password.map(ToOwned::to_owned),
    };

    if remote_root == local_root {
        return Ok(());
    }

    let fast_forward = merge.is_ancestor(&remote_root, &local_root).map_err(|_| ())?;

    let outcome = if fast_forward {
        merge.unpack_two_way(&index, &local_root, &remote_root, &crypto)
    } else {
        let ancestor = RootTreeId::new(EMPTY_TREE).unwrap_or_else(|_| unreachable!());
        // §4.4 wants the remote head's creator as the label; a restart that
        // re-enters this path without a fresh FETCH (case 2) has no durable
        // record of who authored the head it already has, so fall back to an
        // anonymous label rather than fabricating an identity.
        let remote_label = remote_creator.unwrap_or("unknown");
        merge.merge_three_way(&index, &ancestor, &local_root, &remote_root, email, remote_label, &crypto)
    }
    .map_err(|_| ())?;

    if outcome.success {
        Ok(())
    } else {
        Err(())
    }
}
