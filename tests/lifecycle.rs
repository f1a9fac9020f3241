//! The happy-path scenarios from §8's concrete scenario list: an
//! empty-target clone (checkout) and a pre-populated-target clone (merge).

mod support;

use support::{build_harness, sample_peer_id, sample_repo_id};

#[test]
fn empty_target_clone_reaches_done_via_checkout() {
    let h = build_harness();
    let peer_id = sample_peer_id(b'a');
    let repo_id = sample_repo_id(b'1');
    h.peer_layer.set_connected(peer_id.clone(), true);

    let dir = tempfile::tempdir().expect("tempdir");
    let worktree = dir.path().join("demo-repo");

    h.manager
        .add_task(
            repo_id.clone(),
            peer_id,
            "demo-repo".to_owned(),
            "tok".to_owned(),
            None,
            &worktree,
            "10.0.0.1".to_owned(),
            9_000,
            "owner@example.com".to_owned(),
        )
        .expect("admitted");

    // Peer already connected and worktree empty -> FETCH directly.
    let snap = h.manager.get_task(&repo_id).expect("task exists");
    assert_eq!(snap.state, "FETCH");

    h.manager.report_transfer_outcome(clone_collab::traits::TransferOutcome {
        handle: clone_collab::traits::TransferHandle(0),
        kind: clone_collab::traits::TransferEventKind::Success,
        is_clone: true,
        fetched_root: Some(clone_collab::RootTreeId::new("2".repeat(40)).expect("valid")),
        remote_creator: Some("owner@example.com".to_owned()),
        error_detail: None,
    });
    h.manager.pump_events();

    let snap = h.manager.get_task(&repo_id).expect("task exists");
    assert_eq!(snap.state, "DONE");
    assert_eq!(
        h.repo_store.head_of(&repo_id),
        Some(clone_collab::RootTreeId::new("2".repeat(40)).expect("valid"))
    );
}

#[test]
fn pre_populated_target_clone_reaches_done_via_merge() {
    let h = build_harness();
    let peer_id = sample_peer_id(b'b');
    let repo_id = sample_repo_id(b'2');
    h.peer_layer.set_connected(peer_id.clone(), true);

    let dir = tempfile::tempdir().expect("tempdir");
    let worktree = dir.path().join("demo-repo");
    std::fs::create_dir_all(&worktree).expect("mkdir");
    std::fs::write(worktree.join("existing.txt"), b"pre-existing content").expect("write");

    h.manager
        .add_task(
            repo_id.clone(),
            peer_id,
            "demo-repo".to_owned(),
            "tok".to_owned(),
            None,
            &worktree,
            "10.0.0.1".to_owned(),
            9_000,
            "owner@example.com".to_owned(),
        )
        .expect("admitted");

    // Non-empty worktree -> INDEX runs inline via the sync job runner, then
    // FETCH starts immediately.
    let snap = h.manager.get_task(&repo_id).expect("task exists");
    assert_eq!(snap.state, "FETCH");

    // Force the full three-way merge path (rather than fast-forward) so the
    // remote-creator label actually reaches `merge_three_way`.
    *h.merge.ancestor.lock().expect("lock") = false;

    h.manager.report_transfer_outcome(clone_collab::traits::TransferOutcome {
        handle: clone_collab::traits::TransferHandle(0),
        kind: clone_collab::traits::TransferEventKind::Success,
        is_clone: false,
        fetched_root: Some(clone_collab::RootTreeId::new("3".repeat(40)).expect("valid")),
        remote_creator: Some("remote-owner@example.com".to_owned()),
        error_detail: None,
    });
    h.manager.pump_events();

    let snap = h.manager.get_task(&repo_id).expect("task exists");
    assert_eq!(snap.state, "DONE");
    assert_eq!(
        *h.merge.last_remote_label.lock().expect("lock"),
        Some("remote-owner@example.com".to_owned())
    );
}

#[test]
fn disconnected_peer_waits_for_watcher_tick() {
    let h = build_harness();
    let peer_id = sample_peer_id(b'c');
    let repo_id = sample_repo_id(b'3');
    // Peer starts unknown/unconnected.

    let dir = tempfile::tempdir().expect("tempdir");
    let worktree = dir.path().join("demo-repo");

    h.manager
        .add_task(
            repo_id.clone(),
            peer_id.clone(),
            "demo-repo".to_owned(),
            "tok".to_owned(),
            None,
            &worktree,
            "10.0.0.1".to_owned(),
            9_000,
            "owner@example.com".to_owned(),
        )
        .expect("admitted");

    assert_eq!(h.manager.get_task(&repo_id).expect("exists").state, "CONNECT");

    // A tick while still disconnected changes nothing.
    h.timer.fire();
    h.manager.pump_events();
    assert_eq!(h.manager.get_task(&repo_id).expect("exists").state, "CONNECT");

    h.peer_layer.set_connected(peer_id, true);
    h.timer.fire();
    h.manager.pump_events();
    assert_eq!(h.manager.get_task(&repo_id).expect("exists").state, "FETCH");
}

#[test]
fn list_tasks_reflects_admitted_tasks() {
    let h = build_harness();
    let peer_id = sample_peer_id(b'd');
    let repo_id = sample_repo_id(b'4');
    h.peer_layer.set_connected(peer_id.clone(), true);
    let dir = tempfile::tempdir().expect("tempdir");
    let worktree = dir.path().join("demo-repo");

    assert!(h.manager.list_tasks().is_empty());

    h.manager
        .add_task(
            repo_id.clone(),
            peer_id,
            "demo-repo".to_owned(),
            "tok".to_owned(),
            None,
            &worktree,
            "10.0.0.1".to_owned(),
            9_000,
            "owner@example.com".to_owned(),
        )
        .expect("admitted");

    let listed = h.manager.list_tasks();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].repo_id, repo_id);
}
