#![forbid(unsafe_code)]

//! End-to-end tests for on-disk persistence.
//!
//! Validates:
//! - Draft save/list/load/rename/delete against a redb file
//! - Rename atomicity when the destination is taken
//! - Schema version checks on open
//! - The file-backed fallback copy
//! - State surviving a restart, from the database or the fallback copy
//! - One durable write per drag gesture, however many frames it renders
//!
//! Run:
//!   cargo test -p flowedit-runtime --test e2e_persistence

use std::path::Path;
use std::time::Duration;

use flowedit_core::{FlowState, Node, NodeChange, NodeKind, XYPosition, default_flow};
use flowedit_runtime::{
    BootstrapSource, BootstrapState, CommitMode, DraftError, DurableSession, EditorConfig,
    FALLBACK_KEY, FileTextStore, KeyValueStore, ManualClock, PersistenceGateway, RedbStore,
    SCHEMA_VERSION, StorageConfig, StorageError, StoreName, TextStore, Update,
};
use pollster::block_on;

fn flow(ids: &[&str]) -> FlowState {
    FlowState::new(
        ids.iter()
            .map(|id| Node::new(*id, NodeKind::TextToImage, XYPosition::new(1.0, 2.0)))
            .collect(),
        Vec::new(),
    )
}

fn ids(state: &FlowState) -> Vec<String> {
    state.nodes.iter().map(|n| n.id.clone()).collect()
}

fn config(root: &Path) -> EditorConfig {
    EditorConfig {
        storage: StorageConfig::under(root),
        ..EditorConfig::default()
    }
}

// ============================================================================
// Drafts on redb
// ============================================================================

#[test]
fn scenario_b_drafts_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = PersistenceGateway::new(RedbStore::new(dir.path().join("drafts.redb")));

    let x = flow(&["x"]);
    let y = flow(&["y"]);
    block_on(gateway.save_draft("v1", &x)).unwrap();
    block_on(gateway.save_draft("v2", &y)).unwrap();
    assert_eq!(block_on(gateway.list_drafts()).unwrap(), vec!["v1", "v2"]);

    block_on(gateway.rename_draft("v1", "v1-final")).unwrap();
    assert_eq!(
        block_on(gateway.list_drafts()).unwrap(),
        vec!["v1-final", "v2"]
    );
    assert_eq!(block_on(gateway.load_draft("v1-final")).unwrap(), Some(x));
    assert_eq!(block_on(gateway.load_draft("v1")).unwrap(), None);

    block_on(gateway.delete_draft("v2")).unwrap();
    assert_eq!(block_on(gateway.list_drafts()).unwrap(), vec!["v1-final"]);
}

#[test]
fn rename_onto_taken_name_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = PersistenceGateway::new(RedbStore::new(dir.path().join("drafts.redb")));
    let a = flow(&["a"]);
    let b = flow(&["b"]);
    block_on(gateway.save_draft("a", &a)).unwrap();
    block_on(gateway.save_draft("b", &b)).unwrap();

    let err = block_on(gateway.rename_draft("a", "b")).unwrap_err();
    assert_eq!(err, StorageError::KeyExists("b".into()));
    assert_eq!(block_on(gateway.load_draft("a")).unwrap(), Some(a));
    assert_eq!(block_on(gateway.load_draft("b")).unwrap(), Some(b));
}

#[test]
fn drafts_and_current_slot_are_separate() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbStore::new(dir.path().join("db.redb"));
    let gateway = PersistenceGateway::new(store.clone());

    block_on(gateway.save_current(&flow(&["live"]))).unwrap();
    block_on(gateway.save_draft("d", &flow(&["draft"]))).unwrap();

    let flow_keys = block_on(store.get_all_keys(StoreName::Flow)).unwrap();
    let draft_keys = block_on(store.get_all_keys(StoreName::Drafts)).unwrap();
    assert_eq!(flow_keys.into_iter().collect::<Vec<_>>(), vec!["state"]);
    assert_eq!(draft_keys.into_iter().collect::<Vec<_>>(), vec!["d"]);

    block_on(gateway.clear_current()).unwrap();
    assert_eq!(block_on(gateway.load_current()).unwrap(), None);
    assert!(block_on(gateway.draft_exists("d")).unwrap());
}

#[test]
fn data_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.redb");
    {
        let gateway = PersistenceGateway::new(RedbStore::new(&path));
        block_on(gateway.save_draft("keep", &default_flow())).unwrap();
    }
    let gateway = PersistenceGateway::new(RedbStore::new(&path));
    assert_eq!(
        block_on(gateway.load_draft("keep")).unwrap(),
        Some(default_flow())
    );
}

// ============================================================================
// Schema versioning
// ============================================================================

#[test]
fn newer_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbStore::new(dir.path().join("db.redb"));
    store.write_schema_version(SCHEMA_VERSION + 1).unwrap();

    let err = block_on(store.get(StoreName::Flow, "state")).unwrap_err();
    assert_eq!(
        err,
        StorageError::SchemaMismatch {
            found: SCHEMA_VERSION + 1,
            expected: SCHEMA_VERSION,
        }
    );
}

#[test]
fn session_over_mismatched_schema_uses_fallback_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    RedbStore::new(&cfg.storage.database_path)
        .write_schema_version(SCHEMA_VERSION + 7)
        .unwrap();
    FileTextStore::new(&cfg.storage.fallback_dir)
        .set_item(FALLBACK_KEY, &flow(&["copy"]).to_json_string().unwrap())
        .unwrap();

    let mut session = DurableSession::from_config(&cfg, ManualClock::new());
    session.start_bootstrap();
    assert_eq!(session.bootstrap_state(), BootstrapState::Pending);
    block_on(session.flush());
    assert_eq!(
        session.bootstrap_state(),
        BootstrapState::Settled(BootstrapSource::Fallback)
    );
    assert_eq!(ids(session.state()), vec!["copy"]);

    // Durable writes fail quietly, both for the restored value and the edit.
    session.set_state(Update::value(flow(&["next"])), CommitMode::Immediate);
    block_on(session.flush());
    assert!(session.is_idle());
    assert_eq!(session.mirror_stats().durable_failures, 2);
    assert!(session.can_undo());
    assert!(matches!(
        block_on(session.save_draft("v1")),
        Err(DraftError::Storage(StorageError::SchemaMismatch { .. }))
    ));
}

// ============================================================================
// Fallback text store
// ============================================================================

#[test]
fn file_text_store_round_trips_and_removes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTextStore::new(dir.path().join("nested/local"));

    assert_eq!(store.get_item(FALLBACK_KEY).unwrap(), None);
    store.set_item(FALLBACK_KEY, "{\"nodes\":[],\"edges\":[]}").unwrap();
    store.set_item(FALLBACK_KEY, "second").unwrap();
    assert_eq!(store.get_item(FALLBACK_KEY).unwrap().as_deref(), Some("second"));

    store.remove_item(FALLBACK_KEY).unwrap();
    store.remove_item(FALLBACK_KEY).unwrap();
    assert_eq!(store.get_item(FALLBACK_KEY).unwrap(), None);
}

// ============================================================================
// Restart
// ============================================================================

#[test]
fn edits_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let clock = ManualClock::new();

    {
        let mut session = DurableSession::from_config(&cfg, clock.clone());
        session.start_bootstrap();
        block_on(session.flush());
        assert_eq!(
            session.bootstrap_state(),
            BootstrapState::Settled(BootstrapSource::Default)
        );
        session.set_state(Update::value(flow(&["a"])), CommitMode::Debounced);
        clock.advance(Duration::from_millis(300));
        session.tick();
        block_on(session.flush());
        session.dispose();
    }

    let mut session = DurableSession::from_config(&cfg, clock);
    session.start_bootstrap();
    block_on(session.flush());
    assert_eq!(
        session.bootstrap_state(),
        BootstrapState::Settled(BootstrapSource::Durable)
    );
    assert_eq!(ids(session.state()), vec!["a"]);
    assert!(!session.can_undo());
}

#[test]
fn fallback_copy_restores_when_database_is_lost() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());

    {
        let mut session = DurableSession::from_config(&cfg, ManualClock::new());
        session.start_bootstrap();
        block_on(session.flush());
        session.set_state(Update::value(flow(&["b"])), CommitMode::Immediate);
        block_on(session.flush());
    }
    std::fs::remove_file(&cfg.storage.database_path).unwrap();

    let session = block_on(DurableSession::open_with_bootstrap(
        PersistenceGateway::new(RedbStore::new(&cfg.storage.database_path)),
        FileTextStore::new(&cfg.storage.fallback_dir),
        ManualClock::new(),
        cfg.history.clone(),
    ));
    assert_eq!(
        session.bootstrap_state(),
        BootstrapState::Settled(BootstrapSource::Fallback)
    );
    assert_eq!(ids(session.state()), vec!["b"]);
}

#[test]
fn drafts_through_a_durable_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = DurableSession::from_config(&config(dir.path()), ManualClock::new());

    session.set_state(Update::value(flow(&["one"])), CommitMode::Immediate);
    assert_eq!(block_on(session.save_draft("first")).unwrap(), "first");
    session.set_state(Update::value(flow(&["two"])), CommitMode::Immediate);

    block_on(session.load_draft("first")).unwrap();
    assert_eq!(ids(session.state()), vec!["one"]);
    assert!(session.undo());
    assert_eq!(ids(session.state()), vec!["two"]);

    assert_eq!(
        block_on(session.rename_draft("first", "renamed")).unwrap(),
        "renamed"
    );
    assert!(!block_on(session.draft_exists("first")).unwrap());
    assert_eq!(block_on(session.list_drafts()).unwrap(), vec!["renamed"]);

    assert_eq!(
        block_on(session.rename_draft("renamed", " renamed ")).unwrap(),
        "renamed"
    );
    assert_eq!(
        block_on(session.rename_draft("missing", "missing")),
        Err(DraftError::NotFound("missing".into()))
    );
}

// ============================================================================
// Live mirroring
// ============================================================================

#[test]
fn drag_frames_are_written_once_per_gesture() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = DurableSession::from_config(&config(dir.path()), ManualClock::new());

    for frame in 1..=50 {
        session.on_nodes_change(vec![NodeChange::drag(
            "text-to-text-1",
            XYPosition::new(f64::from(frame), 0.0),
        )]);
        assert!(session.on_animation_frame());
    }
    assert_eq!(session.coalescer_stats().frames_applied, 50);
    assert_eq!(session.mirror_stats().writes_started, 0);

    session.on_nodes_change(vec![NodeChange::drag_end("text-to-text-1", None)]);
    block_on(session.flush());
    let stats = session.mirror_stats();
    assert_eq!(stats.writes_started, 1);
    assert_eq!(stats.durable_failures, 0);

    let saved = block_on(session.gateway().load_current()).unwrap().unwrap();
    assert_eq!(saved.nodes[0].position.x, 50.0);
    assert!(!saved.nodes[0].dragging);
}

#[test]
fn flush_writes_a_value_held_by_an_unfinished_drag() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = DurableSession::from_config(&config(dir.path()), ManualClock::new());

    session.on_nodes_change(vec![NodeChange::drag(
        "text-to-text-1",
        XYPosition::new(7.0, 7.0),
    )]);
    session.on_animation_frame();
    assert!(!session.is_idle());

    block_on(session.flush());
    assert!(session.is_idle());
    assert_eq!(session.mirror_stats().writes_started, 1);
    let saved = block_on(session.gateway().load_current()).unwrap().unwrap();
    assert_eq!(saved.nodes[0].position.x, 7.0);
}
