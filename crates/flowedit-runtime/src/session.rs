#![forbid(unsafe_code)]

//! The editor session: history, coalescing, persistence and bootstrap wired
//! together behind the contract the canvas layer consumes.
//!
//! # Contract
//!
//! The rendering layer needs only `state`, `set_state`, `undo`, `redo`,
//! `can_undo` and `can_redo`. The canvas additionally feeds raw change
//! batches through `on_nodes_change`, `on_edges_change` and `on_connect`,
//! and calls `on_animation_frame` / `tick` from its event loop.
//!
//! # Cooperative I/O
//!
//! Persistence futures are owned by the session and polled on the caller's
//! thread by [`pump`](EditorSession::pump), which never blocks. Every
//! operation that can change `present` pumps once before returning. A host
//! that wants all outstanding I/O finished awaits
//! [`flush`](EditorSession::flush).
//!
//! The live flow is mirrored at most once per recorded step. While a drag
//! gesture is in progress its render-only frames stay in the mirror's
//! pending slot and the release writes the final value once. `flush`
//! writes a held value immediately.
//!
//! # Bootstrap
//!
//! ```text
//! new()            start_bootstrap()          bootstrap resolves
//!   │ default shown     │ mirror paused            │ reset(resolved) if untouched
//!   ▼                   ▼                          ▼ mirror resumed
//! NotStarted ───────► Pending ───────────────────► Settled(source)
//! ```
//!
//! While bootstrap is pending the mirror keeps collecting values but writes
//! nothing, so the hard-coded default can never overwrite saved work.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use flowedit_core::{
    Connection, DragPhase, EdgeChange, FlowState, KeyChord, NodeChange, ShortcutAction,
    default_flow,
};
use futures_util::future::LocalBoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::task::noop_waker_ref;
use futures_util::{FutureExt, StreamExt};
use tracing::{debug, info, warn};

use crate::bootstrap::{BootstrapResolver, BootstrapSource, Resolved};
use crate::coalescer::{ChangeCoalescer, CoalescerStats};
use crate::config::EditorConfig;
use crate::history::{CommitMode, HistoryConfig, HistoryState, HistoryStore, Subscription, Update};
use crate::scheduler::Clock;
use crate::storage::{
    FileTextStore, KeyValueStore, Mirror, MirrorStats, PersistenceGateway, RedbStore,
    StorageError, TextStore,
};

// ============================================================================
// Errors
// ============================================================================

/// Failures of explicit draft operations. These are the only persistence
/// errors surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    /// The name is empty after trimming.
    EmptyName,
    /// No draft has this name.
    NotFound(String),
    /// The stored draft is not a valid flow.
    Invalid(String),
    /// Another draft already has this name.
    NameTaken(String),
    /// Storage failed.
    Storage(StorageError),
}

impl fmt::Display for DraftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "draft name must not be empty"),
            Self::NotFound(name) => write!(f, "no draft named {name:?}"),
            Self::Invalid(name) => write!(f, "draft {name:?} is not a valid flow"),
            Self::NameTaken(name) => write!(f, "a draft named {name:?} already exists"),
            Self::Storage(err) => write!(f, "draft storage failed: {err}"),
        }
    }
}

impl std::error::Error for DraftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for DraftError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

fn draft_name(name: &str) -> Result<&str, DraftError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(DraftError::EmptyName)
    } else {
        Ok(trimmed)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Progress of startup resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    /// `start_bootstrap` has not been called.
    NotStarted,
    /// Resolution is in flight; the default is being shown.
    Pending,
    /// Resolution finished.
    Settled(BootstrapSource),
}

enum Completion {
    Mirror(Result<(), StorageError>),
    Bootstrap(Option<Resolved>),
}

/// One open editor.
pub struct EditorSession<S, F, C> {
    store: HistoryStore<FlowState>,
    coalescer: ChangeCoalescer,
    gateway: Rc<PersistenceGateway<S>>,
    fallback: Rc<F>,
    mirror: Mirror<F>,
    clock: C,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    bootstrap: BootstrapState,
    /// The value shown before bootstrap; used to detect user edits.
    initial: Arc<FlowState>,
    _mirror_subscription: Subscription,
}

/// A session persisting to a redb file with a file-backed fallback copy.
pub type DurableSession<C> = EditorSession<RedbStore, FileTextStore, C>;

impl<S, F, C> fmt::Debug for EditorSession<S, F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorSession")
            .field("store", &self.store)
            .field("coalescer", &self.coalescer)
            .field("bootstrap", &self.bootstrap)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<S, F, C> EditorSession<S, F, C>
where
    S: KeyValueStore + 'static,
    F: TextStore + 'static,
    C: Clock,
{
    /// Open a session showing the hard-coded default flow.
    #[must_use]
    pub fn new(
        gateway: PersistenceGateway<S>,
        fallback: F,
        clock: C,
        config: HistoryConfig,
    ) -> Self {
        Self::with_initial(gateway, fallback, clock, config, default_flow())
    }

    /// Open a session showing `initial`.
    #[must_use]
    pub fn with_initial(
        gateway: PersistenceGateway<S>,
        fallback: F,
        clock: C,
        config: HistoryConfig,
        initial: FlowState,
    ) -> Self {
        let initial = Arc::new(initial);
        let fallback = Rc::new(fallback);
        let mirror = Mirror::new(Rc::clone(&fallback));
        let mut store = HistoryStore::new(Arc::clone(&initial), config);
        let subscription = store.subscribe(mirror.listener());
        Self {
            store,
            coalescer: ChangeCoalescer::new(),
            gateway: Rc::new(gateway),
            fallback,
            mirror,
            clock,
            in_flight: FuturesUnordered::new(),
            bootstrap: BootstrapState::NotStarted,
            initial,
            _mirror_subscription: subscription,
        }
    }

    /// Resolve persisted state first, then open a session showing it.
    pub async fn open_with_bootstrap(
        gateway: PersistenceGateway<S>,
        fallback: F,
        clock: C,
        config: HistoryConfig,
    ) -> Self {
        let resolved = BootstrapResolver::new(&gateway, &fallback)
            .resolve_or(default_flow())
            .await;
        info!(source = resolved.source.as_str(), "bootstrap settled");
        let mut session = Self::with_initial(gateway, fallback, clock, config, resolved.state);
        session.bootstrap = BootstrapState::Settled(resolved.source);
        session
    }

    // ====================================================================
    // UI contract
    // ====================================================================

    /// The value to render.
    #[must_use]
    pub fn state(&self) -> &Arc<FlowState> {
        self.store.present()
    }

    pub fn set_state(&mut self, update: impl Into<Update<FlowState>>, mode: CommitMode) {
        let now = self.now();
        self.store.set_state(update, mode, now);
        self.pump();
    }

    pub fn undo(&mut self) -> bool {
        let changed = self.store.undo();
        self.pump();
        changed
    }

    pub fn redo(&mut self) -> bool {
        let changed = self.store.redo();
        self.pump();
        changed
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.store.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.store.can_redo()
    }

    /// Register a listener for `present` changes.
    pub fn subscribe(&mut self, callback: impl Fn(&Arc<FlowState>) + 'static) -> Subscription {
        self.store.subscribe(callback)
    }

    /// Run the undo/redo action bound to `chord`.
    ///
    /// Returns `true` if the chord is a history shortcut, whether or not
    /// there was anything to undo or redo.
    pub fn handle_shortcut(&mut self, chord: &KeyChord) -> bool {
        match ShortcutAction::from_chord(chord) {
            Some(ShortcutAction::Undo) => {
                self.undo();
                true
            }
            Some(ShortcutAction::Redo) => {
                self.redo();
                true
            }
            None => false,
        }
    }

    // ====================================================================
    // Canvas entry points
    // ====================================================================

    pub fn on_nodes_change(&mut self, changes: Vec<NodeChange>) -> DragPhase {
        let now = self.now();
        let phase = self.coalescer.on_nodes_change(changes, &mut self.store, now);
        self.pump();
        phase
    }

    pub fn on_edges_change(&mut self, changes: Vec<EdgeChange>) {
        let now = self.now();
        self.coalescer.on_edges_change(changes, &mut self.store, now);
        self.pump();
    }

    pub fn on_connect(&mut self, connection: Connection) {
        let now = self.now();
        self.coalescer.on_connect(connection, &mut self.store, now);
        self.pump();
    }

    /// Animation-frame callback. Returns `true` if a drag batch was applied.
    pub fn on_animation_frame(&mut self) -> bool {
        let now = self.now();
        let applied = self.coalescer.on_animation_frame(&mut self.store, now);
        self.pump();
        applied
    }

    /// The coalescer is waiting for an animation frame.
    #[must_use]
    pub fn frame_requested(&self) -> bool {
        self.coalescer.frame_requested()
    }

    /// Fire a due debounced commit. Returns `true` if one was recorded.
    pub fn tick(&mut self) -> bool {
        let now = self.now();
        let committed = self.store.tick(now);
        self.pump();
        committed
    }

    /// Deadline of the pending debounced commit, on the session clock.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.store.pending_deadline()
    }

    // ====================================================================
    // Persistence
    // ====================================================================

    /// Begin resolving persisted state. The default stays visible and the
    /// mirror is paused until resolution settles.
    ///
    /// Returns `false` if bootstrap already ran.
    pub fn start_bootstrap(&mut self) -> bool {
        if self.bootstrap != BootstrapState::NotStarted {
            return false;
        }
        self.bootstrap = BootstrapState::Pending;
        self.mirror.set_enabled(false);
        let gateway = Rc::clone(&self.gateway);
        let fallback = Rc::clone(&self.fallback);
        self.in_flight.push(
            async move {
                let resolved = BootstrapResolver::new(&gateway, &*fallback).resolve().await;
                Completion::Bootstrap(resolved)
            }
            .boxed_local(),
        );
        debug!("bootstrap started");
        self.pump();
        true
    }

    #[must_use]
    pub fn bootstrap_state(&self) -> BootstrapState {
        self.bootstrap
    }

    /// Poll in-flight persistence once without blocking. Returns the number
    /// of operations that completed.
    pub fn pump(&mut self) -> usize {
        let mut completed = 0;
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            self.schedule_mirror_write(false);
            match self.in_flight.poll_next_unpin(&mut cx) {
                Poll::Ready(Some(completion)) => {
                    self.complete(completion);
                    completed += 1;
                }
                Poll::Ready(None) | Poll::Pending => break,
            }
        }
        completed
    }

    /// Drive all persistence work, including bootstrap, to completion. A
    /// value held back by an unfinished drag is written too.
    pub async fn flush(&mut self) {
        loop {
            self.schedule_mirror_write(true);
            match self.in_flight.next().await {
                Some(completion) => self.complete(completion),
                None => break,
            }
        }
    }

    /// Nothing is in flight and nothing waits to be mirrored.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && (self.mirror.is_idle() || !self.mirror.is_enabled())
    }

    // ====================================================================
    // Drafts
    // ====================================================================

    /// Save `present` as a draft. Returns the trimmed name used.
    pub async fn save_draft(&self, name: &str) -> Result<String, DraftError> {
        let name = draft_name(name)?;
        let flow = Arc::clone(self.store.present());
        self.gateway.save_draft(name, &flow).await?;
        info!(name, "draft saved");
        Ok(name.to_owned())
    }

    /// Replace `present` with a draft as one undoable step.
    pub async fn load_draft(&mut self, name: &str) -> Result<(), DraftError> {
        let flow = match self.gateway.load_draft(name).await {
            Ok(Some(flow)) => flow,
            Ok(None) => return Err(DraftError::NotFound(name.to_owned())),
            Err(StorageError::Serialization(msg)) => {
                warn!(name, error = %msg, "draft is malformed");
                return Err(DraftError::Invalid(name.to_owned()));
            }
            Err(err) => return Err(err.into()),
        };
        self.set_state(Update::value(flow), CommitMode::Immediate);
        info!(name, "draft loaded");
        Ok(())
    }

    /// Rename a draft in one step. Returns the trimmed new name.
    ///
    /// Renaming a draft to its own name succeeds without writing. A missing
    /// source is [`DraftError::NotFound`] either way.
    pub async fn rename_draft(&self, from: &str, to: &str) -> Result<String, DraftError> {
        let to = draft_name(to)?;
        match self.gateway.rename_draft(from, to).await {
            Ok(()) => {
                info!(from, to, "draft renamed");
                Ok(to.to_owned())
            }
            Err(StorageError::KeyExists(_)) => Err(DraftError::NameTaken(to.to_owned())),
            Err(StorageError::NotFound(_)) => Err(DraftError::NotFound(from.to_owned())),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete_draft(&self, name: &str) -> Result<(), DraftError> {
        self.gateway.delete_draft(name).await?;
        info!(name, "draft deleted");
        Ok(())
    }

    /// Draft names in ascending order.
    pub async fn list_drafts(&self) -> Result<Vec<String>, DraftError> {
        Ok(self.gateway.list_drafts().await?)
    }

    pub async fn draft_exists(&self, name: &str) -> Result<bool, DraftError> {
        Ok(self.gateway.draft_exists(name).await?)
    }

    // ====================================================================
    // Lifecycle and diagnostics
    // ====================================================================

    /// Tear down: cancel the debounce timer and any pending frame. Writes
    /// already in flight may still be finished with [`flush`](Self::flush).
    pub fn dispose(&mut self) {
        self.store.dispose();
        self.coalescer.cancel();
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStore<FlowState> {
        &self.store
    }

    #[must_use]
    pub fn snapshot(&self) -> HistoryState<FlowState> {
        self.store.snapshot()
    }

    #[must_use]
    pub fn gateway(&self) -> &PersistenceGateway<S> {
        &self.gateway
    }

    #[must_use]
    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.coalescer.stats()
    }

    #[must_use]
    pub fn mirror_stats(&self) -> MirrorStats {
        self.mirror.stats()
    }

    // ====================================================================
    // Internal
    // ====================================================================

    fn now(&self) -> Duration {
        self.clock.now_mono()
    }

    /// Hand the next mirrored value to the durable store. Values produced
    /// mid-gesture are held unless `force` is set.
    fn schedule_mirror_write(&mut self, force: bool) {
        if self.coalescer.in_gesture() && !force {
            return;
        }
        let Some(flow) = self.mirror.next_write() else {
            return;
        };
        let gateway = Rc::clone(&self.gateway);
        self.in_flight.push(
            async move { Completion::Mirror(gateway.save_current(&flow).await) }.boxed_local(),
        );
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Mirror(result) => self.mirror.complete(result),
            Completion::Bootstrap(resolved) => self.settle_bootstrap(resolved),
        }
    }

    fn settle_bootstrap(&mut self, resolved: Option<Resolved>) {
        let source = match resolved {
            Some(Resolved { state, source }) => {
                let untouched = !self.store.has_committed()
                    && Arc::ptr_eq(self.store.present(), &self.initial);
                if untouched {
                    self.store.reset(Arc::new(state));
                    info!(source = source.as_str(), "bootstrap applied");
                } else {
                    info!(
                        source = source.as_str(),
                        "bootstrap result discarded; editor already edited"
                    );
                }
                source
            }
            None => {
                info!(source = "default", "bootstrap settled");
                BootstrapSource::Default
            }
        };
        self.bootstrap = BootstrapState::Settled(source);
        self.mirror.set_enabled(true);
    }
}

impl<C: Clock> DurableSession<C> {
    /// Open a session over the files named in `config`, showing the
    /// default flow. Call [`start_bootstrap`](Self::start_bootstrap) to load
    /// saved state.
    #[must_use]
    pub fn from_config(config: &EditorConfig, clock: C) -> Self {
        Self::new(
            PersistenceGateway::new(RedbStore::new(&config.storage.database_path)),
            FileTextStore::new(&config.storage.fallback_dir),
            clock,
            config.history.clone(),
        )
    }
}
