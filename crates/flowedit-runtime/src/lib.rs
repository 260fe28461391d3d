#![forbid(unsafe_code)]

//! flowedit Runtime
//!
//! This crate provides the state core of the flow editor: undo/redo history,
//! per-frame coalescing of canvas changes, persistence, and startup
//! resolution of saved state.
//!
//! # Key Components
//!
//! - [`HistoryStore`] - Linear undo/redo over `Arc` snapshots with
//!   debounced, immediate and render-only commit paths
//! - [`ChangeCoalescer`] - Collapses drag bursts into one render per frame
//!   and one history entry per gesture
//! - [`PersistenceGateway`] - Current-state slot and named drafts over a
//!   [`KeyValueStore`]
//! - [`BootstrapResolver`] - Picks the initial flow from durable storage,
//!   the fallback copy, or the default
//! - [`EditorSession`] - Wires all of the above behind the UI contract
//!
//! # Role in flowedit
//! `flowedit-runtime` sits between the canvas and storage. It consumes
//! change batches defined in `flowedit-core`, owns the only mutable copy of
//! editor state, and mirrors it to disk.
//!
//! # Execution model
//! Everything runs on one cooperative event loop. Timers and animation
//! frames are single-slot requests driven by the host through
//! [`EditorSession::tick`] and [`EditorSession::on_animation_frame`];
//! persistence futures are polled by [`EditorSession::pump`].

pub mod bootstrap;
pub mod coalescer;
pub mod config;
pub mod history;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use bootstrap::{BootstrapResolver, BootstrapSource, Resolved};
pub use coalescer::{ChangeCoalescer, CoalescerStats};
pub use config::{ConfigError, EditorConfig, StorageConfig};
pub use history::{
    CommitMode, HistoryConfig, HistoryState, HistoryStore, Subscription, Update,
};
pub use scheduler::{Clock, FrameSlot, ManualClock, MonotonicClock, TimerSlot};
pub use session::{BootstrapState, DraftError, DurableSession, EditorSession};
pub use storage::{
    CURRENT_STATE_KEY, FALLBACK_KEY, FileTextStore, KeyValueStore, MemoryStore, MemoryTextStore,
    Mirror, MirrorStats, PersistenceGateway, RedbStore, SCHEMA_VERSION, StorageError, StoreName,
    TextStore,
};
