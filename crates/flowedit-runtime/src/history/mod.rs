#![forbid(unsafe_code)]

//! Undo/redo history for editor state.
//!
//! This module provides a generic, linear history over `Arc<T>` snapshots:
//!
//! - [`HistoryStore`] holds `past`, `present` and `future`, and decides when
//!   a change becomes a history entry.
//! - [`CommitMode`] selects the path a change takes: render-only, recorded
//!   now, or recorded after a quiet period.
//! - [`Update`] is either a ready value or a function of `present`.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use flowedit_runtime::history::{CommitMode, HistoryStore, Update};
//!
//! let mut store = HistoryStore::with_default_config(0);
//! store.set_state(Update::value(1), CommitMode::Immediate, Duration::ZERO);
//! store.set_state(Update::map(|v: &i32| v + 1), CommitMode::Immediate, Duration::ZERO);
//! assert_eq!(**store.present(), 2);
//!
//! store.undo();
//! assert_eq!(**store.present(), 1);
//! ```

mod store;
mod subscribers;
mod update;

pub use store::{DEFAULT_DEBOUNCE_MS, HistoryConfig, HistoryState, HistoryStore};
pub use subscribers::Subscription;
pub use update::{CommitMode, Update};
