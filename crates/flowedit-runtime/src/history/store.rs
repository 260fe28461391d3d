#![forbid(unsafe_code)]

//! Linear undo/redo store with debounced, immediate, and render-only updates.
//!
//! # Architecture
//!
//! ```text
//! set_state(v1, Debounced)  set_state(v2, Debounced)   tick(t + 300ms)
//! ┌──────────────────────┐  ┌──────────────────────┐  ┌──────────────────────┐
//! │ Past:    [s0]        │  │ Past:    [s0]        │  │ Past:    [s0, s1]    │
//! │ Base:    s1          │  │ Base:    s1          │  │ Base:    v2          │
//! │ Present: v1          │  │ Present: v2          │  │ Present: v2          │
//! │ Timer:   t + 300ms   │  │ Timer:   t' + 300ms  │  │ Timer:   -           │
//! └──────────────────────┘  └──────────────────────┘  └──────────────────────┘
//! ```
//!
//! `present` is what gets rendered. `base` is the last value that was
//! recorded in history. A commit pushes `base` onto `past` and then moves
//! `base` up to `present`, so a debounced burst or a render-only drag leaves
//! exactly one entry holding the value from before the burst.
//!
//! # Invariants
//!
//! 1. `future` is cleared by every commit that is not an undo or redo.
//! 2. A commit whose value is reference-equal to `base` records nothing.
//! 3. At most one debounced commit is pending; rescheduling replaces it.
//! 4. `past.len() <= config.max_depth`.
//! 5. After [`dispose`](HistoryStore::dispose) no operation mutates the store.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::subscribers::{Subscribers, Subscription};
use super::update::{CommitMode, Update};
use crate::scheduler::TimerSlot;

/// Default quiet period before a debounced edit is recorded.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Configuration for the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Quiet period, in milliseconds, before a debounced edit is recorded.
    pub debounce_ms: u64,
    /// Maximum number of `past` entries. Oldest entries are evicted first.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl HistoryConfig {
    /// Create a configuration with the default debounce and the given depth.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_depth,
        }
    }

    /// Default debounce with no depth limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Override the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Point-in-time view of the store.
#[derive(Clone)]
pub struct HistoryState<T> {
    /// Recorded states, oldest first.
    pub past: Vec<Arc<T>>,
    pub present: Arc<T>,
    /// Undone states, nearest redo first.
    pub future: Vec<Arc<T>>,
}

impl<T: fmt::Debug> fmt::Debug for HistoryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryState")
            .field("past", &self.past)
            .field("present", &self.present)
            .field("future", &self.future)
            .finish()
    }
}

/// Undo/redo store over `Arc<T>` snapshots.
///
/// Reference equality (`Arc::ptr_eq`) decides whether anything changed, so
/// an updater that returns the current `Arc` is a no-op.
pub struct HistoryStore<T: 'static> {
    past: VecDeque<Arc<T>>,
    present: Arc<T>,
    base: Arc<T>,
    /// Nearest redo at the front.
    future: VecDeque<Arc<T>>,
    has_committed: bool,
    debounce: TimerSlot,
    config: HistoryConfig,
    disposed: bool,
    subscribers: Subscribers<T>,
}

impl<T: 'static> fmt::Debug for HistoryStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryStore")
            .field("past_depth", &self.past.len())
            .field("future_depth", &self.future.len())
            .field("has_committed", &self.has_committed)
            .field("commit_pending", &self.debounce.is_pending())
            .field("disposed", &self.disposed)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: 'static> HistoryStore<T> {
    /// Create a store whose `present` is `initial` and whose history is empty.
    #[must_use]
    pub fn new(initial: Arc<T>, config: HistoryConfig) -> Self {
        Self {
            past: VecDeque::new(),
            base: Arc::clone(&initial),
            present: initial,
            future: VecDeque::new(),
            has_committed: false,
            debounce: TimerSlot::new(),
            config,
            disposed: false,
            subscribers: Subscribers::default(),
        }
    }

    /// Create a store with the default configuration.
    #[must_use]
    pub fn with_default_config(initial: T) -> Self {
        Self::new(Arc::new(initial), HistoryConfig::default())
    }

    // ====================================================================
    // Core Operations
    // ====================================================================

    /// Apply `update` to `present` and route the result through `mode`.
    ///
    /// `now` is the caller's monotonic time; debounced commits fire at
    /// `now + debounce` via [`tick`](Self::tick).
    pub fn set_state(&mut self, update: impl Into<Update<T>>, mode: CommitMode, now: Duration) {
        if self.disposed {
            trace!(mode = mode.as_str(), "set_state on disposed store ignored");
            return;
        }
        let next = update.into().resolve(&self.present);
        match mode {
            CommitMode::SkipHistory => {
                self.replace_present(next);
            }
            CommitMode::Immediate => {
                if Arc::ptr_eq(&next, &self.present) {
                    return;
                }
                self.debounce.cancel();
                self.replace_present(next);
                self.commit();
            }
            CommitMode::Debounced => {
                self.debounce.schedule(now.saturating_add(self.config.debounce()));
                self.replace_present(next);
            }
        }
    }

    /// Fire the debounced commit if its deadline has passed.
    ///
    /// Returns `true` if a history entry was recorded.
    pub fn tick(&mut self, now: Duration) -> bool {
        if self.disposed || !self.debounce.take_due(now) {
            return false;
        }
        self.commit()
    }

    /// Step back one entry.
    ///
    /// Returns `false` if `past` is empty. A pending debounced commit is
    /// cancelled; an unrecorded `present` moves to `future` like any other.
    pub fn undo(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        self.debounce.cancel();
        let current = Arc::clone(&self.present);
        self.future.push_front(current);
        self.base = Arc::clone(&previous);
        self.replace_present(previous);
        debug!(
            past = self.past.len(),
            future = self.future.len(),
            "history undo"
        );
        true
    }

    /// Step forward one entry.
    ///
    /// Returns `false` if `future` is empty. A pending debounced commit is
    /// cancelled; the current `present` is pushed onto `past`.
    pub fn redo(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        self.debounce.cancel();
        let current = Arc::clone(&self.present);
        self.past.push_back(current);
        self.enforce_depth();
        self.base = Arc::clone(&next);
        self.replace_present(next);
        debug!(
            past = self.past.len(),
            future = self.future.len(),
            "history redo"
        );
        true
    }

    /// Replace the whole history with a single fresh `present`.
    ///
    /// Clears `past`, `future`, any pending commit, and the
    /// "has committed" flag.
    pub fn reset(&mut self, initial: Arc<T>) {
        if self.disposed {
            return;
        }
        self.debounce.cancel();
        self.past.clear();
        self.future.clear();
        self.has_committed = false;
        self.base = Arc::clone(&initial);
        self.replace_present(initial);
        debug!("history reset");
    }

    /// Cancel the pending debounce and stop accepting operations.
    ///
    /// Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.debounce.cancel();
        self.subscribers.clear();
        self.disposed = true;
        debug!(
            past = self.past.len(),
            future = self.future.len(),
            "history disposed"
        );
    }

    /// Register a listener called each time `present` changes.
    pub fn subscribe(&mut self, callback: impl Fn(&Arc<T>) + 'static) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    // ====================================================================
    // Query
    // ====================================================================

    /// The value to render.
    #[must_use]
    pub fn present(&self) -> &Arc<T> {
        &self.present
    }

    /// `true` once at least one commit has happened and `past` is non-empty.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.has_committed && !self.past.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    #[must_use]
    pub fn has_committed(&self) -> bool {
        self.has_committed
    }

    #[must_use]
    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    #[must_use]
    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    /// A debounced commit is waiting for its quiet period.
    #[must_use]
    pub fn is_commit_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Deadline of the pending debounced commit, if any.
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Duration> {
        self.debounce.deadline()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Copy out the current `(past, present, future)` triple.
    #[must_use]
    pub fn snapshot(&self) -> HistoryState<T> {
        HistoryState {
            past: self.past.iter().cloned().collect(),
            present: Arc::clone(&self.present),
            future: self.future.iter().cloned().collect(),
        }
    }

    // ====================================================================
    // Internal
    // ====================================================================

    /// Record `present` if it moved away from `base`.
    ///
    /// Every path pushes `base`, not the outgoing `present`: an immediate
    /// commit after render-only updates (the end of a drag) records the
    /// value from before the first of them.
    fn commit(&mut self) -> bool {
        if Arc::ptr_eq(&self.present, &self.base) {
            return false;
        }
        let previous = std::mem::replace(&mut self.base, Arc::clone(&self.present));
        self.past.push_back(previous);
        self.future.clear();
        self.has_committed = true;
        self.enforce_depth();
        debug!(
            past = self.past.len(),
            future = self.future.len(),
            "history commit"
        );
        true
    }

    fn replace_present(&mut self, next: Arc<T>) {
        if Arc::ptr_eq(&next, &self.present) {
            return;
        }
        self.present = next;
        self.subscribers.notify(&self.present);
    }

    fn enforce_depth(&mut self) {
        while self.past.len() > self.config.max_depth {
            self.past.pop_front();
        }
    }
}
