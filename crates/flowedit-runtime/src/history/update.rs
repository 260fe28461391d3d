#![forbid(unsafe_code)]

//! Updaters and commit modes for [`HistoryStore::set_state`](super::HistoryStore::set_state).

use std::fmt;
use std::sync::Arc;

/// How a new value reaches the store: either a ready value or a function of
/// the current `present`.
pub enum Update<T> {
    /// Replace `present` with this value.
    Value(Arc<T>),
    /// Compute the next value from `present`. Returning the same `Arc`
    /// signals "no change".
    Apply(Box<dyn FnOnce(&Arc<T>) -> Arc<T>>),
}

impl<T> Update<T> {
    /// Wrap an owned value.
    #[must_use]
    pub fn value(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// Wrap an `Arc`-level updater.
    #[must_use]
    pub fn apply(f: impl FnOnce(&Arc<T>) -> Arc<T> + 'static) -> Self {
        Self::Apply(Box::new(f))
    }

    /// Wrap a value-level updater. Always produces a new `Arc`.
    #[must_use]
    pub fn map(f: impl FnOnce(&T) -> T + 'static) -> Self
    where
        T: 'static,
    {
        Self::Apply(Box::new(move |present: &Arc<T>| Arc::new(f(present))))
    }

    pub(crate) fn resolve(self, present: &Arc<T>) -> Arc<T> {
        match self {
            Self::Value(value) => value,
            Self::Apply(f) => f(present),
        }
    }
}

impl<T> From<Arc<T>> for Update<T> {
    fn from(value: Arc<T>) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

/// Which history path a `set_state` call takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CommitMode {
    /// Render only. History is untouched and no timer is started or cleared.
    SkipHistory,
    /// Record a history entry now, superseding any pending debounce.
    Immediate,
    /// Render now and record once the quiet period elapses.
    #[default]
    Debounced,
}

impl CommitMode {
    /// Map the `(skip_history, immediate_commit)` flag pair. Skipping wins.
    #[must_use]
    pub const fn from_flags(skip_history: bool, immediate_commit: bool) -> Self {
        if skip_history {
            Self::SkipHistory
        } else if immediate_commit {
            Self::Immediate
        } else {
            Self::Debounced
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkipHistory => "skip_history",
            Self::Immediate => "immediate",
            Self::Debounced => "debounced",
        }
    }
}
