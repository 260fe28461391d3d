#![forbid(unsafe_code)]

//! Weakly-held change listeners for the history store.
//!
//! Listeners are stored as `Weak` references; the caller keeps the strong
//! end inside a [`Subscription`] guard. Dropping the guard unsubscribes, and
//! dead entries are pruned on the next notification.

use std::rc::{Rc, Weak};
use std::sync::Arc;

type CallbackRc<T> = Rc<dyn Fn(&Arc<T>)>;
type CallbackWeak<T> = Weak<dyn Fn(&Arc<T>)>;

pub(crate) struct Subscribers<T> {
    list: Vec<CallbackWeak<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self { list: Vec::new() }
    }
}

impl<T: 'static> Subscribers<T> {
    pub(crate) fn subscribe(&mut self, callback: impl Fn(&Arc<T>) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.list.push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Call live listeners in registration order and prune dead ones.
    pub(crate) fn notify(&mut self, value: &Arc<T>) {
        self.list.retain(|w| w.strong_count() > 0);
        let callbacks: Vec<CallbackRc<T>> = self.list.iter().filter_map(Weak::upgrade).collect();
        for cb in &callbacks {
            cb(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn clear(&mut self) {
        self.list.clear();
    }
}

/// RAII guard for a history listener.
///
/// Dropping the `Subscription` makes the listener unreachable.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
