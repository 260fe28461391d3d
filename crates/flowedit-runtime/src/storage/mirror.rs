#![forbid(unsafe_code)]

//! Best-effort mirroring of the live flow to storage.
//!
//! The history store's listener drops each new `present` into a single
//! pending slot. The owner then asks [`Mirror::next_write`] for work: at most
//! one durable write is in flight, and while it runs newer values simply
//! replace the pending one, so only the latest value is ever written next.
//!
//! The fallback text copy is written synchronously when a value is taken.
//! Failures on either path are logged and swallowed.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use flowedit_core::FlowState;
use tracing::{trace, warn};

use super::{FALLBACK_KEY, StorageError, TextStore};

#[derive(Debug, Default)]
struct PendingSlot {
    value: Option<Arc<FlowState>>,
    superseded: u64,
}

/// Counters for mirror activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
    /// Durable writes handed out by [`Mirror::next_write`].
    pub writes_started: u64,
    /// Durable writes that reported failure.
    pub durable_failures: u64,
    /// Fallback writes that failed.
    pub fallback_failures: u64,
    /// Pending values replaced before being written.
    pub superseded: u64,
}

/// Single-slot write-behind buffer for the live flow.
#[derive(Debug)]
pub struct Mirror<F> {
    pending: Rc<RefCell<PendingSlot>>,
    fallback: Rc<F>,
    enabled: bool,
    in_flight: bool,
    stats: MirrorStats,
}

impl<F: TextStore> Mirror<F> {
    /// Create an enabled mirror writing its fallback copy to `fallback`.
    #[must_use]
    pub fn new(fallback: Rc<F>) -> Self {
        Self {
            pending: Rc::new(RefCell::new(PendingSlot::default())),
            fallback,
            enabled: true,
            in_flight: false,
            stats: MirrorStats::default(),
        }
    }

    /// Listener to register with the history store.
    #[must_use]
    pub fn listener(&self) -> Box<dyn Fn(&Arc<FlowState>)> {
        let pending = Rc::clone(&self.pending);
        Box::new(move |value: &Arc<FlowState>| {
            let mut slot = pending.borrow_mut();
            if slot.value.replace(Arc::clone(value)).is_some() {
                slot.superseded += 1;
            }
        })
    }

    /// Queue `value` directly, as the listener would.
    pub fn stage(&self, value: Arc<FlowState>) {
        (self.listener())(&value);
    }

    /// Pause or resume handing out writes. Values keep accumulating while
    /// paused; only the latest survives.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Nothing pending and nothing in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.in_flight && self.pending.borrow().value.is_none()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().value.is_some()
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Take the next value to write durably, if the mirror is enabled and
    /// no write is in flight. The fallback copy is written before returning.
    pub fn next_write(&mut self) -> Option<Arc<FlowState>> {
        if !self.enabled || self.in_flight {
            return None;
        }
        let value = self.pending.borrow_mut().value.take()?;
        self.write_fallback(&value);
        self.in_flight = true;
        self.stats.writes_started += 1;
        trace!(nodes = value.nodes.len(), edges = value.edges.len(), "mirror write");
        Some(value)
    }

    /// Report the outcome of the write handed out by `next_write`.
    pub fn complete(&mut self, result: Result<(), StorageError>) {
        self.in_flight = false;
        if let Err(err) = result {
            self.stats.durable_failures += 1;
            warn!(error = %err, "durable mirror write failed; state not persisted this cycle");
        }
    }

    #[must_use]
    pub fn stats(&self) -> MirrorStats {
        MirrorStats {
            superseded: self.pending.borrow().superseded,
            ..self.stats
        }
    }

    fn write_fallback(&mut self, value: &FlowState) {
        let result = serde_json::to_string(value)
            .map_err(StorageError::from)
            .and_then(|text| self.fallback.set_item(FALLBACK_KEY, &text));
        if let Err(err) = result {
            self.stats.fallback_failures += 1;
            warn!(error = %err, "fallback mirror write failed");
        }
    }
}
