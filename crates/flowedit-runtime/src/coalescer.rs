#![forbid(unsafe_code)]

//! Per-frame coalescing of canvas change batches.
//!
//! A node drag reports a position batch for every pointer move, far more
//! often than the display refreshes. [`ChangeCoalescer`] keeps only the most
//! recent drag batch and applies it once per animation frame as a
//! render-only update. The release batch then records a single history
//! entry for the whole gesture.
//!
//! # Routing
//!
//! | Input                         | Store path                    |
//! |-------------------------------|-------------------------------|
//! | node batch, [`DragPhase::Dragging`] | pending, applied on next frame with `SkipHistory` |
//! | node batch, [`DragPhase::DragEnd`]  | pending flushed, then `Immediate` |
//! | node batch, [`DragPhase::Ordinary`] | `Debounced`             |
//! | edge batch, new connection    | `Immediate`                   |
//!
//! The host calls [`on_animation_frame`](ChangeCoalescer::on_animation_frame)
//! whenever [`frame_requested`](ChangeCoalescer::frame_requested) is set.

use std::sync::Arc;
use std::time::Duration;

use flowedit_core::{
    Connection, DragPhase, EdgeChange, FlowState, NodeChange, add_edge, apply_edge_changes,
    apply_node_changes,
};
use tracing::{debug, trace};

use crate::history::{CommitMode, HistoryStore, Update};
use crate::scheduler::FrameSlot;

/// Diagnostic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Node batches received, of any phase.
    pub batches_received: u64,
    /// Drag batches replaced by a newer one before their frame ran.
    pub batches_coalesced: u64,
    /// Animation frames that applied a pending batch.
    pub frames_applied: u64,
    /// Drag gestures recorded in history.
    pub drag_commits: u64,
}

/// Turns canvas change batches into history store updates.
#[derive(Debug, Default)]
pub struct ChangeCoalescer {
    pending: Option<Vec<NodeChange>>,
    frame: FrameSlot,
    gesture: bool,
    stats: CoalescerStats,
}

impl ChangeCoalescer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a node change batch. Returns the phase it was classified as.
    pub fn on_nodes_change(
        &mut self,
        changes: Vec<NodeChange>,
        store: &mut HistoryStore<FlowState>,
        now: Duration,
    ) -> DragPhase {
        let phase = DragPhase::classify(&changes);
        if changes.is_empty() {
            return phase;
        }
        self.stats.batches_received += 1;
        match phase {
            DragPhase::Dragging => {
                self.gesture = true;
                if self.pending.replace(changes).is_some() {
                    self.stats.batches_coalesced += 1;
                }
                if self.frame.request() {
                    trace!("animation frame requested");
                }
            }
            DragPhase::DragEnd => {
                self.gesture = false;
                self.flush_pending(store, now);
                store.set_state(node_update(changes), CommitMode::Immediate, now);
                self.stats.drag_commits += 1;
                debug!(past = store.past_len(), "drag gesture committed");
            }
            DragPhase::Ordinary => {
                self.gesture = false;
                store.set_state(node_update(changes), CommitMode::Debounced, now);
            }
        }
        phase
    }

    /// Run the pending frame, if one was requested.
    ///
    /// Returns `true` if a batch was applied.
    pub fn on_animation_frame(
        &mut self,
        store: &mut HistoryStore<FlowState>,
        now: Duration,
    ) -> bool {
        if !self.frame.take() {
            return false;
        }
        self.apply_pending(store, now)
    }

    /// Apply an edge batch as one history entry.
    pub fn on_edges_change(
        &mut self,
        changes: Vec<EdgeChange>,
        store: &mut HistoryStore<FlowState>,
        now: Duration,
    ) {
        if changes.is_empty() {
            return;
        }
        let update = Update::apply(move |present: &Arc<FlowState>| {
            Arc::new(present.with_edges(apply_edge_changes(&changes, &present.edges)))
        });
        store.set_state(update, CommitMode::Immediate, now);
    }

    /// Add an edge for a new connection as one history entry. Duplicate or
    /// dangling connections record nothing.
    pub fn on_connect(
        &mut self,
        connection: Connection,
        store: &mut HistoryStore<FlowState>,
        now: Duration,
    ) {
        let update = Update::apply(move |present: &Arc<FlowState>| {
            match add_edge(&connection, &present.edges) {
                Some(edges) => Arc::new(present.with_edges(edges)),
                None => Arc::clone(present),
            }
        });
        store.set_state(update, CommitMode::Immediate, now);
    }

    /// Drop the pending frame and batch.
    pub fn cancel(&mut self) {
        self.frame.cancel();
        self.pending = None;
        self.gesture = false;
    }

    /// A drag has started and its release batch has not arrived yet.
    #[must_use]
    pub fn in_gesture(&self) -> bool {
        self.gesture
    }

    /// A frame callback is waiting to run.
    #[must_use]
    pub fn frame_requested(&self) -> bool {
        self.frame.is_pending()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn stats(&self) -> CoalescerStats {
        self.stats
    }

    fn flush_pending(&mut self, store: &mut HistoryStore<FlowState>, now: Duration) {
        self.frame.cancel();
        self.apply_pending(store, now);
    }

    fn apply_pending(&mut self, store: &mut HistoryStore<FlowState>, now: Duration) -> bool {
        let Some(changes) = self.pending.take() else {
            return false;
        };
        store.set_state(node_update(changes), CommitMode::SkipHistory, now);
        self.stats.frames_applied += 1;
        true
    }
}

fn node_update(changes: Vec<NodeChange>) -> Update<FlowState> {
    Update::apply(move |present: &Arc<FlowState>| {
        Arc::new(present.with_nodes(apply_node_changes(&changes, &present.nodes)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowedit_core::{XYPosition, default_flow};

    const MS: Duration = Duration::from_millis(1);

    fn store() -> HistoryStore<FlowState> {
        HistoryStore::with_default_config(default_flow())
    }

    fn drag(x: f64) -> Vec<NodeChange> {
        vec![NodeChange::drag("text-to-text-1", XYPosition::new(x, 0.0))]
    }

    fn x_of(store: &HistoryStore<FlowState>) -> f64 {
        store.present().nodes[0].position.x
    }

    #[test]
    fn drag_batches_wait_for_frame() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        assert_eq!(c.on_nodes_change(drag(1.0), &mut s, MS), DragPhase::Dragging);
        assert_eq!(x_of(&s), 100.0);
        assert!(c.frame_requested());

        assert!(c.on_animation_frame(&mut s, MS * 16));
        assert_eq!(x_of(&s), 1.0);
        assert!(s.present().nodes[0].dragging);
        assert_eq!(s.past_len(), 0);
        assert!(!c.on_animation_frame(&mut s, MS * 32));
    }

    #[test]
    fn batches_within_one_frame_collapse_to_latest() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        for x in 1..=5 {
            c.on_nodes_change(drag(f64::from(x)), &mut s, MS);
        }
        assert!(c.on_animation_frame(&mut s, MS * 16));
        assert_eq!(x_of(&s), 5.0);
        let stats = c.stats();
        assert_eq!(stats.batches_coalesced, 4);
        assert_eq!(stats.frames_applied, 1);
    }

    #[test]
    fn drag_end_records_one_entry_with_pre_drag_value() {
        let mut s = store();
        let before = Arc::clone(s.present());
        let mut c = ChangeCoalescer::new();
        for frame in 1..=10 {
            c.on_nodes_change(drag(f64::from(frame)), &mut s, MS * frame);
            c.on_animation_frame(&mut s, MS * frame);
        }
        c.on_nodes_change(
            vec![NodeChange::drag_end("text-to-text-1", None)],
            &mut s,
            MS * 200,
        );
        assert_eq!(s.past_len(), 1);
        assert!(Arc::ptr_eq(&s.snapshot().past[0], &before));
        assert_eq!(x_of(&s), 10.0);
        assert!(!s.present().nodes[0].dragging);
        assert_eq!(c.stats().drag_commits, 1);
    }

    #[test]
    fn drag_end_flushes_unrendered_batch() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        c.on_nodes_change(drag(42.0), &mut s, MS);
        c.on_nodes_change(
            vec![NodeChange::drag_end("text-to-text-1", None)],
            &mut s,
            MS * 2,
        );
        assert_eq!(x_of(&s), 42.0);
        assert!(!c.frame_requested());
        assert!(!c.has_pending());
    }

    #[test]
    fn ordinary_batches_are_debounced() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        let phase = c.on_nodes_change(
            vec![NodeChange::Select {
                id: "text-to-image-1".into(),
                selected: true,
            }],
            &mut s,
            Duration::ZERO,
        );
        assert_eq!(phase, DragPhase::Ordinary);
        assert!(s.present().nodes[1].selected);
        assert!(s.is_commit_pending());
        assert!(s.tick(MS * 300));
        assert_eq!(s.past_len(), 1);
    }

    #[test]
    fn edge_changes_commit_immediately() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        c.on_edges_change(vec![EdgeChange::Remove { id: "edge-1".into() }], &mut s, MS);
        assert!(s.present().edges.is_empty());
        assert_eq!(s.past_len(), 1);
        c.on_edges_change(Vec::new(), &mut s, MS);
        assert_eq!(s.past_len(), 1);
    }

    #[test]
    fn connect_commits_once_and_ignores_duplicates() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        let conn = Connection::new(
            "text-to-image-1",
            Some("image-output"),
            "text-to-text-1",
            Some("text-input"),
        );
        c.on_connect(conn.clone(), &mut s, MS);
        assert_eq!(s.present().edges.len(), 2);
        assert_eq!(s.past_len(), 1);
        c.on_connect(conn, &mut s, MS);
        assert_eq!(s.present().edges.len(), 2);
        assert_eq!(s.past_len(), 1);
    }

    #[test]
    fn cancel_drops_pending_frame() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        c.on_nodes_change(drag(9.0), &mut s, MS);
        c.cancel();
        assert!(!c.on_animation_frame(&mut s, MS * 16));
        assert_eq!(x_of(&s), 100.0);
    }

    #[test]
    fn gesture_spans_first_drag_batch_to_release() {
        let mut s = store();
        let mut c = ChangeCoalescer::new();
        assert!(!c.in_gesture());
        c.on_nodes_change(drag(1.0), &mut s, MS);
        c.on_animation_frame(&mut s, MS * 16);
        assert!(c.in_gesture());
        c.on_nodes_change(
            vec![NodeChange::drag_end("text-to-text-1", None)],
            &mut s,
            MS * 32,
        );
        assert!(!c.in_gesture());

        c.on_nodes_change(drag(2.0), &mut s, MS * 48);
        c.cancel();
        assert!(!c.in_gesture());
    }
}
