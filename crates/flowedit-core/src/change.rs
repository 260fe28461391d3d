#![forbid(unsafe_code)]

//! Canvas change events and their application to the flow model.
//!
//! The canvas reports user interaction as batches of fine-grained changes.
//! This module turns a batch into a new node or edge list without touching
//! the input, so callers can hand the result to the history store as a
//! fresh value.
//!
//! # Drag phases
//!
//! Position changes carry a tri-state `dragging` flag:
//!
//! | `dragging`     | Meaning                          |
//! |----------------|----------------------------------|
//! | `Some(true)`   | pointer is still moving the node |
//! | `Some(false)`  | pointer released, gesture over   |
//! | `None`         | programmatic move, not a drag    |
//!
//! [`DragPhase::classify`] folds a whole batch into one phase.

use crate::flow::{Edge, Node, XYPosition};

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// A single change to the node list.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    /// Move a node and/or update its drag flag.
    Position {
        id: String,
        position: Option<XYPosition>,
        dragging: Option<bool>,
    },
    /// Toggle selection.
    Select { id: String, selected: bool },
    /// Remove a node.
    Remove { id: String },
    /// Append a node.
    Add { node: Node },
    /// Replace the node with the same id.
    Replace { node: Node },
}

impl NodeChange {
    /// Convenience constructor for an in-progress drag step.
    #[must_use]
    pub fn drag(id: impl Into<String>, position: XYPosition) -> Self {
        Self::Position {
            id: id.into(),
            position: Some(position),
            dragging: Some(true),
        }
    }

    /// Convenience constructor for the release at the end of a drag.
    #[must_use]
    pub fn drag_end(id: impl Into<String>, position: Option<XYPosition>) -> Self {
        Self::Position {
            id: id.into(),
            position,
            dragging: Some(false),
        }
    }

    /// Id of the node this change targets.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Position { id, .. } | Self::Select { id, .. } | Self::Remove { id } => id,
            Self::Add { node } | Self::Replace { node } => &node.id,
        }
    }
}

/// A single change to the edge list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    Select { id: String, selected: bool },
    Remove { id: String },
    Add { edge: Edge },
    Replace { edge: Edge },
}

/// A new connection dragged between two handles.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Connection {
    pub source: String,
    pub target: String,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl Connection {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        source_handle: Option<&str>,
        target: impl Into<String>,
        target_handle: Option<&str>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: source_handle.map(str::to_owned),
            target_handle: target_handle.map(str::to_owned),
        }
    }

    /// Id the canvas assigns to an edge created from this connection.
    #[must_use]
    pub fn edge_id(&self) -> String {
        format!(
            "xy-edge__{}{}-{}{}",
            self.source,
            self.source_handle.as_deref().unwrap_or(""),
            self.target,
            self.target_handle.as_deref().unwrap_or(""),
        )
    }

    fn matches(&self, edge: &Edge) -> bool {
        edge.source == self.source
            && edge.target == self.target
            && edge.source_handle == self.source_handle
            && edge.target_handle == self.target_handle
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply `changes` in order to a copy of `nodes`. Unknown ids are ignored.
#[must_use]
pub fn apply_node_changes(changes: &[NodeChange], nodes: &[Node]) -> Vec<Node> {
    let mut out = nodes.to_vec();
    for change in changes {
        match change {
            NodeChange::Position {
                id,
                position,
                dragging,
            } => {
                if let Some(node) = out.iter_mut().find(|n| &n.id == id) {
                    if let Some(position) = position {
                        node.position = *position;
                    }
                    node.dragging = dragging.unwrap_or(false);
                }
            }
            NodeChange::Select { id, selected } => {
                if let Some(node) = out.iter_mut().find(|n| &n.id == id) {
                    node.selected = *selected;
                }
            }
            NodeChange::Remove { id } => out.retain(|n| &n.id != id),
            NodeChange::Add { node } => out.push(node.clone()),
            NodeChange::Replace { node } => {
                if let Some(slot) = out.iter_mut().find(|n| n.id == node.id) {
                    *slot = node.clone();
                }
            }
        }
    }
    out
}

/// Apply `changes` in order to a copy of `edges`. Unknown ids are ignored.
#[must_use]
pub fn apply_edge_changes(changes: &[EdgeChange], edges: &[Edge]) -> Vec<Edge> {
    let mut out = edges.to_vec();
    for change in changes {
        match change {
            EdgeChange::Select { id, selected } => {
                if let Some(edge) = out.iter_mut().find(|e| &e.id == id) {
                    edge.selected = *selected;
                }
            }
            EdgeChange::Remove { id } => out.retain(|e| &e.id != id),
            EdgeChange::Add { edge } => out.push(edge.clone()),
            EdgeChange::Replace { edge } => {
                if let Some(slot) = out.iter_mut().find(|e| e.id == edge.id) {
                    *slot = edge.clone();
                }
            }
        }
    }
    out
}

/// Append an animated edge for `connection`.
///
/// Returns `None` when there is nothing to add: an endpoint is empty, or an
/// edge between the same handles already exists.
#[must_use]
pub fn add_edge(connection: &Connection, edges: &[Edge]) -> Option<Vec<Edge>> {
    if connection.source.is_empty() || connection.target.is_empty() {
        return None;
    }
    if edges.iter().any(|edge| connection.matches(edge)) {
        return None;
    }
    let mut out = edges.to_vec();
    out.push(Edge::new(
        connection.edge_id(),
        connection.source.clone(),
        connection.source_handle.clone(),
        connection.target.clone(),
        connection.target_handle.clone(),
    ));
    Some(out)
}

// ---------------------------------------------------------------------------
// Drag phase
// ---------------------------------------------------------------------------

/// Interaction phase of a node change batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragPhase {
    /// A drag is in progress.
    Dragging,
    /// A drag just finished.
    DragEnd,
    /// No drag involvement (selection, removal, programmatic edits).
    Ordinary,
}

impl DragPhase {
    /// Classify a batch. A release anywhere in the batch wins over an
    /// in-progress flag so the end of the gesture is never dropped.
    #[must_use]
    pub fn classify(changes: &[NodeChange]) -> Self {
        let mut dragging = false;
        for change in changes {
            if let NodeChange::Position {
                dragging: Some(flag),
                ..
            } = change
            {
                if !*flag {
                    return Self::DragEnd;
                }
                dragging = true;
            }
        }
        if dragging {
            Self::Dragging
        } else {
            Self::Ordinary
        }
    }
}
