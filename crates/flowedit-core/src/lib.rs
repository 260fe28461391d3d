#![forbid(unsafe_code)]

//! Core: flow graph model, canvas change events, and shortcut mapping.
//!
//! # Role in flowedit
//! `flowedit-core` is the data layer. It owns the typed flow graph
//! ([`FlowState`], [`Node`], [`Edge`]), the change batches the canvas emits,
//! and the pure functions that apply them. It performs no I/O.
//!
//! # How it fits in the system
//! The runtime (`flowedit-runtime`) stores [`FlowState`] values in its
//! history store and persists them; the canvas feeds it [`NodeChange`] and
//! [`EdgeChange`] batches defined here.

pub mod change;
pub mod flow;
pub mod shortcut;

pub use change::{
    Connection, DragPhase, EdgeChange, NodeChange, add_edge, apply_edge_changes,
    apply_node_changes,
};
pub use flow::{
    AspectRatio, Edge, FlowState, Node, NodeData, NodeKind, ShapeError, TextToImageData,
    TextToTextData, XYPosition, default_flow,
};
pub use shortcut::{KeyChord, Modifiers, ShortcutAction};
