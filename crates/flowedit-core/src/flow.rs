#![forbid(unsafe_code)]

//! Flow graph model.
//!
//! A [`FlowState`] is the payload the editor history tracks: an ordered list
//! of [`Node`]s and an ordered list of [`Edge`]s. The JSON shape matches what
//! the canvas layer exchanges, so a persisted state looks like:
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "text-to-text-1", "type": "textToText",
//!       "position": { "x": 100.0, "y": 150.0 },
//!       "data": { "label": "Text to Text", "instruction": "", "model": "GPT-4o Mini" } }
//!   ],
//!   "edges": []
//! }
//! ```
//!
//! Node payloads are a tagged enum keyed by [`NodeKind`]; each variant carries
//! its own typed data instead of an open-ended record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default model for text-to-text nodes.
pub const DEFAULT_TEXT_MODEL: &str = "GPT-4o Mini";

/// Default model for text-to-image nodes.
pub const DEFAULT_IMAGE_MODEL: &str = "Hailuo Image 01";

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Canvas position of a node's top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct XYPosition {
    pub x: f64,
    pub y: f64,
}

impl XYPosition {
    /// Create a position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// The kind of step a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    TextToText,
    TextToImage,
}

impl NodeKind {
    /// All node kinds, in palette order.
    pub const ALL: [NodeKind; 2] = [NodeKind::TextToText, NodeKind::TextToImage];

    /// Wire tag used in the `type` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TextToText => "textToText",
            Self::TextToImage => "textToImage",
        }
    }

    /// Human-readable title.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::TextToText => "Text to Text",
            Self::TextToImage => "Text to Image",
        }
    }

    /// Handle id that accepts incoming connections.
    #[must_use]
    pub const fn target_handle(self) -> &'static str {
        "text-input"
    }

    /// Handle id that emits outgoing connections.
    #[must_use]
    pub const fn source_handle(self) -> &'static str {
        match self {
            Self::TextToText => "text-output",
            Self::TextToImage => "image-output",
        }
    }

    /// Parse a wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output aspect ratio for generated images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    /// All selectable ratios.
    pub const ALL: [AspectRatio; 4] = [
        AspectRatio::Widescreen,
        AspectRatio::Standard,
        AspectRatio::Square,
        AspectRatio::Portrait,
    ];

    /// Label shown in the ratio selector.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Widescreen => "16:9",
            Self::Standard => "4:3",
            Self::Square => "1:1",
            Self::Portrait => "9:16",
        }
    }
}

/// Payload of a text-to-text node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextToTextData {
    pub label: String,
    pub instruction: String,
    pub model: String,
}

impl Default for TextToTextData {
    fn default() -> Self {
        Self {
            label: NodeKind::TextToText.display_name().to_owned(),
            instruction: String::new(),
            model: DEFAULT_TEXT_MODEL.to_owned(),
        }
    }
}

/// Payload of a text-to-image node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextToImageData {
    pub label: String,
    pub instruction: String,
    pub model: String,
    pub aspect_ratio: AspectRatio,
}

impl Default for TextToImageData {
    fn default() -> Self {
        Self {
            label: NodeKind::TextToImage.display_name().to_owned(),
            instruction: String::new(),
            model: DEFAULT_IMAGE_MODEL.to_owned(),
            aspect_ratio: AspectRatio::default(),
        }
    }
}

/// Typed node payload, tagged by the node's `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NodeData {
    TextToText(TextToTextData),
    TextToImage(TextToImageData),
}

impl NodeData {
    /// The kind tag of this payload.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::TextToText(_) => NodeKind::TextToText,
            Self::TextToImage(_) => NodeKind::TextToImage,
        }
    }

    /// Default payload for a fresh node of `kind`.
    #[must_use]
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::TextToText => Self::TextToText(TextToTextData::default()),
            NodeKind::TextToImage => Self::TextToImage(TextToImageData::default()),
        }
    }

    /// The user's creative instruction.
    #[must_use]
    pub fn instruction(&self) -> &str {
        match self {
            Self::TextToText(data) => &data.instruction,
            Self::TextToImage(data) => &data.instruction,
        }
    }
}

/// A block on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub position: XYPosition,
    #[serde(flatten)]
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dragging: bool,
}

impl Node {
    /// Create a node with the default payload for `kind`.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind, position: XYPosition) -> Self {
        Self::with_data(id, position, NodeData::for_kind(kind))
    }

    /// Create a node with an explicit payload.
    #[must_use]
    pub fn with_data(id: impl Into<String>, position: XYPosition, data: NodeData) -> Self {
        Self {
            id: id.into(),
            position,
            data,
            selected: false,
            dragging: false,
        }
    }

    /// The node's kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// A directed connection between two node handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default)]
    pub animated: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
}

impl Edge {
    /// Create an animated edge between two handles.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_handle: Option<String>,
        target: impl Into<String>,
        target_handle: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle,
            target_handle,
            animated: true,
            selected: false,
        }
    }
}

// ---------------------------------------------------------------------------
// FlowState
// ---------------------------------------------------------------------------

/// The complete editable graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Why a serialized flow was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// The text is not JSON.
    Parse(String),
    /// `nodes` is missing or not an array.
    MissingNodes,
    /// `edges` is missing or not an array.
    MissingEdges,
    /// The arrays exist but their records don't decode.
    Decode(String),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "flow is not valid JSON: {msg}"),
            Self::MissingNodes => write!(f, "flow has no node sequence"),
            Self::MissingEdges => write!(f, "flow has no edge sequence"),
            Self::Decode(msg) => write!(f, "flow records are malformed: {msg}"),
        }
    }
}

impl std::error::Error for ShapeError {}

impl FlowState {
    /// Create a flow from parts.
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Decode a flow, requiring both a node sequence and an edge sequence.
    pub fn from_json_str(text: &str) -> Result<Self, ShapeError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ShapeError::Parse(e.to_string()))?;
        Self::from_json_value(value)
    }

    /// Decode an already-parsed JSON value, with the same shape checks as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ShapeError> {
        if !value.get("nodes").is_some_and(serde_json::Value::is_array) {
            return Err(ShapeError::MissingNodes);
        }
        if !value.get("edges").is_some_and(serde_json::Value::is_array) {
            return Err(ShapeError::MissingEdges);
        }
        let flow = serde_json::from_value(value).map_err(|e| ShapeError::Decode(e.to_string()));
        #[cfg(feature = "tracing")]
        if let Err(err) = &flow {
            tracing::debug!(error = %err, "rejected flow records");
        }
        flow
    }

    /// Encode as compact JSON.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Look up an edge by id.
    #[must_use]
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// A copy of this flow with `nodes` replaced.
    #[must_use]
    pub fn with_nodes(&self, nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            edges: self.edges.clone(),
        }
    }

    /// A copy of this flow with `edges` replaced.
    #[must_use]
    pub fn with_edges(&self, edges: Vec<Edge>) -> Self {
        Self {
            nodes: self.nodes.clone(),
            edges,
        }
    }
}

/// The graph a brand-new editor starts with: one text-to-text step feeding
/// one text-to-image step.
#[must_use]
pub fn default_flow() -> FlowState {
    let text = Node::new(
        "text-to-text-1",
        NodeKind::TextToText,
        XYPosition::new(100.0, 150.0),
    );
    let image = Node::new(
        "text-to-image-1",
        NodeKind::TextToImage,
        XYPosition::new(650.0, 150.0),
    );
    let edge = Edge::new(
        "edge-1",
        text.id.clone(),
        Some(NodeKind::TextToText.source_handle().to_owned()),
        image.id.clone(),
        Some(NodeKind::TextToImage.target_handle().to_owned()),
    );
    FlowState::new(vec![text, image], vec![edge])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flow_matches_starting_graph() {
        let flow = default_flow();
        assert_eq!(flow.nodes.len(), 2);
        assert_eq!(flow.edges.len(), 1);

        let text = flow.node("text-to-text-1").unwrap();
        assert_eq!(text.kind(), NodeKind::TextToText);
        assert_eq!(text.position, XYPosition::new(100.0, 150.0));

        let image = flow.node("text-to-image-1").unwrap();
        match &image.data {
            NodeData::TextToImage(data) => {
                assert_eq!(data.model, DEFAULT_IMAGE_MODEL);
                assert_eq!(data.aspect_ratio, AspectRatio::Widescreen);
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let edge = flow.edge("edge-1").unwrap();
        assert_eq!(edge.source_handle.as_deref(), Some("text-output"));
        assert_eq!(edge.target_handle.as_deref(), Some("text-input"));
        assert!(edge.animated);
    }

    #[test]
    fn node_serializes_with_type_tag_and_data() {
        let node = Node::new("n1", NodeKind::TextToImage, XYPosition::new(1.0, 2.0));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "textToImage");
        assert_eq!(value["data"]["aspectRatio"], "16:9");
        assert_eq!(value["data"]["model"], DEFAULT_IMAGE_MODEL);
        assert_eq!(value["position"]["x"], 1.0);
        assert!(value.get("selected").is_none());
    }

    #[test]
    fn decodes_canvas_json() {
        let text = r#"{
            "nodes": [
                { "id": "a", "type": "textToText", "position": { "x": 0, "y": 5 },
                  "data": { "instruction": "write a haiku" } }
            ],
            "edges": [
                { "id": "e", "source": "a", "target": "b", "sourceHandle": "text-output" }
            ]
        }"#;
        let flow = FlowState::from_json_str(text).unwrap();
        assert_eq!(flow.nodes[0].data.instruction(), "write a haiku");
        match &flow.nodes[0].data {
            NodeData::TextToText(data) => assert_eq!(data.model, DEFAULT_TEXT_MODEL),
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(flow.edges[0].target_handle, None);
        assert!(!flow.edges[0].animated);
    }

    #[test]
    fn rejects_missing_sequences() {
        assert_eq!(
            FlowState::from_json_str(r#"{"edges": []}"#),
            Err(ShapeError::MissingNodes)
        );
        assert_eq!(
            FlowState::from_json_str(r#"{"nodes": [], "edges": {}}"#),
            Err(ShapeError::MissingEdges)
        );
        assert!(matches!(
            FlowState::from_json_str("not json"),
            Err(ShapeError::Parse(_))
        ));
        assert!(matches!(
            FlowState::from_json_str(r#"{"nodes": [{"id": 3}], "edges": []}"#),
            Err(ShapeError::Decode(_))
        ));
    }

    #[test]
    fn unknown_node_type_is_a_decode_error() {
        let text = r#"{"nodes": [{"id": "x", "type": "audio", "position": {"x": 0, "y": 0}, "data": {}}], "edges": []}"#;
        assert!(matches!(
            FlowState::from_json_str(text),
            Err(ShapeError::Decode(_))
        ));
    }

    #[test]
    fn json_round_trip_preserves_flow() {
        let mut flow = default_flow();
        flow.nodes[0].selected = true;
        let text = flow.to_json_string().unwrap();
        assert_eq!(FlowState::from_json_str(&text).unwrap(), flow);
    }

    #[test]
    fn node_kind_tags_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::from_tag("textToVideo"), None);
        assert_eq!(NodeKind::TextToImage.source_handle(), "image-output");
    }
}
