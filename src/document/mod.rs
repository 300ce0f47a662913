//! Rich-text documents
//!
//! Post bodies are stored as the editor's JSON node tree:
//!
//! ```json
//! { "type": "doc", "content": [
//!     { "type": "paragraph", "content": [{ "type": "text", "text": "Hi" }] },
//!     { "type": "imageGallery", "attrs": { "images": ["/a.jpg"], "layout": "grid" } }
//! ] }
//! ```
//!
//! Besides the usual block and inline nodes there are three custom blocks:
//! `image`, `imageGallery` and `columns` (whose children are `column` nodes).
//! Node types this module does not know are kept as-is so documents written
//! by newer editors survive a load/save cycle.
//!
//! Nodes are addressed by a path of child indexes from the root, e.g. `[2, 0]`
//! is the first child of the third top-level block.

pub mod layout;
pub mod merge;
pub mod render;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use merge::{MergeOutcome, MergeSelection};
pub use render::{render_html, DocumentRenderer};

/// Errors raised while parsing or editing a document
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    #[error("Invalid document JSON: {0}")]
    Parse(String),

    #[error("Invalid document at {path:?}: {message}")]
    Invalid { path: Vec<usize>, message: String },

    #[error("No node at path {0:?}")]
    NodeNotFound(Vec<usize>),

    #[error("Node at {path:?} is '{found}', expected {expected}")]
    WrongNodeType {
        path: Vec<usize>,
        expected: &'static str,
        found: String,
    },

    #[error("Column count must be between 2 and 4, got {0}")]
    InvalidColumnCount(usize),

    #[error("Nothing is selected for merging")]
    NothingArmed,

    #[error("Cannot merge into '{0}': only images and galleries can be merged")]
    InvalidMergeTarget(String),
}

/// Minimum number of columns in a `columns` block
pub const MIN_COLUMNS: usize = 2;
/// Maximum number of columns in a `columns` block
pub const MAX_COLUMNS: usize = 4;

/// Node types the server understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Heading,
    Text,
    BulletList,
    OrderedList,
    ListItem,
    Blockquote,
    CodeBlock,
    HardBreak,
    HorizontalRule,
    Image,
    ImageGallery,
    Columns,
    Column,
    /// Anything else, preserved untouched
    Unknown,
}

impl NodeKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "doc" => Self::Doc,
            "paragraph" => Self::Paragraph,
            "heading" => Self::Heading,
            "text" => Self::Text,
            "bulletList" => Self::BulletList,
            "orderedList" => Self::OrderedList,
            "listItem" => Self::ListItem,
            "blockquote" => Self::Blockquote,
            "codeBlock" => Self::CodeBlock,
            "hardBreak" => Self::HardBreak,
            "horizontalRule" => Self::HorizontalRule,
            "image" => Self::Image,
            "imageGallery" => Self::ImageGallery,
            "columns" => Self::Columns,
            "column" => Self::Column,
            _ => Self::Unknown,
        }
    }

    /// Whether this node can take part in a gallery merge
    pub fn is_mergeable(self) -> bool {
        matches!(self, Self::Image | Self::ImageGallery)
    }
}

/// Gallery presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GalleryLayout {
    #[default]
    Grid,
    Slideshow,
}

impl GalleryLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            GalleryLayout::Grid => "grid",
            GalleryLayout::Slideshow => "slideshow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grid" => Some(GalleryLayout::Grid),
            "slideshow" => Some(GalleryLayout::Slideshow),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            GalleryLayout::Grid => GalleryLayout::Slideshow,
            GalleryLayout::Slideshow => GalleryLayout::Grid,
        }
    }
}

impl std::fmt::Display for GalleryLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inline formatting attached to a text node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        skip_serializing_if = "Map::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub attrs: Map<String, Value>,
}

/// A single node of the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        skip_serializing_if = "Map::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub attrs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
    /// Fields written by other editors, kept for round-tripping
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Node {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            attrs: Map::new(),
            content: Vec::new(),
            text: None,
            marks: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        let mut node = Self::new("text");
        node.text = Some(text.to_string());
        node
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        let mut node = Self::new("paragraph");
        node.content = children;
        node
    }

    pub fn image(src: &str) -> Self {
        let mut node = Self::new("image");
        node.attrs.insert("src".into(), Value::String(src.to_string()));
        node
    }

    pub fn gallery(images: Vec<String>, layout: GalleryLayout) -> Self {
        let mut node = Self::new("imageGallery");
        node.set_gallery_images(images);
        node.attrs
            .insert("layout".into(), Value::String(layout.as_str().to_string()));
        node
    }

    pub fn column(blocks: Vec<Node>) -> Self {
        let mut node = Self::new("column");
        node.content = blocks;
        node
    }

    /// A `columns` block of `count` columns, each holding an empty paragraph
    pub fn columns(count: usize) -> Self {
        let mut node = Self::new("columns");
        node.attrs.insert("count".into(), Value::from(count as u64));
        node.content = (0..count)
            .map(|_| Node::column(vec![Node::paragraph(Vec::new())]))
            .collect();
        node
    }

    pub fn node_kind(&self) -> NodeKind {
        NodeKind::from_name(&self.kind)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        match self.attrs.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `src` of an image node
    pub fn image_src(&self) -> Option<&str> {
        if self.node_kind() != NodeKind::Image {
            return None;
        }
        self.attr_str("src").filter(|s| !s.trim().is_empty())
    }

    /// Image URLs of a gallery node, in display order.
    ///
    /// Entries may be plain URLs or `{ "src": ... }` objects.
    pub fn gallery_images(&self) -> Vec<String> {
        self.gallery_entries()
            .iter()
            .filter_map(gallery_entry_src)
            .map(str::to_string)
            .collect()
    }

    /// Gallery entries with a usable source, as stored (alt text included)
    pub fn gallery_entries(&self) -> Vec<Value> {
        let Some(Value::Array(items)) = self.attrs.get("images") else {
            return Vec::new();
        };
        items
            .iter()
            .filter(|item| gallery_entry_src(item).is_some())
            .cloned()
            .collect()
    }

    pub fn set_gallery_images(&mut self, images: Vec<String>) {
        self.set_gallery_entries(images.into_iter().map(Value::String).collect());
    }

    pub fn set_gallery_entries(&mut self, entries: Vec<Value>) {
        self.attrs.insert("images".into(), Value::Array(entries));
    }

    /// This image as a gallery entry: the bare URL, or `{ src, alt }` when
    /// it has alt text
    pub fn image_entry(&self) -> Option<Value> {
        let src = self.image_src()?;
        match self.attr_str("alt").map(str::trim).filter(|alt| !alt.is_empty()) {
            Some(alt) => Some(serde_json::json!({ "src": src, "alt": alt })),
            None => Some(Value::String(src.to_string())),
        }
    }

    pub fn gallery_layout(&self) -> GalleryLayout {
        self.attr_str("layout")
            .and_then(GalleryLayout::parse)
            .unwrap_or_default()
    }

    /// Declared column count, falling back to the number of children
    pub fn column_count(&self) -> usize {
        self.attr_u64("count")
            .map(|n| n as usize)
            .unwrap_or(self.content.len())
    }

    /// Whether any direct child is inline content
    fn holds_inline(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c.node_kind(), NodeKind::Text | NodeKind::HardBreak))
    }

    fn inline_text(&self, out: &mut String) {
        for child in &self.content {
            match child.node_kind() {
                NodeKind::Text => out.push_str(child.text.as_deref().unwrap_or_default()),
                NodeKind::HardBreak => out.push('\n'),
                _ => child.inline_text(out),
            }
        }
    }
}

/// A whole document rooted at a `doc` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Node,
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl Document {
    /// A document holding a single empty paragraph
    pub fn empty() -> Self {
        let mut root = Node::new("doc");
        root.content.push(Node::paragraph(Vec::new()));
        Self { root }
    }

    pub fn from_blocks(blocks: Vec<Node>) -> Self {
        let mut root = Node::new("doc");
        root.content = blocks;
        Self { root }
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let root: Node =
            serde_json::from_str(json).map_err(|e| DocumentError::Parse(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let root: Node =
            serde_json::from_value(value).map_err(|e| DocumentError::Parse(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.root).unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.root).unwrap_or(Value::Null)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Top-level blocks
    pub fn blocks(&self) -> &[Node] {
        &self.root.content
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let mut node = &self.root;
        for &idx in path {
            node = node.content.get(idx)?;
        }
        Some(node)
    }

    pub(crate) fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for &idx in path {
            node = node.content.get_mut(idx)?;
        }
        Some(node)
    }

    /// Check the structural rules of the custom blocks.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.root.node_kind() != NodeKind::Doc {
            return Err(DocumentError::Invalid {
                path: Vec::new(),
                message: format!("root node must be 'doc', got '{}'", self.root.kind),
            });
        }
        let mut path = Vec::new();
        validate_children(&self.root, &mut path)
    }

    /// Every image URL in document order, gallery images included
    pub fn images(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_images(&self.root, &mut out);
        out
    }

    pub fn first_image(&self) -> Option<String> {
        self.images().into_iter().next()
    }

    /// Text content, one line per text block
    pub fn plain_text(&self) -> String {
        let mut blocks = Vec::new();
        collect_text_blocks(&self.root, &mut blocks);
        blocks.join("\n")
    }

    /// Whitespace-collapsed text cut to at most `max_chars` characters.
    ///
    /// Cuts fall on a word boundary where possible and end with an ellipsis.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let text = self.plain_text();
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.chars().count() <= max_chars {
            return collapsed;
        }

        let cut: String = collapsed.chars().take(max_chars).collect();
        let at_word_end = collapsed.chars().nth(max_chars) == Some(' ');
        let cut = match cut.rfind(' ') {
            Some(idx) if idx > 0 && !at_word_end => &cut[..idx],
            _ => cut.as_str(),
        };
        format!("{}…", cut.trim_end())
    }
}

fn invalid(path: &[usize], message: impl Into<String>) -> DocumentError {
    DocumentError::Invalid {
        path: path.to_vec(),
        message: message.into(),
    }
}

fn validate_children(parent: &Node, path: &mut Vec<usize>) -> Result<(), DocumentError> {
    for (idx, child) in parent.content.iter().enumerate() {
        path.push(idx);
        validate_node(parent, child, path)?;
        validate_children(child, path)?;
        path.pop();
    }
    Ok(())
}

fn validate_node(parent: &Node, node: &Node, path: &[usize]) -> Result<(), DocumentError> {
    match node.node_kind() {
        NodeKind::Doc => Err(invalid(path, "'doc' may only appear at the root")),
        NodeKind::Text if node.text.is_none() => Err(invalid(path, "text node without text")),
        NodeKind::Image if node.image_src().is_none() => {
            Err(invalid(path, "image requires a non-empty 'src'"))
        }
        NodeKind::ImageGallery => {
            if node.gallery_images().is_empty() {
                return Err(invalid(path, "gallery requires at least one image"));
            }
            match node.attr_str("layout") {
                Some(layout) if GalleryLayout::parse(layout).is_none() => Err(invalid(
                    path,
                    format!("unknown gallery layout '{}'", layout),
                )),
                _ => Ok(()),
            }
        }
        NodeKind::Columns => {
            let count = node.column_count();
            if !(MIN_COLUMNS..=MAX_COLUMNS).contains(&count) {
                return Err(invalid(
                    path,
                    format!("column count must be 2 to 4, got {}", count),
                ));
            }
            if node.content.len() != count {
                return Err(invalid(
                    path,
                    format!("expected {} columns, found {}", count, node.content.len()),
                ));
            }
            if let Some(pos) = node
                .content
                .iter()
                .position(|c| c.node_kind() != NodeKind::Column)
            {
                return Err(invalid(path, format!("child {} is not a column", pos)));
            }
            if let Some(pos) = node.content.iter().position(|c| c.content.is_empty()) {
                return Err(invalid(path, format!("column {} is empty", pos)));
            }
            Ok(())
        }
        NodeKind::Column if parent.node_kind() != NodeKind::Columns => {
            Err(invalid(path, "column outside of a columns block"))
        }
        _ => Ok(()),
    }
}

fn collect_images(node: &Node, out: &mut Vec<String>) {
    match node.node_kind() {
        NodeKind::Image => {
            if let Some(src) = node.image_src() {
                out.push(src.to_string());
            }
        }
        NodeKind::ImageGallery => out.extend(node.gallery_images()),
        _ => {
            for child in &node.content {
                collect_images(child, out);
            }
        }
    }
}

fn collect_text_blocks(node: &Node, out: &mut Vec<String>) {
    if node.holds_inline() {
        let mut text = String::new();
        node.inline_text(&mut text);
        if !text.trim().is_empty() {
            out.push(text);
        }
        return;
    }
    for child in &node.content {
        collect_text_blocks(child, out);
    }
}

/// Source URL of a gallery entry, plain or `{ "src": ... }`
pub fn gallery_entry_src(entry: &Value) -> Option<&str> {
    let src = match entry {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("src").and_then(Value::as_str)?,
        _ => return None,
    };
    (!src.trim().is_empty()).then_some(src)
}

/// Alt text of an object gallery entry
pub fn gallery_entry_alt(entry: &Value) -> &str {
    entry.get("alt").and_then(Value::as_str).unwrap_or_default()
}
