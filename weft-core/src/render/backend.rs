//! Platform Backend
//!
//! The reconciler mutates a live tree only through this fixed operation set.
//! Supplying a different implementation repoints the whole engine at a
//! different rendering target; nothing else in the render pipeline is
//! platform-specific.
//!
//! [`MemoryBackend`] is the built-in implementation: a plain in-memory tree
//! with an operation log, used by the test suite to assert that the diff
//! performed the minimal set of mutations, and usable by hosts for headless
//! rendering.

use std::sync::Arc;

use parking_lot::RwLock;

/// The operation seam between the reconciler and the rendering target.
pub trait Backend {
    /// Opaque reference to a live node.
    type Handle: Clone + PartialEq + std::fmt::Debug;

    /// Create a detached element node.
    fn create_element(&self, tag: &str) -> Self::Handle;
    /// Create a detached text node.
    fn create_text(&self, text: &str) -> Self::Handle;
    /// Create a detached comment node.
    fn create_comment(&self, text: &str) -> Self::Handle;
    /// Insert `node` under `parent`, before `anchor` (append when `None`).
    /// Inserting an attached node moves it.
    fn insert_before(&self, parent: &Self::Handle, node: &Self::Handle, anchor: Option<&Self::Handle>);
    /// Detach `child` from `parent`.
    fn remove_child(&self, parent: &Self::Handle, child: &Self::Handle);
    /// Replace a node's text content.
    fn set_text(&self, node: &Self::Handle, text: &str);
    /// The node's parent, if attached.
    fn parent(&self, node: &Self::Handle) -> Option<Self::Handle>;
    /// The node's next sibling, if any.
    fn next_sibling(&self, node: &Self::Handle) -> Option<Self::Handle>;
    /// The element tag, if the node is an element.
    fn tag_name(&self, node: &Self::Handle) -> Option<Arc<str>>;
}

/// Handle into a [`MemoryBackend`] tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MemHandle(usize);

/// One entry of the memory backend's operation log.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendOp {
    /// `create_element`.
    CreatedElement(String),
    /// `create_text`.
    CreatedText(String),
    /// `create_comment`.
    CreatedComment(String),
    /// `insert_before`; `moved` is true when the node was already attached.
    Inserted {
        /// Whether the insert relocated an attached node.
        moved: bool,
    },
    /// `remove_child`.
    Removed,
    /// `set_text`.
    TextSet(String),
}

enum MemKind {
    Element(Arc<str>),
    Text,
    Comment,
}

struct MemNode {
    kind: MemKind,
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// In-memory rendering target with an operation log.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemInner>,
}

struct MemInner {
    nodes: RwLock<Vec<MemNode>>,
    ops: RwLock<Vec<BackendOp>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemInner {
                nodes: RwLock::new(Vec::new()),
                ops: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Drain and return the operation log.
    pub fn take_ops(&self) -> Vec<BackendOp> {
        std::mem::take(&mut *self.inner.ops.write())
    }

    /// Number of logged node creations.
    pub fn created_count(&self) -> usize {
        self.inner
            .ops
            .read()
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    BackendOp::CreatedElement(_) | BackendOp::CreatedText(_) | BackendOp::CreatedComment(_)
                )
            })
            .count()
    }

    /// Number of logged moves (inserts of already-attached nodes).
    pub fn moved_count(&self) -> usize {
        self.inner
            .ops
            .read()
            .iter()
            .filter(|op| matches!(op, BackendOp::Inserted { moved: true }))
            .count()
    }

    /// Number of logged removals.
    pub fn removed_count(&self) -> usize {
        self.inner
            .ops
            .read()
            .iter()
            .filter(|op| matches!(op, BackendOp::Removed))
            .count()
    }

    /// Render the subtree under `handle` as a compact markup string.
    pub fn dump(&self, handle: MemHandle) -> String {
        let nodes = self.inner.nodes.read();
        let mut out = String::new();
        render_node(&nodes, handle.0, &mut out);
        out
    }

    fn alloc(&self, node: MemNode, op: BackendOp) -> MemHandle {
        let mut nodes = self.inner.nodes.write();
        nodes.push(node);
        self.inner.ops.write().push(op);
        MemHandle(nodes.len() - 1)
    }
}

fn render_node(nodes: &[MemNode], index: usize, out: &mut String) {
    let node = &nodes[index];
    match &node.kind {
        MemKind::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            if node.children.is_empty() {
                out.push_str(&node.text);
            }
            for &child in &node.children {
                render_node(nodes, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        MemKind::Text => out.push_str(&node.text),
        MemKind::Comment => {
            out.push_str("<!--");
            out.push_str(&node.text);
            out.push_str("-->");
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    type Handle = MemHandle;

    fn create_element(&self, tag: &str) -> MemHandle {
        self.alloc(
            MemNode {
                kind: MemKind::Element(Arc::from(tag)),
                text: String::new(),
                parent: None,
                children: Vec::new(),
            },
            BackendOp::CreatedElement(tag.to_string()),
        )
    }

    fn create_text(&self, text: &str) -> MemHandle {
        self.alloc(
            MemNode {
                kind: MemKind::Text,
                text: text.to_string(),
                parent: None,
                children: Vec::new(),
            },
            BackendOp::CreatedText(text.to_string()),
        )
    }

    fn create_comment(&self, text: &str) -> MemHandle {
        self.alloc(
            MemNode {
                kind: MemKind::Comment,
                text: text.to_string(),
                parent: None,
                children: Vec::new(),
            },
            BackendOp::CreatedComment(text.to_string()),
        )
    }

    fn insert_before(&self, parent: &MemHandle, node: &MemHandle, anchor: Option<&MemHandle>) {
        let mut nodes = self.inner.nodes.write();
        let moved = nodes[node.0].parent.is_some();
        if let Some(old_parent) = nodes[node.0].parent {
            nodes[old_parent].children.retain(|&child| child != node.0);
        }
        nodes[node.0].parent = Some(parent.0);
        let position = anchor
            .and_then(|anchor| nodes[parent.0].children.iter().position(|&c| c == anchor.0))
            .unwrap_or(nodes[parent.0].children.len());
        nodes[parent.0].children.insert(position, node.0);
        self.inner.ops.write().push(BackendOp::Inserted { moved });
    }

    fn remove_child(&self, parent: &MemHandle, child: &MemHandle) {
        let mut nodes = self.inner.nodes.write();
        nodes[parent.0].children.retain(|&c| c != child.0);
        if nodes[child.0].parent == Some(parent.0) {
            nodes[child.0].parent = None;
        }
        self.inner.ops.write().push(BackendOp::Removed);
    }

    fn set_text(&self, node: &MemHandle, text: &str) {
        self.inner.nodes.write()[node.0].text = text.to_string();
        self.inner.ops.write().push(BackendOp::TextSet(text.to_string()));
    }

    fn parent(&self, node: &MemHandle) -> Option<MemHandle> {
        self.inner.nodes.read()[node.0].parent.map(MemHandle)
    }

    fn next_sibling(&self, node: &MemHandle) -> Option<MemHandle> {
        let nodes = self.inner.nodes.read();
        let parent = nodes[node.0].parent?;
        let siblings = &nodes[parent].children;
        let position = siblings.iter().position(|&c| c == node.0)?;
        siblings.get(position + 1).copied().map(MemHandle)
    }

    fn tag_name(&self, node: &MemHandle) -> Option<Arc<str>> {
        match &self.inner.nodes.read()[node.0].kind {
            MemKind::Element(tag) => Some(tag.clone()),
            _ => None,
        }
    }
}
