//! Virtual Nodes
//!
//! A `VNode` is an immutable description of intended tree shape, produced
//! fresh each render cycle. The only mutable part is the live handle slot,
//! assigned once the node is materialized into the backend. The previous
//! cycle's tree is retained just long enough to serve as the diff baseline.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{same_value, Key, Value};

/// Shared reference to a virtual node.
pub type VNodeRef<H> = Arc<VNode<H>>;

/// One node of a virtual tree, generic over the backend's handle type.
pub struct VNode<H> {
    tag: Option<Arc<str>>,
    props: IndexMap<String, Value>,
    children: Vec<VNodeRef<H>>,
    text: Option<Arc<str>>,
    key: Option<Key>,
    comment: bool,
    is_static: bool,
    handle: Mutex<Option<H>>,
}

impl<H> VNode<H> {
    fn bare() -> Self {
        Self {
            tag: None,
            props: IndexMap::new(),
            children: Vec::new(),
            text: None,
            key: None,
            comment: false,
            is_static: false,
            handle: Mutex::new(None),
        }
    }

    /// An element node.
    pub fn element(tag: impl Into<Arc<str>>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::bare()
        }
    }

    /// A text node.
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::bare()
        }
    }

    /// A comment placeholder node.
    pub fn comment(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: Some(text.into()),
            comment: true,
            ..Self::bare()
        }
    }

    /// Attach a reconciliation key.
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach a prop.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Attach children.
    pub fn with_children(mut self, children: Vec<VNodeRef<H>>) -> Self {
        self.children = children;
        self
    }

    /// Shorthand text content for a childless element.
    pub fn with_text(mut self, text: impl Into<Arc<str>>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Mark the node immutable: when both diff sides are static with equal
    /// keys, the reconciler short-circuits.
    pub fn mark_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Wrap into the shared reference the reconciler works with.
    pub fn into_ref(self) -> VNodeRef<H> {
        Arc::new(self)
    }

    /// Element tag, if this is an element.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Text payload (text/comment nodes, or element text shorthand).
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Reconciliation key.
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Props in insertion order.
    pub fn props(&self) -> &IndexMap<String, Value> {
        &self.props
    }

    /// Child nodes.
    pub fn children(&self) -> &[VNodeRef<H>] {
        &self.children
    }

    /// Whether this is a comment placeholder.
    pub fn is_comment(&self) -> bool {
        self.comment
    }

    /// Whether this is a text node.
    pub fn is_text(&self) -> bool {
        self.tag.is_none() && !self.comment
    }

    /// Whether the node is flagged immutable.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub(crate) fn set_handle(&self, handle: H) {
        *self.handle.lock() = Some(handle);
    }
}

impl<H: Clone> VNode<H> {
    /// The live handle, once materialized.
    pub fn handle(&self) -> Option<H> {
        self.handle.lock().clone()
    }
}

impl<H> std::fmt::Debug for VNode<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VNode")
            .field("tag", &self.tag)
            .field("text", &self.text)
            .field("key", &self.key)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Whether two descriptions refer to "the same node" for diffing purposes:
/// same key, same tag, same comment-ness, and (for inputs) a compatible
/// input subtype.
pub fn same_node<H>(a: &VNode<H>, b: &VNode<H>) -> bool {
    a.key == b.key && a.tag == b.tag && a.comment == b.comment && same_input_type(a, b)
}

fn same_input_type<H>(a: &VNode<H>, b: &VNode<H>) -> bool {
    if a.tag.as_deref() != Some("input") {
        return true;
    }
    match (a.props.get("type"), b.props.get("type")) {
        (None, None) => true,
        (Some(x), Some(y)) => same_value(x, y),
        _ => false,
    }
}
