//! Patch Modules
//!
//! Attribute, listener, class/style and similar synchronizers register as
//! modules on the [`Patcher`](super::patch::Patcher). The reconciler invokes
//! them at the corresponding lifecycle points and knows nothing about what
//! they do internally.

use super::backend::Backend;
use super::vnode::VNodeRef;

/// Per-node hooks invoked by the reconciler.
pub trait PatchModule<B: Backend>: Send + Sync {
    /// A fresh element was materialized.
    fn create(&self, _backend: &B, _node: &VNodeRef<B::Handle>) {}

    /// An element is being patched in place.
    fn update(&self, _backend: &B, _old: &VNodeRef<B::Handle>, _new: &VNodeRef<B::Handle>) {}

    /// A node is being destroyed.
    fn destroy(&self, _backend: &B, _node: &VNodeRef<B::Handle>) {}
}
