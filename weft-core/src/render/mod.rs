//! Rendering Pipeline
//!
//! Virtual nodes describe intended tree shape; the [`Patcher`] reconciles a
//! new description against the previous one and mutates the live tree
//! through the [`Backend`] operation seam with a minimal set of operations.
//! Attribute/listener synchronization plugs in as [`PatchModule`]s.

mod backend;
mod module;
mod patch;
mod vnode;

pub use backend::{Backend, BackendOp, MemHandle, MemoryBackend};
pub use module::PatchModule;
pub use patch::Patcher;
pub use vnode::{same_node, VNode, VNodeRef};
