//! Tree Reconciliation
//!
//! `patch` mutates a live tree into the shape of a new virtual tree with a
//! minimal set of backend operations. Nodes that are "the same" (key + tag +
//! comment-ness + input subtype) are updated in place; anything else is
//! materialized fresh next to the old node, which is then destroyed.
//!
//! # Keyed Children
//!
//! Child lists reconcile with a four-pointer scan over both lists:
//!
//! 1. skip old entries nulled by an earlier keyed move;
//! 2. old-start vs new-start: patch in place, advance both;
//! 3. old-end vs new-end: patch, retreat both;
//! 4. old-start vs new-end is a rightward move: patch, relocate the live
//!    node to just after old-end's;
//! 5. old-end vs new-start is a leftward move: patch, relocate to just
//!    before old-start's;
//! 6. otherwise look new-start's key up in an index built lazily from the
//!    remaining old range: absent means materialize fresh, present-and-same
//!    means patch and move, present-but-different (key collision across
//!    tags) means materialize fresh in place.
//!
//! Pure appends, prepends and reversals stay O(n); out-of-order keyed moves
//! pay only the lazy key map. After the loop, whichever range remains is
//! bulk-inserted or bulk-destroyed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::reactive::Key;

use super::backend::Backend;
use super::module::PatchModule;
use super::vnode::{same_node, VNodeRef};

/// The reconciliation engine for one backend.
pub struct Patcher<B: Backend> {
    backend: B,
    modules: Vec<Box<dyn PatchModule<B>>>,
}

impl<B: Backend> Patcher<B> {
    /// Create a patcher over `backend` with no modules.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            modules: Vec::new(),
        }
    }

    /// Register a patch module.
    pub fn with_module(mut self, module: Box<dyn PatchModule<B>>) -> Self {
        self.modules.push(module);
        self
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reconcile `new` against `old` and return the live root handle.
    pub fn patch(
        &self,
        old: Option<&VNodeRef<B::Handle>>,
        new: Option<&VNodeRef<B::Handle>>,
    ) -> Option<B::Handle> {
        match (old, new) {
            (None, None) => None,
            (Some(old), None) => {
                self.invoke_destroy_hooks(old);
                None
            }
            (None, Some(new)) => {
                self.create_node(new, None, None);
                new.handle()
            }
            (Some(old), Some(new)) => {
                if same_node(old, new) {
                    self.patch_node(old, new);
                } else {
                    // replace: materialize next to the old node, then drop it
                    let old_handle = old.handle();
                    let parent = old_handle.as_ref().and_then(|h| self.backend.parent(h));
                    let anchor = old_handle.as_ref().and_then(|h| self.backend.next_sibling(h));
                    self.create_node(new, parent.as_ref(), anchor.as_ref());
                    if let (Some(parent), Some(old_handle)) = (&parent, &old_handle) {
                        self.backend.remove_child(parent, old_handle);
                    }
                    self.invoke_destroy_hooks(old);
                }
                new.handle()
            }
        }
    }

    /// Materialize `node` and its descendants, inserting under `parent`
    /// before `anchor` when given.
    fn create_node(
        &self,
        node: &VNodeRef<B::Handle>,
        parent: Option<&B::Handle>,
        anchor: Option<&B::Handle>,
    ) {
        let handle = if let Some(tag) = node.tag() {
            let handle = self.backend.create_element(tag);
            node.set_handle(handle.clone());
            if node.children().is_empty() {
                if let Some(text) = node.text_content() {
                    self.backend.set_text(&handle, text);
                }
            } else {
                for child in node.children() {
                    self.create_node(child, Some(&handle), None);
                }
            }
            for module in &self.modules {
                module.create(&self.backend, node);
            }
            handle
        } else if node.is_comment() {
            let handle = self.backend.create_comment(node.text_content().unwrap_or(""));
            node.set_handle(handle.clone());
            handle
        } else {
            let handle = self.backend.create_text(node.text_content().unwrap_or(""));
            node.set_handle(handle.clone());
            handle
        };
        if let Some(parent) = parent {
            self.backend.insert_before(parent, &handle, anchor);
        }
    }

    /// Update a live node in place to match `new`.
    fn patch_node(&self, old: &VNodeRef<B::Handle>, new: &VNodeRef<B::Handle>) {
        if Arc::ptr_eq(old, new) {
            return;
        }
        let handle = match old.handle() {
            Some(handle) => handle,
            None => {
                tracing::warn!("patching a node that was never materialized");
                return;
            }
        };
        new.set_handle(handle.clone());

        if old.is_static() && new.is_static() && old.key() == new.key() {
            return;
        }

        if new.tag().is_some() {
            for module in &self.modules {
                module.update(&self.backend, old, new);
            }
        }

        if new.text_content().is_none() {
            let old_has_children = !old.children().is_empty();
            let new_has_children = !new.children().is_empty();
            if old_has_children && new_has_children {
                self.update_children(&handle, old.children(), new.children());
            } else if new_has_children {
                if old.text_content().is_some() {
                    self.backend.set_text(&handle, "");
                }
                for child in new.children() {
                    self.create_node(child, Some(&handle), None);
                }
            } else if old_has_children {
                self.remove_nodes(&handle, old.children());
            } else if old.text_content().is_some() {
                self.backend.set_text(&handle, "");
            }
        } else if old.text_content() != new.text_content() {
            self.backend.set_text(&handle, new.text_content().unwrap_or(""));
        }
    }

    /// Reconcile two child lists under `parent` with the four-pointer scan.
    fn update_children(
        &self,
        parent: &B::Handle,
        old_children: &[VNodeRef<B::Handle>],
        new_children: &[VNodeRef<B::Handle>],
    ) {
        check_duplicate_keys(new_children);

        // consumed old slots become None, the live leftovers are swept below
        let mut old: Vec<Option<VNodeRef<B::Handle>>> =
            old_children.iter().cloned().map(Some).collect();
        let mut old_start: isize = 0;
        let mut old_end: isize = old.len() as isize - 1;
        let mut new_start: isize = 0;
        let mut new_end: isize = new_children.len() as isize - 1;
        let mut key_index: Option<HashMap<Key, isize>> = None;

        while old_start <= old_end && new_start <= new_end {
            let Some(old_start_node) = old[old_start as usize].clone() else {
                old_start += 1;
                continue;
            };
            let Some(old_end_node) = old[old_end as usize].clone() else {
                old_end -= 1;
                continue;
            };
            let new_start_node = new_children[new_start as usize].clone();
            let new_end_node = new_children[new_end as usize].clone();

            if same_node(&old_start_node, &new_start_node) {
                self.patch_node(&old_start_node, &new_start_node);
                old_start += 1;
                new_start += 1;
            } else if same_node(&old_end_node, &new_end_node) {
                self.patch_node(&old_end_node, &new_end_node);
                old_end -= 1;
                new_end -= 1;
            } else if same_node(&old_start_node, &new_end_node) {
                // moved right
                self.patch_node(&old_start_node, &new_end_node);
                if let (Some(node), Some(after)) = (old_start_node.handle(), old_end_node.handle())
                {
                    let anchor = self.backend.next_sibling(&after);
                    self.backend.insert_before(parent, &node, anchor.as_ref());
                }
                old_start += 1;
                new_end -= 1;
            } else if same_node(&old_end_node, &new_start_node) {
                // moved left
                self.patch_node(&old_end_node, &new_start_node);
                if let (Some(node), Some(before)) = (old_end_node.handle(), old_start_node.handle())
                {
                    self.backend.insert_before(parent, &node, Some(&before));
                }
                old_end -= 1;
                new_start += 1;
            } else {
                if key_index.is_none() {
                    key_index = Some(build_key_index(&old, old_start, old_end));
                }
                let found = match new_start_node.key() {
                    Some(key) => key_index.as_ref().and_then(|map| map.get(key)).copied(),
                    None => (old_start..=old_end).find(|&i| {
                        old[i as usize]
                            .as_ref()
                            .is_some_and(|candidate| same_node(candidate, &new_start_node))
                    }),
                };
                let anchor = old_start_node.handle();
                match found {
                    Some(i) if i >= old_start && i <= old_end => {
                        match old[i as usize].take() {
                            Some(candidate) if same_node(&candidate, &new_start_node) => {
                                self.patch_node(&candidate, &new_start_node);
                                if let Some(node) = candidate.handle() {
                                    self.backend.insert_before(parent, &node, anchor.as_ref());
                                }
                            }
                            Some(candidate) => {
                                // same key, different element: leave the old
                                // node for the removal sweep
                                old[i as usize] = Some(candidate);
                                self.create_node(&new_start_node, Some(parent), anchor.as_ref());
                            }
                            None => {
                                self.create_node(&new_start_node, Some(parent), anchor.as_ref());
                            }
                        }
                    }
                    _ => self.create_node(&new_start_node, Some(parent), anchor.as_ref()),
                }
                new_start += 1;
            }
        }

        if old_start > old_end {
            if new_start <= new_end {
                // remaining new nodes are insertions, anchored on the first
                // node after the inserted run
                let anchor = new_children
                    .get((new_end + 1) as usize)
                    .and_then(|node| node.handle());
                for i in new_start..=new_end {
                    self.create_node(&new_children[i as usize], Some(parent), anchor.as_ref());
                }
            }
        } else if new_start > new_end {
            let leftover: Vec<VNodeRef<B::Handle>> = old[old_start as usize..=old_end as usize]
                .iter()
                .flatten()
                .cloned()
                .collect();
            self.remove_nodes(parent, &leftover);
        }
    }

    /// Detach and destroy each node.
    fn remove_nodes(&self, parent: &B::Handle, nodes: &[VNodeRef<B::Handle>]) {
        for node in nodes {
            if let Some(handle) = node.handle() {
                self.backend.remove_child(parent, &handle);
            }
            self.invoke_destroy_hooks(node);
        }
    }

    /// Fire module destroy hooks over a subtree, children last.
    fn invoke_destroy_hooks(&self, node: &VNodeRef<B::Handle>) {
        for module in &self.modules {
            module.destroy(&self.backend, node);
        }
        for child in node.children() {
            self.invoke_destroy_hooks(child);
        }
    }
}

fn build_key_index<H>(
    old: &[Option<VNodeRef<H>>],
    start: isize,
    end: isize,
) -> HashMap<Key, isize> {
    let mut index = HashMap::new();
    for i in start..=end {
        if let Some(node) = &old[i as usize] {
            if let Some(key) = node.key() {
                index.entry(key.clone()).or_insert(i);
            }
        }
    }
    index
}

/// Development diagnostic: repeated keys break move detection, so the diff
/// falls back to positional matching for the duplicates.
fn check_duplicate_keys<H>(children: &[VNodeRef<H>]) {
    let mut seen: HashSet<&Key> = HashSet::new();
    for child in children {
        if let Some(key) = child.key() {
            if !seen.insert(key) {
                tracing::warn!(?key, "duplicate key in child list; matching falls back to position");
            }
        }
    }
}
