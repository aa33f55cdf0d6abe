//! The external-node primitives the patch engine drives.
//!
//! A platform (an in-memory document, a terminal grid, a real DOM binding)
//! implements [`NodeOps`]; the patch engine never touches nodes any other way.

use crate::vnode::VNode;

slotmap::new_key_type! {
    /// Handle to one node owned by the platform.
    pub struct NodeKey;
}

pub trait NodeOps {
    fn create_element(&self, tag: &str) -> NodeKey;
    fn create_text_node(&self, text: &str) -> NodeKey;
    fn create_comment(&self, text: &str) -> NodeKey;

    /// Insert `node` under `parent` before `reference`, or last when `None`.
    /// A node that already has a parent is moved.
    fn insert_before(&self, parent: NodeKey, node: NodeKey, reference: Option<NodeKey>);
    fn remove_child(&self, parent: NodeKey, node: NodeKey);

    fn append_child(&self, parent: NodeKey, node: NodeKey) {
        self.insert_before(parent, node, None);
    }

    fn parent_node(&self, node: NodeKey) -> Option<NodeKey>;
    fn next_sibling(&self, node: NodeKey) -> Option<NodeKey>;
    fn tag_name(&self, node: NodeKey) -> Option<String>;

    /// Replace the node's content with `text` (text and comment nodes: their
    /// data; elements: all children).
    fn set_text_content(&self, node: NodeKey, text: &str);
}

/// Data-patch module: attributes, classes, styles, listeners and the like.
///
/// Every module sees every element vnode; modules must finish before the
/// node's children are reconciled.
pub trait Module {
    fn create(&self, _empty: &VNode, _vnode: &VNode) {}
    fn update(&self, _old: &VNode, _vnode: &VNode) {}
    fn destroy(&self, _vnode: &VNode) {}
}
