//! The patch engine: turns a new vnode tree plus the previous one into the
//! minimal set of [`NodeOps`] calls.
//!
//! Children are reconciled with the four-pointer diff (old start/end against
//! new start/end), falling back to a key map, so appends, prepends and
//! reversals cost at most one relocation per node. Component placeholders
//! are handed to the lifecycle bridge at `init`, `prepatch`, `insert` and
//! `destroy`.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::component::Component;
use crate::lifecycle::{
    destroy_component, init_component, insert_component, prepatch_component, transfer_instance,
};
use crate::node_ops::{Module, NodeKey, NodeOps};
use crate::vnode::{Key, VNode, VNodeFlags, same_vnode};

/// What a patch starts from.
#[derive(Clone, Copy)]
pub enum OldTree<'a> {
    /// Nothing rendered yet; create detached.
    Empty,
    /// An existing external element to replace (a mount point).
    Element(NodeKey),
    Node(&'a VNode),
}

pub struct Patcher {
    ops: Rc<dyn NodeOps>,
    modules: Vec<Rc<dyn Module>>,
    empty: VNode,
}

impl Patcher {
    pub fn new(ops: Rc<dyn NodeOps>, modules: Vec<Rc<dyn Module>>) -> Rc<Self> {
        Rc::new(Self {
            ops,
            modules,
            empty: VNode::blank(),
        })
    }

    pub fn ops(&self) -> &Rc<dyn NodeOps> {
        &self.ops
    }

    /// Patch `vnode` over `old` and return the resulting root node.
    ///
    /// `vnode == None` tears `old` down: destroy hooks run, the external
    /// nodes are left alone. `active` is the instance whose render produced
    /// `vnode`; components created here become its children.
    pub fn patch(
        self: &Rc<Self>,
        old: OldTree<'_>,
        vnode: Option<&VNode>,
        active: Option<&Component>,
    ) -> Option<NodeKey> {
        let mut run = PatchRun {
            patcher: self.clone(),
            active: active.cloned(),
            inserted: Vec::new(),
        };
        let Some(vnode) = vnode else {
            if let OldTree::Node(old) = old {
                run.invoke_destroy_hook(old);
            }
            return None;
        };

        let mut initial = false;
        let vnode = match old {
            OldTree::Empty => {
                initial = true;
                run.create_elm(vnode, None, None, false, false)
            }
            OldTree::Node(old) if same_vnode(old, vnode) => run.patch_vnode(old, vnode, false),
            OldTree::Node(old) => run.replace(old, vnode),
            OldTree::Element(el) => {
                let tag = self.ops.tag_name(el).unwrap_or_default();
                run.replace(&VNode::at_element(tag, el), vnode)
            }
        };

        let queue = std::mem::take(&mut run.inserted);
        run.invoke_insert_hooks(&vnode, queue, initial);
        vnode.elm()
    }
}

/// State for one top-level patch call.
struct PatchRun {
    patcher: Rc<Patcher>,
    active: Option<Component>,
    // Nodes whose insert hooks fire once the whole tree is in place.
    inserted: Vec<VNode>,
}

impl PatchRun {
    fn ops(&self) -> &dyn NodeOps {
        &*self.patcher.ops
    }

    /// Create `vnode` next to `old` and drop `old`.
    fn replace(&mut self, old: &VNode, vnode: &VNode) -> VNode {
        let old_elm = old.elm();
        let parent = old_elm.and_then(|e| self.ops().parent_node(e));
        let next = old_elm.and_then(|e| self.ops().next_sibling(e));
        let vnode = self.create_elm(vnode, parent, next, false, false);

        // A component root changed: every placeholder above shares its node.
        if let Some(mut ancestor) = vnode.parent() {
            let patchable = is_patchable(&vnode);
            loop {
                for m in &self.patcher.modules {
                    m.destroy(&ancestor);
                }
                ancestor.set_elm(vnode.elm());
                if patchable {
                    for m in &self.patcher.modules {
                        m.create(&self.patcher.empty, &ancestor);
                    }
                    if let Some(insert) = ancestor.data().and_then(|d| d.hook.insert.clone()) {
                        insert(&ancestor);
                    }
                }
                match ancestor.parent() {
                    Some(p) => ancestor = p,
                    None => break,
                }
            }
        }

        if parent.is_some() {
            self.remove_vnodes(std::slice::from_ref(old));
        } else if old.tag().is_some() {
            self.invoke_destroy_hook(old);
        }
        vnode
    }

    /// Build the external node for `vnode` (and its subtree) and insert it
    /// under `parent` before `reference`. A vnode already backed by a node
    /// is copied first when it sits in a children array; the copy is
    /// returned so the caller can store it in place of the original.
    fn create_elm(
        &mut self,
        vnode: &VNode,
        parent: Option<NodeKey>,
        reference: Option<NodeKey>,
        nested: bool,
        in_array: bool,
    ) -> VNode {
        let vnode = if in_array && vnode.elm().is_some() {
            vnode.clone_node(false)
        } else {
            vnode.clone()
        };
        vnode.set_flag(VNodeFlags::ROOT_INSERT, !nested);

        if self.create_component(&vnode, parent, reference) {
            return vnode;
        }

        let elm = if let Some(tag) = vnode.tag() {
            let elm = self.ops().create_element(tag);
            vnode.set_elm(Some(elm));
            self.create_children(&vnode);
            if vnode.data().is_some() {
                self.invoke_create_hooks(&vnode);
            }
            elm
        } else if vnode.is_comment() {
            self.ops().create_comment(vnode.text_content().unwrap_or_default())
        } else {
            self.ops().create_text_node(vnode.text_content().unwrap_or_default())
        };
        vnode.set_elm(Some(elm));
        self.insert(parent, elm, reference);
        vnode
    }

    fn create_component(
        &mut self,
        vnode: &VNode,
        parent: Option<NodeKey>,
        reference: Option<NodeKey>,
    ) -> bool {
        if !vnode.is_component() {
            return false;
        }
        init_component(vnode, &self.patcher, self.active.as_ref());
        if vnode.component_instance().is_none() {
            return false;
        }
        self.init_component(vnode);
        if let Some(elm) = vnode.elm() {
            self.insert(parent, elm, reference);
        }
        true
    }

    fn init_component(&mut self, vnode: &VNode) {
        if let Some(pending) = vnode.take_pending_insert() {
            self.inserted.extend(pending);
        }
        let Some(instance) = vnode.component_instance() else {
            return;
        };
        vnode.set_elm(instance.el());
        if is_patchable(vnode) {
            self.invoke_create_hooks(vnode);
        } else {
            // Empty root: no node for the modules, but mounted still fires.
            self.inserted.push(vnode.clone());
        }
    }

    fn create_children(&mut self, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        if let Some(children) = vnode.children() {
            let mut created: Vec<VNode> = Vec::with_capacity(children.len());
            for child in children.iter() {
                created.push(self.create_elm(child, Some(elm), None, true, true));
            }
            write_back(vnode, &children, created);
        } else if let Some(text) = vnode.text_content() {
            let node = self.ops().create_text_node(text);
            self.ops().append_child(elm, node);
        }
    }

    fn invoke_create_hooks(&mut self, vnode: &VNode) {
        for m in &self.patcher.modules {
            m.create(&self.patcher.empty, vnode);
        }
        let hooks = vnode.data().map(|d| d.hook.clone()).unwrap_or_default();
        if let Some(create) = hooks.create {
            create(vnode);
        }
        if vnode.is_component() || hooks.insert.is_some() {
            self.inserted.push(vnode.clone());
        }
    }

    fn insert(&self, parent: Option<NodeKey>, elm: NodeKey, reference: Option<NodeKey>) {
        let Some(parent) = parent else {
            return;
        };
        match reference {
            Some(r) => {
                if self.ops().parent_node(r) == Some(parent) {
                    self.ops().insert_before(parent, elm, Some(r));
                }
            }
            None => self.ops().append_child(parent, elm),
        }
    }

    /// Patch `vnode` in place over `old` (already known to be the same
    /// node). Returns the vnode now holding the external node; it differs
    /// from `vnode` only when `vnode` had to be copied.
    fn patch_vnode(&mut self, old: &VNode, vnode: &VNode, in_array: bool) -> VNode {
        if old.ptr_eq(vnode) {
            return vnode.clone();
        }
        let vnode = if in_array && vnode.elm().is_some() {
            vnode.clone_node(false)
        } else {
            vnode.clone()
        };
        let elm = old.elm();
        vnode.set_elm(elm);

        if vnode.has_flag(VNodeFlags::STATIC)
            && old.has_flag(VNodeFlags::STATIC)
            && vnode.key() == old.key()
            && (vnode.has_flag(VNodeFlags::CLONED) || vnode.has_flag(VNodeFlags::ONCE))
        {
            transfer_instance(old, &vnode);
            return vnode;
        }

        let hooks = vnode.data().map(|d| d.hook.clone()).unwrap_or_default();
        if vnode.is_component() {
            prepatch_component(old, &vnode);
        }
        if let Some(prepatch) = &hooks.prepatch {
            prepatch(old, &vnode);
        }

        // Either side may carry data now that a dropped class or attr still
        // patches in place.
        if (vnode.data().is_some() || old.data().is_some()) && is_patchable(&vnode) {
            for m in &self.patcher.modules {
                m.update(old, &vnode);
            }
            if let Some(update) = &hooks.update {
                update(old, &vnode);
            }
        }

        if let Some(elm) = elm {
            self.patch_content(old, &vnode, elm);
        }

        if let Some(postpatch) = &hooks.postpatch {
            postpatch(old, &vnode);
        }
        vnode
    }

    fn patch_content(&mut self, old: &VNode, vnode: &VNode, elm: NodeKey) {
        let old_ch = old.children();
        let ch = vnode.children();
        match vnode.text_content() {
            None => match (old_ch, ch) {
                (Some(old_ch), Some(ch)) => {
                    if !Rc::ptr_eq(&old_ch, &ch) {
                        let updated = self.update_children(elm, &old_ch, &ch);
                        write_back(vnode, &ch, updated);
                    }
                }
                (None, Some(ch)) => {
                    if old.text_content().is_some() {
                        self.ops().set_text_content(elm, "");
                    }
                    let mut created = ch.to_vec();
                    self.add_vnodes(elm, None, &mut created, 0, ch.len() as isize - 1);
                    write_back(vnode, &ch, created);
                }
                (Some(old_ch), None) => self.remove_vnodes(&old_ch),
                (None, None) => {
                    if old.text_content().is_some() {
                        self.ops().set_text_content(elm, "");
                    }
                }
            },
            Some(text) => {
                if let Some(old_ch) = old_ch {
                    self.remove_vnodes(&old_ch);
                }
                if old.text_content() != Some(text) {
                    self.ops().set_text_content(elm, text);
                }
            }
        }
    }

    fn update_children(&mut self, parent: NodeKey, old_ch: &[VNode], new_ch: &[VNode]) -> Vec<VNode> {
        check_duplicate_keys(new_ch);
        let ops = self.patcher.ops.clone();
        let mut old: Vec<Option<VNode>> = old_ch.iter().cloned().map(Some).collect();
        let mut new: Vec<VNode> = new_ch.to_vec();
        let mut old_start: isize = 0;
        let mut old_end: isize = old.len() as isize - 1;
        let mut new_start: isize = 0;
        let mut new_end: isize = new.len() as isize - 1;
        let mut key_map: Option<HashMap<Key, usize>> = None;

        while old_start <= old_end && new_start <= new_end {
            let (os, oe) = (old_start as usize, old_end as usize);
            let (ns, ne) = (new_start as usize, new_end as usize);
            // Slots already moved out by the key-map step.
            let Some(old_start_v) = old[os].clone() else {
                old_start += 1;
                continue;
            };
            let Some(old_end_v) = old[oe].clone() else {
                old_end -= 1;
                continue;
            };
            let new_start_v = new[ns].clone();
            let new_end_v = new[ne].clone();

            if same_vnode(&old_start_v, &new_start_v) {
                new[ns] = self.patch_vnode(&old_start_v, &new_start_v, true);
                old_start += 1;
                new_start += 1;
            } else if same_vnode(&old_end_v, &new_end_v) {
                new[ne] = self.patch_vnode(&old_end_v, &new_end_v, true);
                old_end -= 1;
                new_end -= 1;
            } else if same_vnode(&old_start_v, &new_end_v) {
                // Moved right: after the current old end.
                new[ne] = self.patch_vnode(&old_start_v, &new_end_v, true);
                if let Some(elm) = old_start_v.elm() {
                    let after = old_end_v.elm().and_then(|e| ops.next_sibling(e));
                    ops.insert_before(parent, elm, after);
                }
                old_start += 1;
                new_end -= 1;
            } else if same_vnode(&old_end_v, &new_start_v) {
                // Moved left: before the current old start.
                new[ns] = self.patch_vnode(&old_end_v, &new_start_v, true);
                if let Some(elm) = old_end_v.elm() {
                    ops.insert_before(parent, elm, old_start_v.elm());
                }
                old_end -= 1;
                new_start += 1;
            } else {
                let idx = match new_start_v.key() {
                    Some(key) => key_map
                        .get_or_insert_with(|| key_to_old_idx(&old, os, oe))
                        .get(key)
                        .copied(),
                    None => find_idx_in_old(&new_start_v, &old, os, oe),
                };
                let matched = idx.and_then(|i| old[i].clone().map(|v| (i, v)));
                match matched {
                    Some((i, to_move)) if same_vnode(&to_move, &new_start_v) => {
                        new[ns] = self.patch_vnode(&to_move, &new_start_v, true);
                        old[i] = None;
                        if let Some(elm) = to_move.elm() {
                            ops.insert_before(parent, elm, old_start_v.elm());
                        }
                    }
                    // New key, or same key on a different kind of node.
                    _ => {
                        new[ns] = self.create_elm(&new_start_v, Some(parent), old_start_v.elm(), false, true);
                    }
                }
                new_start += 1;
            }
        }

        if old_start > old_end {
            let reference = new.get((new_end + 1) as usize).and_then(VNode::elm);
            self.add_vnodes(parent, reference, &mut new, new_start, new_end);
        } else if new_start > new_end {
            let leftover: Vec<VNode> = old[old_start as usize..=old_end as usize]
                .iter()
                .flatten()
                .cloned()
                .collect();
            self.remove_vnodes(&leftover);
        }
        new
    }

    fn add_vnodes(
        &mut self,
        parent: NodeKey,
        reference: Option<NodeKey>,
        vnodes: &mut [VNode],
        start: isize,
        end: isize,
    ) {
        let mut i = start;
        while i <= end {
            let idx = i as usize;
            let vnode = vnodes[idx].clone();
            vnodes[idx] = self.create_elm(&vnode, Some(parent), reference, false, true);
            i += 1;
        }
    }

    /// Destroy hooks first, then detach.
    fn remove_vnodes(&mut self, vnodes: &[VNode]) {
        for vnode in vnodes {
            if vnode.tag().is_some() {
                self.invoke_destroy_hook(vnode);
            }
            if let Some(elm) = vnode.elm() {
                self.remove_node(elm);
            }
        }
    }

    fn remove_node(&self, elm: NodeKey) {
        if let Some(parent) = self.ops().parent_node(elm) {
            self.ops().remove_child(parent, elm);
        }
    }

    /// Children first, then the node's own hooks.
    fn invoke_destroy_hook(&mut self, vnode: &VNode) {
        if let Some(children) = vnode.children() {
            for child in children.iter() {
                self.invoke_destroy_hook(child);
            }
        }
        let Some(data) = vnode.data() else {
            return;
        };
        if vnode.is_component() {
            destroy_component(vnode);
        }
        if let Some(destroy) = data.hook.destroy.clone() {
            destroy(vnode);
        }
        for m in &self.patcher.modules {
            m.destroy(vnode);
        }
    }

    /// Fire queued insert hooks, or hand them to the placeholder when this
    /// is a component's first patch; its parent fires them once it is
    /// inserted itself.
    fn invoke_insert_hooks(&self, vnode: &VNode, queue: Vec<VNode>, initial: bool) {
        if initial && let Some(placeholder) = vnode.parent() {
            placeholder.set_pending_insert(queue);
            return;
        }
        for v in queue {
            if v.is_component() {
                insert_component(&v);
            }
            if let Some(insert) = v.data().and_then(|d| d.hook.insert.clone()) {
                insert(&v);
            }
        }
    }
}

/// Replace `vnode`'s children with `updated` when any node was copied.
fn write_back(vnode: &VNode, children: &Rc<[VNode]>, updated: Vec<VNode>) {
    let changed = children.len() != updated.len()
        || children.iter().zip(&updated).any(|(a, b)| !a.ptr_eq(b));
    if changed {
        vnode.set_children(Some(Rc::from(updated)));
    }
}

/// Whether the tree under `vnode` ends in a real element, following
/// component roots.
pub(crate) fn is_patchable(vnode: &VNode) -> bool {
    let mut cur = vnode.clone();
    while let Some(instance) = cur.component_instance() {
        match instance.root_vnode() {
            Some(root) => cur = root,
            None => return false,
        }
    }
    cur.tag().is_some()
}

fn key_to_old_idx(old: &[Option<VNode>], start: usize, end: usize) -> HashMap<Key, usize> {
    let mut map = HashMap::new();
    for (i, v) in old.iter().enumerate().take(end + 1).skip(start) {
        if let Some(key) = v.as_ref().and_then(VNode::key) {
            map.insert(key.clone(), i);
        }
    }
    map
}

fn find_idx_in_old(vnode: &VNode, old: &[Option<VNode>], start: usize, end: usize) -> Option<usize> {
    (start..=end).find(|&i| old[i].as_ref().is_some_and(|o| same_vnode(o, vnode)))
}

fn check_duplicate_keys(children: &[VNode]) {
    let mut seen = HashSet::new();
    for key in children.iter().filter_map(VNode::key) {
        if !seen.insert(key) {
            revue_core::warn(format!("duplicate key `{key}` among siblings; patching may misbehave"));
        }
    }
}
