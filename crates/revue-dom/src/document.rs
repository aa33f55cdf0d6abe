//! In-memory node tree the patch engine renders into.
//!
//! Every structural call is journaled as a [`Mutation`], so callers can see
//! exactly what a patch did.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use revue_core::{Error, Value, handle_error, panic_message};
use revue_vdom::{Listener, Listeners, NodeKey, NodeOps};
use slotmap::SlotMap;
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element(String),
    Text,
    Comment,
}

#[derive(Default)]
pub(crate) struct Node {
    kind: Option<NodeKind>,
    text: String,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    attrs: BTreeMap<String, String>,
    classes: Vec<String>,
    style: BTreeMap<String, String>,
    // One listener set per vnode layer sharing this node (element, then
    // each component placeholder wrapped around it).
    listeners: BTreeMap<usize, Listeners>,
}

/// One structural change, in the order it happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Create(NodeKey),
    /// A detached node was attached.
    Insert { parent: NodeKey, node: NodeKey },
    /// An attached node was relocated.
    Move { parent: NodeKey, node: NodeKey },
    Remove { parent: NodeKey, node: NodeKey },
    SetText(NodeKey),
}

pub struct Document {
    nodes: RefCell<SlotMap<NodeKey, Node>>,
    root: NodeKey,
    journal: RefCell<Vec<Mutation>>,
}

impl Document {
    pub fn new() -> Rc<Self> {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            kind: Some(NodeKind::Element("#document".to_string())),
            ..Node::default()
        });
        Rc::new(Self {
            nodes: RefCell::new(nodes),
            root,
            journal: RefCell::new(Vec::new()),
        })
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    fn create(&self, kind: NodeKind, text: &str) -> NodeKey {
        let key = self.nodes.borrow_mut().insert(Node {
            kind: Some(kind),
            text: text.to_string(),
            ..Node::default()
        });
        self.record(Mutation::Create(key));
        key
    }

    fn record(&self, m: Mutation) {
        log::trace!("{m:?}");
        self.journal.borrow_mut().push(m);
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.journal.borrow().clone()
    }

    pub fn take_mutations(&self) -> Vec<Mutation> {
        std::mem::take(&mut *self.journal.borrow_mut())
    }

    pub fn contains(&self, node: NodeKey) -> bool {
        self.nodes.borrow().contains_key(node)
    }

    pub fn kind(&self, node: NodeKey) -> Option<NodeKind> {
        self.nodes.borrow().get(node).and_then(|n| n.kind.clone())
    }

    pub fn children(&self, node: NodeKey) -> Vec<NodeKey> {
        self.nodes.borrow().get(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeKey) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeKey, out: &mut String) {
        let (kind, text, children) = {
            let nodes = self.nodes.borrow();
            let Some(n) = nodes.get(node) else { return };
            (n.kind.clone(), n.text.clone(), n.children.clone())
        };
        match kind {
            Some(NodeKind::Text) => out.push_str(&text),
            Some(NodeKind::Comment) | None => {}
            Some(NodeKind::Element(_)) => {
                for c in children {
                    self.collect_text(c, out);
                }
            }
        }
    }

    pub fn attr(&self, node: NodeKey, name: &str) -> Option<String> {
        self.nodes.borrow().get(node).and_then(|n| n.attrs.get(name).cloned())
    }

    pub fn set_attr(&self, node: NodeKey, name: &str, value: &str) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            n.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&self, node: NodeKey, name: &str) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            n.attrs.remove(name);
        }
    }

    pub fn classes(&self, node: NodeKey) -> Vec<String> {
        self.nodes.borrow().get(node).map(|n| n.classes.clone()).unwrap_or_default()
    }

    pub fn set_classes(&self, node: NodeKey, classes: Vec<String>) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            n.classes = classes;
        }
    }

    pub fn style(&self, node: NodeKey) -> BTreeMap<String, String> {
        self.nodes.borrow().get(node).map(|n| n.style.clone()).unwrap_or_default()
    }

    pub fn set_style(&self, node: NodeKey, style: BTreeMap<String, String>) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            n.style = style;
        }
    }

    pub(crate) fn set_listeners(&self, node: NodeKey, layer: usize, listeners: Listeners) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            if listeners.is_empty() {
                n.listeners.remove(&layer);
            } else {
                n.listeners.insert(layer, listeners);
            }
        }
    }

    pub fn has_listener(&self, node: NodeKey, event: &str) -> bool {
        self.nodes
            .borrow()
            .get(node)
            .is_some_and(|n| n.listeners.values().any(|l| l.contains_key(event)))
    }

    /// Fire `event` on `node`: the element's own listeners first, then
    /// those bound through the component placeholders around it. Returns
    /// how many listeners ran.
    pub fn dispatch(&self, node: NodeKey, event: &str, payload: &Value) -> usize {
        let handlers: SmallVec<[Listener; 2]> = {
            let nodes = self.nodes.borrow();
            let Some(n) = nodes.get(node) else { return 0 };
            n.listeners
                .values()
                .filter_map(|l| l.get(event))
                .flat_map(|l| l.iter().cloned())
                .collect()
        };
        for h in &handlers {
            if let Err(p) = catch_unwind(AssertUnwindSafe(|| h(payload))) {
                handle_error(Error::Hook {
                    hook: "event handler",
                    component: format!("<{}>", self.tag(node).unwrap_or_default()),
                    message: format!("{event}: {}", panic_message(&*p)),
                });
            }
        }
        handlers.len()
    }

    pub fn tag(&self, node: NodeKey) -> Option<String> {
        match self.kind(node)? {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    /// First element named `tag` under `from`, depth first.
    pub fn find(&self, from: NodeKey, tag: &str) -> Option<NodeKey> {
        for child in self.children(from) {
            if self.tag(child).as_deref() == Some(tag) {
                return Some(child);
            }
            if let Some(found) = self.find(child, tag) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_all(&self, from: NodeKey, tag: &str) -> Vec<NodeKey> {
        let mut out = Vec::new();
        for child in self.children(from) {
            if self.tag(child).as_deref() == Some(tag) {
                out.push(child);
            }
            out.extend(self.find_all(child, tag));
        }
        out
    }

    /// Markup for everything under the document root.
    pub fn html(&self) -> String {
        self.inner_html(self.root)
    }

    pub fn inner_html(&self, node: NodeKey) -> String {
        let mut out = String::new();
        for c in self.children(node) {
            self.write_html(c, &mut out);
        }
        out
    }

    pub fn to_html(&self, node: NodeKey) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeKey, out: &mut String) {
        let (kind, text, attrs, classes, style) = {
            let nodes = self.nodes.borrow();
            let Some(n) = nodes.get(node) else { return };
            (n.kind.clone(), n.text.clone(), n.attrs.clone(), n.classes.clone(), n.style.clone())
        };
        match kind {
            None => {}
            Some(NodeKind::Text) => out.push_str(&escape(&text)),
            Some(NodeKind::Comment) => {
                let _ = write!(out, "<!--{text}-->");
            }
            Some(NodeKind::Element(tag)) => {
                let _ = write!(out, "<{tag}");
                for (k, v) in &attrs {
                    let _ = write!(out, " {k}=\"{}\"", escape(v));
                }
                if !classes.is_empty() {
                    let _ = write!(out, " class=\"{}\"", escape(&classes.join(" ")));
                }
                if !style.is_empty() {
                    let css: Vec<String> = style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    let _ = write!(out, " style=\"{}\"", escape(&css.join("; ")));
                }
                out.push('>');
                for c in self.children(node) {
                    self.write_html(c, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn detach(&self, node: NodeKey) -> Option<NodeKey> {
        let mut nodes = self.nodes.borrow_mut();
        let parent = nodes.get_mut(node)?.parent.take()?;
        if let Some(p) = nodes.get_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        Some(parent)
    }

    /// Drop `node` and its subtree from the store. Only detached nodes are
    /// freed; returns how many were removed.
    pub fn collect(&self, node: NodeKey) -> usize {
        if self.parent_node(node).is_some() {
            return 0;
        }
        let mut stack = vec![node];
        let mut freed = 0;
        let mut nodes = self.nodes.borrow_mut();
        while let Some(k) = stack.pop() {
            if let Some(n) = nodes.remove(k) {
                stack.extend(n.children);
                freed += 1;
            }
        }
        freed
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

impl NodeOps for Document {
    fn create_element(&self, tag: &str) -> NodeKey {
        self.create(NodeKind::Element(tag.to_string()), "")
    }

    fn create_text_node(&self, text: &str) -> NodeKey {
        self.create(NodeKind::Text, text)
    }

    fn create_comment(&self, text: &str) -> NodeKey {
        self.create(NodeKind::Comment, text)
    }

    fn insert_before(&self, parent: NodeKey, node: NodeKey, reference: Option<NodeKey>) {
        let moved = self.detach(node).is_some();
        {
            let mut nodes = self.nodes.borrow_mut();
            let Some(p) = nodes.get_mut(parent) else {
                log::warn!("insert into a node that no longer exists");
                return;
            };
            let at = reference
                .and_then(|r| p.children.iter().position(|c| *c == r))
                .unwrap_or(p.children.len());
            p.children.insert(at, node);
            if let Some(n) = nodes.get_mut(node) {
                n.parent = Some(parent);
            }
        }
        self.record(if moved {
            Mutation::Move { parent, node }
        } else {
            Mutation::Insert { parent, node }
        });
    }

    fn remove_child(&self, parent: NodeKey, node: NodeKey) {
        if self.detach(node).is_some() {
            self.record(Mutation::Remove { parent, node });
        }
    }

    fn parent_node(&self, node: NodeKey) -> Option<NodeKey> {
        self.nodes.borrow().get(node).and_then(|n| n.parent)
    }

    fn next_sibling(&self, node: NodeKey) -> Option<NodeKey> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(node)?.parent?;
        let siblings = &nodes.get(parent)?.children;
        let i = siblings.iter().position(|c| *c == node)?;
        siblings.get(i + 1).copied()
    }

    fn tag_name(&self, node: NodeKey) -> Option<String> {
        self.tag(node)
    }

    fn set_text_content(&self, node: NodeKey, text: &str) {
        let is_element = matches!(self.kind(node), Some(NodeKind::Element(_)));
        if is_element {
            let children = self.children(node);
            for c in children {
                self.detach(c);
            }
            if !text.is_empty() {
                // Part of this one mutation; not journaled separately.
                let mut nodes = self.nodes.borrow_mut();
                let t = nodes.insert(Node {
                    kind: Some(NodeKind::Text),
                    text: text.to_string(),
                    parent: Some(node),
                    ..Node::default()
                });
                if let Some(p) = nodes.get_mut(node) {
                    p.children.push(t);
                }
            }
        } else if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            n.text = text.to_string();
        }
        self.record(Mutation::SetText(node));
    }
}
