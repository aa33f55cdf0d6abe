//! Data modules: apply a vnode's attributes, classes, styles and listeners
//! to its [`Document`] node.
//!
//! A component's root element shares its node with every placeholder
//! stacked above it, so classes and styles are merged along that chain and
//! listeners are kept in one layer per vnode.

use std::collections::BTreeMap;
use std::rc::Rc;

use revue_vdom::{Module, VNode};

use crate::document::Document;

/// The standard module set, in the order the patch engine should run them.
pub fn standard(doc: &Rc<Document>) -> Vec<Rc<dyn Module>> {
    vec![
        Rc::new(Attrs(doc.clone())),
        Rc::new(Class(doc.clone())),
        Rc::new(Style(doc.clone())),
        Rc::new(Events(doc.clone())),
    ]
}

pub struct Attrs(pub Rc<Document>);

impl Module for Attrs {
    fn create(&self, empty: &VNode, vnode: &VNode) {
        self.update(empty, vnode);
    }

    fn update(&self, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else { return };
        let empty = BTreeMap::new();
        let old_attrs = old.data().map(|d| &d.attrs).unwrap_or(&empty);
        let attrs = vnode.data().map(|d| &d.attrs).unwrap_or(&empty);
        for (k, v) in attrs {
            if old_attrs.get(k) != Some(v) || self.0.attr(elm, k).as_ref() != Some(v) {
                self.0.set_attr(elm, k, v);
            }
        }
        for k in old_attrs.keys() {
            if !attrs.contains_key(k) {
                self.0.remove_attr(elm, k);
            }
        }
    }
}

pub struct Class(pub Rc<Document>);

impl Class {
    fn apply(&self, vnode: &VNode) {
        let Some(elm) = vnode.elm() else { return };
        let classes = merged_classes(vnode);
        if self.0.classes(elm) != classes {
            self.0.set_classes(elm, classes);
        }
    }
}

impl Module for Class {
    fn create(&self, _empty: &VNode, vnode: &VNode) {
        self.apply(vnode);
    }

    fn update(&self, _old: &VNode, vnode: &VNode) {
        self.apply(vnode);
    }
}

/// Classes from the innermost component root outwards, without repeats.
fn merged_classes(vnode: &VNode) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |v: &VNode| {
        if let Some(d) = v.data() {
            for c in &d.class {
                if !out.contains(c) {
                    out.push(c.clone());
                }
            }
        }
    };
    for v in root_chain(vnode).iter().rev() {
        push(v);
    }
    let mut up = vnode.parent();
    while let Some(p) = up {
        push(&p);
        up = p.parent();
    }
    out
}

pub struct Style(pub Rc<Document>);

impl Style {
    fn apply(&self, vnode: &VNode) {
        let Some(elm) = vnode.elm() else { return };
        // Outer placeholders win over the component's own root.
        let mut style = BTreeMap::new();
        for v in root_chain(vnode).iter().rev() {
            if let Some(d) = v.data() {
                style.extend(d.style.clone());
            }
        }
        let mut up = vnode.parent();
        while let Some(p) = up {
            if let Some(d) = p.data() {
                style.extend(d.style.clone());
            }
            up = p.parent();
        }
        if self.0.style(elm) != style {
            self.0.set_style(elm, style);
        }
    }
}

impl Module for Style {
    fn create(&self, _empty: &VNode, vnode: &VNode) {
        self.apply(vnode);
    }

    fn update(&self, _old: &VNode, vnode: &VNode) {
        self.apply(vnode);
    }
}

pub struct Events(pub Rc<Document>);

impl Module for Events {
    fn create(&self, empty: &VNode, vnode: &VNode) {
        self.update(empty, vnode);
    }

    fn update(&self, _old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else { return };
        let on = vnode.data().map(|d| d.on.clone()).unwrap_or_default();
        self.0.set_listeners(elm, layer(vnode), on);
    }

    fn destroy(&self, vnode: &VNode) {
        if let Some(elm) = vnode.elm() {
            self.0.set_listeners(elm, layer(vnode), Default::default());
        }
    }
}

/// `vnode` followed by the root trees of the components it stands for.
fn root_chain(vnode: &VNode) -> Vec<VNode> {
    let mut chain = vec![vnode.clone()];
    let mut cur = vnode.clone();
    while let Some(root) = cur.component_instance().and_then(|vm| vm.root_vnode()) {
        chain.push(root.clone());
        cur = root;
    }
    chain
}

/// How many component boundaries sit between `vnode` and the element.
fn layer(vnode: &VNode) -> usize {
    root_chain(vnode).len() - 1
}
