//! App runner for the in-memory document.

use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Context, bail};
use revue_core::{Value, flush_ticks};
use revue_vdom::{Component, Constructor, InitOptions, NodeKey, NodeOps, Patcher};

use crate::document::Document;
use crate::modules;

/// A document plus the patcher wired to it. Root components mounted
/// through it stay alive until [`unmount`](Self::unmount) or drop.
pub struct App {
    doc: Rc<Document>,
    patcher: Rc<Patcher>,
    roots: Vec<Component>,
}

impl App {
    pub fn new() -> Self {
        let doc = Document::new();
        let patcher = Patcher::new(doc.clone(), modules::standard(&doc));
        Self {
            doc,
            patcher,
            roots: Vec::new(),
        }
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.doc
    }

    pub fn patcher(&self) -> &Rc<Patcher> {
        &self.patcher
    }

    pub fn roots(&self) -> &[Component] {
        &self.roots
    }

    /// Create a root instance of `ctor` and mount it in place of `target`,
    /// or of a fresh `<div>` appended to the document root.
    pub fn mount(
        &mut self,
        ctor: &Constructor,
        props: BTreeMap<String, Value>,
        target: Option<NodeKey>,
    ) -> anyhow::Result<Component> {
        let target = match target {
            Some(t) => {
                if !self.doc.contains(t) {
                    bail!("mount target {t:?} is not in the document");
                }
                t
            }
            None => {
                let el = self.doc.create_element("div");
                self.doc.append_child(self.doc.root(), el);
                el
            }
        };
        let vm = Component::new(ctor, InitOptions::root(self.patcher.clone()).props(props));
        vm.mount(Some(target));
        let el = vm.el().with_context(|| format!("{} rendered no node", vm.name()))?;
        log::debug!("mounted {} at {el:?}", vm.name());
        self.roots.push(vm.clone());
        Ok(vm)
    }

    /// Destroy a root instance and detach its node.
    pub fn unmount(&mut self, vm: &Component) {
        self.roots.retain(|r| !r.ptr_eq(vm));
        let el = vm.el();
        vm.destroy();
        if let Some(el) = el
            && let Some(parent) = self.doc.parent_node(el)
        {
            self.doc.remove_child(parent, el);
        }
    }

    /// Run queued updates and next-tick callbacks until none are left.
    pub fn tick(&self) -> usize {
        flush_ticks()
    }

    pub fn html(&self) -> String {
        self.doc.html()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for vm in std::mem::take(&mut self.roots) {
            vm.destroy();
        }
    }
}
