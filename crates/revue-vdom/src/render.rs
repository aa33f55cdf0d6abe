use std::fmt::Display;
use std::rc::Rc;

use revue_core::Value;

use crate::component::Component;
use crate::options::Constructor;
use crate::vnode::{VNode, VNodeBuilder};

/// What a render function hands back.
pub enum RenderOutput {
    Node(VNode),
    /// Must hold exactly one node to be a valid root.
    Nodes(Vec<VNode>),
    Empty,
    /// The render failed; the message is reported and a fallback is used.
    Failed(String),
}

impl From<VNode> for RenderOutput {
    fn from(v: VNode) -> Self {
        RenderOutput::Node(v)
    }
}

impl From<VNodeBuilder> for RenderOutput {
    fn from(b: VNodeBuilder) -> Self {
        RenderOutput::Node(b.build())
    }
}

impl From<Vec<VNode>> for RenderOutput {
    fn from(nodes: Vec<VNode>) -> Self {
        RenderOutput::Nodes(nodes)
    }
}

impl<T: Into<RenderOutput>> From<Option<T>> for RenderOutput {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RenderOutput::Empty)
    }
}

impl<T: Into<RenderOutput>, E: Display> From<Result<T, E>> for RenderOutput {
    fn from(r: Result<T, E>) -> Self {
        match r {
            Ok(v) => v.into(),
            Err(e) => RenderOutput::Failed(e.to_string()),
        }
    }
}

/// Handed to render functions. Reads through it are tracked, and nodes it
/// builds are stamped with the rendering instance as their context.
pub struct RenderCx<'a> {
    vm: &'a Component,
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(vm: &'a Component) -> Self {
        Self { vm }
    }

    pub fn vm(&self) -> &Component {
        self.vm
    }

    pub fn get(&self, key: &str) -> Value {
        self.vm.get(key)
    }

    pub fn get_path(&self, path: &str) -> Value {
        self.vm.get_path(path)
    }

    /// An element, or a component placeholder when `tag` names a component
    /// visible from this instance.
    pub fn h(&self, tag: impl Into<String>) -> VNodeBuilder {
        let tag = tag.into();
        let builder = match self.vm.ctor().resolve(&tag) {
            Some(ctor) => VNodeBuilder::new(tag).ctor(ctor),
            None => VNodeBuilder::new(tag),
        };
        builder.context(Some(self.vm.downgrade()))
    }

    pub fn component(&self, ctor: &Constructor) -> VNodeBuilder {
        VNodeBuilder::new(ctor.name().unwrap_or("anonymous"))
            .ctor(ctor.clone())
            .context(Some(self.vm.downgrade()))
    }

    pub fn text(&self, text: impl Into<String>) -> VNode {
        VNode::text(text)
    }

    pub fn empty(&self) -> VNode {
        VNode::empty("")
    }

    /// Nodes passed for slot `name` by the parent.
    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.vm.slot(name)
    }

    /// A listener that re-emits its payload as `event` on this instance.
    pub fn emit_handler(&self, event: impl Into<String>) -> impl Fn(&Value) + 'static {
        let weak = self.vm.downgrade();
        let event: Rc<str> = Rc::from(event.into());
        move |payload| {
            if let Some(vm) = weak.upgrade() {
                vm.emit(&event, payload);
            }
        }
    }
}
