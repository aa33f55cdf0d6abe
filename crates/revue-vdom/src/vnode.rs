use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use revue_core::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use smallvec::SmallVec;

use crate::component::{Component, WeakComponent};
use crate::node_ops::NodeKey;
use crate::options::Constructor;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VNodeFlags: u8 {
        const COMMENT = 1 << 0;
        /// Shallow or deep copy of another vnode.
        const CLONED = 1 << 1;
        /// Subtree never changes between renders.
        const STATIC = 1 << 2;
        /// Rendered once, then reused as is.
        const ONCE = 1 << 3;
        /// Stand-in comment for a component that has not resolved yet.
        const ASYNC_PLACEHOLDER = 1 << 4;
        /// Component placeholder whose instance is retained by a keep-alive.
        const KEEP_ALIVE = 1 << 5;
        /// Created at the top of a patch rather than nested under a parent.
        const ROOT_INSERT = 1 << 6;
    }
}

/// Identity hint for keyed reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}
impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}
impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}
impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i as i64)
    }
}
impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i as i64)
    }
}

pub type Listener = Rc<dyn Fn(&Value)>;
pub type Listeners = BTreeMap<String, SmallVec<[Listener; 1]>>;
pub type VNodeHook = Rc<dyn Fn(&VNode)>;
pub type VNodePairHook = Rc<dyn Fn(&VNode, &VNode)>;

/// User hooks on a vnode, fired by the patch engine after the built-in ones.
#[derive(Clone, Default)]
pub struct VNodeHooks {
    pub create: Option<VNodeHook>,
    pub insert: Option<VNodeHook>,
    pub prepatch: Option<VNodePairHook>,
    pub update: Option<VNodePairHook>,
    pub postpatch: Option<VNodePairHook>,
    pub destroy: Option<VNodeHook>,
}

/// Everything on a vnode besides structure. Opaque to the patch engine; the
/// platform modules interpret it.
#[derive(Clone, Default)]
pub struct VNodeData {
    pub attrs: BTreeMap<String, String>,
    pub class: SmallVec<[String; 2]>,
    pub style: BTreeMap<String, String>,
    pub on: Listeners,
    /// On a component placeholder: listeners bound to its root element.
    pub native_on: Listeners,
    /// Values for a component's declared props.
    pub props: BTreeMap<String, Value>,
    /// Named slot this node fills in its parent component.
    pub slot: Option<String>,
    pub hook: VNodeHooks,
}

/// What a component placeholder carries for the component it stands in for.
#[derive(Clone)]
pub struct ComponentOptions {
    pub ctor: Constructor,
    pub props_data: BTreeMap<String, Value>,
    pub listeners: Listeners,
    pub tag: String,
    /// Children written between the component's tags; they belong to the
    /// parent's scope and become the instance's slots.
    pub children: Option<Rc<[VNode]>>,
}

pub struct VNodeInner {
    tag: Option<String>,
    data: Option<VNodeData>,
    children: RefCell<Option<Rc<[VNode]>>>,
    text: Option<String>,
    key: Option<Key>,
    flags: Cell<VNodeFlags>,
    elm: Cell<Option<NodeKey>>,
    context: Option<WeakComponent>,
    component_options: Option<ComponentOptions>,
    component_instance: RefCell<Option<WeakComponent>>,
    // Only for placeholders patched outside any instance.
    owned_instance: RefCell<Option<Component>>,
    parent: RefCell<Option<WeakVNode>>,
    pending_insert: RefCell<Option<Vec<VNode>>>,
}

/// One node of desired UI.
///
/// Cheap to clone: clones share the node. Use [`clone_node`](Self::clone_node)
/// for an independent copy.
#[derive(Clone)]
pub struct VNode(Rc<VNodeInner>);

#[derive(Clone, Default)]
pub struct WeakVNode(Weak<VNodeInner>);

impl WeakVNode {
    pub fn upgrade(&self) -> Option<VNode> {
        self.0.upgrade().map(VNode)
    }
}

impl VNode {
    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        tag: Option<String>,
        data: Option<VNodeData>,
        children: Option<Rc<[VNode]>>,
        text: Option<String>,
        key: Option<Key>,
        flags: VNodeFlags,
        context: Option<WeakComponent>,
        component_options: Option<ComponentOptions>,
    ) -> Self {
        Self(Rc::new(VNodeInner {
            tag,
            data,
            children: RefCell::new(children),
            text,
            key,
            flags: Cell::new(flags),
            elm: Cell::new(None),
            context,
            component_options,
            component_instance: RefCell::new(None),
            owned_instance: RefCell::new(None),
            parent: RefCell::new(None),
            pending_insert: RefCell::new(None),
        }))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_parts(None, None, None, Some(text.into()), None, VNodeFlags::empty(), None, None)
    }

    /// Comment node, used wherever "nothing" has to occupy a position.
    pub fn empty(text: impl Into<String>) -> Self {
        Self::from_parts(None, None, None, Some(text.into()), None, VNodeFlags::COMMENT, None, None)
    }

    /// Stand-in for an existing external element, e.g. a mount point.
    pub(crate) fn at_element(tag: String, elm: NodeKey) -> Self {
        let v = Self::from_parts(
            Some(tag),
            Some(VNodeData::default()),
            None,
            None,
            None,
            VNodeFlags::empty(),
            None,
            None,
        );
        v.set_elm(Some(elm));
        v
    }

    /// The "old" side handed to module `create` calls.
    pub(crate) fn blank() -> Self {
        Self::from_parts(
            Some(String::new()),
            Some(VNodeData::default()),
            None,
            None,
            None,
            VNodeFlags::empty(),
            None,
            None,
        )
    }

    pub fn tag(&self) -> Option<&str> {
        self.0.tag.as_deref()
    }

    pub fn data(&self) -> Option<&VNodeData> {
        self.0.data.as_ref()
    }

    pub fn children(&self) -> Option<Rc<[VNode]>> {
        self.0.children.borrow().clone()
    }

    pub(crate) fn set_children(&self, children: Option<Rc<[VNode]>>) {
        *self.0.children.borrow_mut() = children;
    }

    pub fn text_content(&self) -> Option<&str> {
        self.0.text.as_deref()
    }

    pub fn key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    pub fn flags(&self) -> VNodeFlags {
        self.0.flags.get()
    }

    pub fn has_flag(&self, flag: VNodeFlags) -> bool {
        self.0.flags.get().contains(flag)
    }

    pub fn set_flag(&self, flag: VNodeFlags, on: bool) {
        let mut flags = self.0.flags.get();
        flags.set(flag, on);
        self.0.flags.set(flags);
    }

    pub fn is_comment(&self) -> bool {
        self.has_flag(VNodeFlags::COMMENT)
    }

    pub fn elm(&self) -> Option<NodeKey> {
        self.0.elm.get()
    }

    pub(crate) fn set_elm(&self, elm: Option<NodeKey>) {
        self.0.elm.set(elm);
    }

    /// The component whose render produced this node.
    pub fn context(&self) -> Option<Component> {
        self.0.context.as_ref().and_then(WeakComponent::upgrade)
    }

    pub(crate) fn context_handle(&self) -> Option<&WeakComponent> {
        self.0.context.as_ref()
    }

    pub fn component_options(&self) -> Option<&ComponentOptions> {
        self.0.component_options.as_ref()
    }

    pub fn is_component(&self) -> bool {
        self.0.component_options.is_some()
    }

    pub fn component_instance(&self) -> Option<Component> {
        if let Some(owned) = self.0.owned_instance.borrow().as_ref() {
            return Some(owned.clone());
        }
        self.0.component_instance.borrow().as_ref().and_then(WeakComponent::upgrade)
    }

    pub fn set_component_instance(&self, instance: Option<&Component>) {
        *self.0.owned_instance.borrow_mut() = None;
        *self.0.component_instance.borrow_mut() = instance.map(Component::downgrade);
    }

    /// Keep `instance` alive through this placeholder; used when nothing
    /// else owns it.
    pub(crate) fn adopt_instance(&self, instance: Component) {
        *self.0.component_instance.borrow_mut() = Some(instance.downgrade());
        *self.0.owned_instance.borrow_mut() = Some(instance);
    }

    /// For a component's root node: the placeholder standing for the
    /// component in its parent's tree.
    pub fn parent(&self) -> Option<VNode> {
        self.0.parent.borrow().as_ref().and_then(WeakVNode::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: Option<&VNode>) {
        *self.0.parent.borrow_mut() = parent.map(VNode::downgrade);
    }

    pub(crate) fn take_pending_insert(&self) -> Option<Vec<VNode>> {
        self.0.pending_insert.borrow_mut().take()
    }

    pub(crate) fn set_pending_insert(&self, queue: Vec<VNode>) {
        *self.0.pending_insert.borrow_mut() = Some(queue);
    }

    pub fn downgrade(&self) -> WeakVNode {
        WeakVNode(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Copy this node. The copy keeps the external-node reference but not
    /// the component instance; `deep` copies the children too.
    pub fn clone_node(&self, deep: bool) -> VNode {
        let children = self.children().map(|ch| {
            if deep {
                ch.iter().map(|c| c.clone_node(true)).collect::<Rc<[VNode]>>()
            } else {
                ch
            }
        });
        let component_options = self.0.component_options.as_ref().map(|opts| {
            let mut opts = opts.clone();
            if deep {
                opts.children = opts
                    .children
                    .map(|ch| ch.iter().map(|c| c.clone_node(true)).collect::<Rc<[VNode]>>());
            }
            opts
        });
        let cloned = Self::from_parts(
            self.0.tag.clone(),
            self.0.data.clone(),
            children,
            self.0.text.clone(),
            self.0.key.clone(),
            self.flags() | VNodeFlags::CLONED,
            self.0.context.clone(),
            component_options,
        );
        cloned.set_elm(self.elm());
        cloned
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("tag", &self.0.tag)
            .field("key", &self.0.key)
            .field("text", &self.0.text)
            .field("flags", &self.flags())
            .field("elm", &self.elm())
            .field("children", &self.children().map(|c| c.len()).unwrap_or(0))
            .finish()
    }
}

impl Serialize for VNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(tag) = self.tag() {
            map.serialize_entry("tag", tag)?;
        }
        if let Some(key) = self.key() {
            map.serialize_entry("key", key)?;
        }
        if let Some(text) = self.text_content() {
            map.serialize_entry("text", text)?;
        }
        if self.is_comment() {
            map.serialize_entry("comment", &true)?;
        }
        if let Some(data) = self.data() {
            if !data.attrs.is_empty() {
                map.serialize_entry("attrs", &data.attrs)?;
            }
            if !data.class.is_empty() {
                map.serialize_entry("class", data.class.as_slice())?;
            }
            if !data.style.is_empty() {
                map.serialize_entry("style", &data.style)?;
            }
            if !data.on.is_empty() {
                map.serialize_entry("on", &data.on.keys().collect::<Vec<_>>())?;
            }
        }
        if let Some(opts) = self.component_options() {
            map.serialize_entry("component", &opts.tag)?;
            let props: BTreeMap<&String, serde_json::Value> =
                opts.props_data.iter().map(|(k, v)| (k, v.to_json())).collect();
            if !props.is_empty() {
                map.serialize_entry("props", &props)?;
            }
        }
        if let Some(children) = self.children() {
            map.serialize_entry("children", &*children)?;
        }
        map.end()
    }
}

/// Reusable in place: same key, same tag, same kind.
pub fn same_vnode(a: &VNode, b: &VNode) -> bool {
    a.key() == b.key()
        && a.tag() == b.tag()
        && a.is_comment() == b.is_comment()
        && a.has_flag(VNodeFlags::ASYNC_PLACEHOLDER) == b.has_flag(VNodeFlags::ASYNC_PLACEHOLDER)
        && same_input_type(a, b)
}

fn same_input_type(a: &VNode, b: &VNode) -> bool {
    if a.tag() != Some("input") {
        return true;
    }
    let ty = |v: &VNode| v.data().and_then(|d| d.attrs.get("type").cloned());
    ty(a) == ty(b)
}

/// First component placeholder among `children`.
pub fn first_component_child(children: &[VNode]) -> Option<VNode> {
    children.iter().find(|c| c.is_component()).cloned()
}

pub(crate) fn is_whitespace(vnode: &VNode) -> bool {
    (vnode.is_comment() && !vnode.has_flag(VNodeFlags::ASYNC_PLACEHOLDER))
        || (vnode.tag().is_none()
            && vnode.text_content().is_some_and(|t| t.trim().is_empty()))
}

/// Start an element vnode with no render context.
pub fn h(tag: impl Into<String>) -> VNodeBuilder {
    VNodeBuilder::new(tag)
}

/// Start a component placeholder with no render context.
pub fn component(ctor: &Constructor) -> VNodeBuilder {
    VNodeBuilder::new(ctor.name().unwrap_or("anonymous")).ctor(ctor.clone())
}

pub struct VNodeBuilder {
    tag: String,
    key: Option<Key>,
    data: VNodeData,
    has_data: bool,
    children: Vec<VNode>,
    text: Option<String>,
    flags: VNodeFlags,
    context: Option<WeakComponent>,
    ctor: Option<Constructor>,
}

impl VNodeBuilder {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            data: VNodeData::default(),
            has_data: false,
            children: Vec::new(),
            text: None,
            flags: VNodeFlags::empty(),
            context: None,
            ctor: None,
        }
    }

    pub(crate) fn context(mut self, context: Option<WeakComponent>) -> Self {
        self.context = context;
        self
    }

    pub(crate) fn ctor(mut self, ctor: Constructor) -> Self {
        self.ctor = Some(ctor);
        self.has_data = true;
        self
    }

    fn data_mut(&mut self) -> &mut VNodeData {
        self.has_data = true;
        &mut self.data
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self.has_data = true;
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data_mut().attrs.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.data_mut().class.push(class.into());
        self
    }

    pub fn class_if(self, class: impl Into<String>, on: bool) -> Self {
        if on { self.class(class) } else { self }
    }

    pub fn style(mut self, prop: impl Into<String>, value: impl Into<String>) -> Self {
        self.data_mut().style.insert(prop.into(), value.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, f: impl Fn(&Value) + 'static) -> Self {
        self.data_mut().on.entry(event.into()).or_default().push(Rc::new(f));
        self
    }

    pub fn native_on(mut self, event: impl Into<String>, f: impl Fn(&Value) + 'static) -> Self {
        self.data_mut().native_on.entry(event.into()).or_default().push(Rc::new(f));
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data_mut().props.insert(name.into(), value.into());
        self
    }

    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.data_mut().slot = Some(name.into());
        self
    }

    pub fn hook_create(mut self, f: impl Fn(&VNode) + 'static) -> Self {
        self.data_mut().hook.create = Some(Rc::new(f));
        self
    }

    pub fn hook_insert(mut self, f: impl Fn(&VNode) + 'static) -> Self {
        self.data_mut().hook.insert = Some(Rc::new(f));
        self
    }

    pub fn hook_prepatch(mut self, f: impl Fn(&VNode, &VNode) + 'static) -> Self {
        self.data_mut().hook.prepatch = Some(Rc::new(f));
        self
    }

    pub fn hook_update(mut self, f: impl Fn(&VNode, &VNode) + 'static) -> Self {
        self.data_mut().hook.update = Some(Rc::new(f));
        self
    }

    pub fn hook_postpatch(mut self, f: impl Fn(&VNode, &VNode) + 'static) -> Self {
        self.data_mut().hook.postpatch = Some(Rc::new(f));
        self
    }

    pub fn hook_destroy(mut self, f: impl Fn(&VNode) + 'static) -> Self {
        self.data_mut().hook.destroy = Some(Rc::new(f));
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Element text; replaces any children.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn mark_static(mut self) -> Self {
        self.flags |= VNodeFlags::STATIC;
        self
    }

    pub fn once(mut self) -> Self {
        self.flags |= VNodeFlags::STATIC | VNodeFlags::ONCE;
        self
    }

    pub fn build(self) -> VNode {
        match self.ctor.clone() {
            Some(ctor) => self.build_component(ctor),
            None => {
                let children = if self.text.is_some() || self.children.is_empty() {
                    None
                } else {
                    Some(Rc::from(self.children))
                };
                VNode::from_parts(
                    Some(self.tag),
                    self.has_data.then_some(self.data),
                    children,
                    self.text,
                    self.key,
                    self.flags,
                    self.context,
                    None,
                )
            }
        }
    }

    fn build_component(self, ctor: Constructor) -> VNode {
        let mut data = self.data;
        let mut props_data = BTreeMap::new();
        for name in ctor.options().props.keys() {
            if let Some(v) = data.props.get(name) {
                props_data.insert(name.clone(), v.clone());
            } else if let Some(v) = data.attrs.remove(name) {
                props_data.insert(name.clone(), Value::from(v));
            }
        }
        let listeners = std::mem::take(&mut data.on);
        data.on = std::mem::take(&mut data.native_on);
        if ctor.options().is_abstract {
            data = VNodeData {
                slot: data.slot.take(),
                ..VNodeData::default()
            };
        }
        let name = ctor.name().unwrap_or(&self.tag).to_string();
        let tag = format!("revue-component-{}-{}", ctor.cid(), name);
        let children = (!self.children.is_empty()).then(|| Rc::from(self.children));
        VNode::from_parts(
            Some(tag),
            Some(data),
            None,
            None,
            self.key,
            self.flags,
            self.context,
            Some(ComponentOptions {
                ctor,
                props_data,
                listeners,
                tag: self.tag,
                children,
            }),
        )
    }
}

impl From<VNodeBuilder> for VNode {
    fn from(b: VNodeBuilder) -> Self {
        b.build()
    }
}

impl From<&str> for VNode {
    fn from(s: &str) -> Self {
        VNode::text(s)
    }
}

impl From<String> for VNode {
    fn from(s: String) -> Self {
        VNode::text(s)
    }
}
