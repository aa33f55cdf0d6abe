//! Component instances.
//!
//! An instance owns its reactive state, its watchers and the vnode tree it
//! last rendered. Upward links (parent instance, placeholder vnode, render
//! context) are weak; each instance is held by its parent's child list, or
//! by whoever mounted it at the root.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use revue_core::config::measure;
use revue_core::{
    Computed, Error, ReactiveObject, Value, Watcher, WatcherOptions, handle_error, observe,
    panic_message, untracked, watch,
};

use crate::error::{UsageError, report};
use crate::lifecycle::{call_hook, resolve_slots};
use crate::node_ops::NodeKey;
use crate::options::{Config, Constructor, LifecycleHook};
use crate::patch::{OldTree, Patcher};
use crate::render::{RenderCx, RenderOutput};
use crate::vnode::{Listeners, VNode, WeakVNode};

thread_local! {
    static NEXT_UID: Cell<u64> = const { Cell::new(0) };
}

pub(crate) struct ComponentInner {
    uid: u64,
    ctor: Constructor,
    pub(crate) patcher: Rc<Patcher>,
    parent: Option<WeakComponent>,
    pub(crate) children: RefCell<Vec<Component>>,
    state: ReactiveObject,
    props: ReactiveObject,
    pub(crate) props_data: RefCell<BTreeMap<String, Value>>,
    computed: RefCell<BTreeMap<String, Computed>>,
    watchers: RefCell<Vec<Watcher>>,
    render_watcher: RefCell<Option<Watcher>>,
    vnode: RefCell<Option<VNode>>,
    pub(crate) parent_vnode: RefCell<Option<WeakVNode>>,
    el: Cell<Option<NodeKey>>,
    pub(crate) slots: RefCell<BTreeMap<String, Vec<VNode>>>,
    pub(crate) render_children: RefCell<Option<Rc<[VNode]>>>,
    pub(crate) parent_listeners: RefCell<Listeners>,
    own_listeners: RefCell<Listeners>,
    local: RefCell<Option<Rc<dyn Any>>>,
    pub(crate) is_mounted: Cell<bool>,
    is_destroyed: Cell<bool>,
    being_destroyed: Cell<bool>,
    // None until first (de)activated.
    pub(crate) inactive: Cell<Option<bool>>,
    pub(crate) direct_inactive: Cell<bool>,
}

#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

#[derive(Clone)]
pub struct WeakComponent(Weak<ComponentInner>);

impl WeakComponent {
    pub fn upgrade(&self) -> Option<Component> {
        self.0.upgrade().map(Component)
    }

    pub fn ptr_eq(&self, other: &WeakComponent) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

/// Everything needed to build an instance.
pub struct InitOptions {
    pub parent: Option<Component>,
    /// The placeholder this instance stands behind, if rendered by a parent.
    pub parent_vnode: Option<VNode>,
    pub props_data: BTreeMap<String, Value>,
    pub patcher: Rc<Patcher>,
}

impl InitOptions {
    pub fn root(patcher: Rc<Patcher>) -> Self {
        Self {
            parent: None,
            parent_vnode: None,
            props_data: BTreeMap::new(),
            patcher,
        }
    }

    pub fn props(mut self, props: BTreeMap<String, Value>) -> Self {
        self.props_data = props;
        self
    }
}

impl Component {
    /// Create and initialize an instance: link it into the tree, then set up
    /// props, state, computed values and watchers. Not mounted yet.
    pub fn new(ctor: &Constructor, init: InitOptions) -> Component {
        untracked(|| Self::create(ctor, init))
    }

    fn create(ctor: &Constructor, init: InitOptions) -> Component {
        let uid = NEXT_UID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        let options = ctor.options();

        // First non-abstract ancestor, unless this one is abstract itself.
        let mut parent = init.parent;
        if !options.is_abstract {
            while let Some(p) = parent.clone() {
                match p.parent() {
                    Some(up) if p.options().is_abstract => parent = Some(up),
                    _ => break,
                }
            }
        }

        let state = ReactiveObject::new();
        observe(&Value::Object(state.clone()));
        let props = ReactiveObject::new();
        observe(&Value::Object(props.clone()));

        let (listeners, render_children) = match init.parent_vnode.as_ref().and_then(VNode::component_options) {
            Some(opts) => (opts.listeners.clone(), opts.children.clone()),
            None => (Listeners::new(), None),
        };
        let slots = resolve_slots(
            render_children.as_deref(),
            init.parent_vnode.as_ref().and_then(VNode::context_handle),
        );

        let vm = Component(Rc::new(ComponentInner {
            uid,
            ctor: ctor.clone(),
            patcher: init.patcher,
            parent: parent.as_ref().map(Component::downgrade),
            children: RefCell::new(Vec::new()),
            state,
            props,
            props_data: RefCell::new(init.props_data.clone()),
            computed: RefCell::new(BTreeMap::new()),
            watchers: RefCell::new(Vec::new()),
            render_watcher: RefCell::new(None),
            vnode: RefCell::new(None),
            parent_vnode: RefCell::new(init.parent_vnode.as_ref().map(VNode::downgrade)),
            el: Cell::new(None),
            slots: RefCell::new(slots),
            render_children: RefCell::new(render_children),
            parent_listeners: RefCell::new(listeners),
            own_listeners: RefCell::new(Listeners::new()),
            local: RefCell::new(None),
            is_mounted: Cell::new(false),
            is_destroyed: Cell::new(false),
            being_destroyed: Cell::new(false),
            inactive: Cell::new(None),
            direct_inactive: Cell::new(false),
        }));
        if let Some(p) = &parent {
            p.0.children.borrow_mut().push(vm.clone());
        }
        log::trace!("created {} (uid {uid})", vm.name());

        call_hook(&vm, LifecycleHook::BeforeCreate);
        vm.init_props(&init.props_data);
        vm.init_data();
        vm.init_computed();
        vm.init_watch();
        call_hook(&vm, LifecycleHook::Created);
        vm
    }

    fn init_props(&self, props_data: &BTreeMap<String, Value>) {
        for (key, def) in &self.options().props {
            let value = match props_data.get(key) {
                Some(v) => v.clone(),
                None => {
                    if def.required {
                        report(UsageError::MissingProp {
                            component: self.name().to_string(),
                            prop: key.clone(),
                        });
                    }
                    def.default_value()
                }
            };
            self.0.props.define_reactive(key.clone(), value);
        }
    }

    fn init_data(&self) {
        let Some(factory) = self.options().data.clone() else {
            return;
        };
        let data = match catch_unwind(AssertUnwindSafe(|| factory(self))) {
            Ok(data) => data,
            Err(p) => {
                handle_error(Error::Hook {
                    hook: "data",
                    component: self.name().to_string(),
                    message: panic_message(&*p),
                });
                return;
            }
        };
        let Some(obj) = data.as_object() else {
            report(UsageError::DataNotObject {
                component: self.name().to_string(),
                found: format!("{data:?}"),
            });
            return;
        };
        for key in obj.keys() {
            if self.options().props.contains_key(&key) {
                log::warn!("data key `{key}` of {} shadows a prop", self.name());
            }
            let value = obj.peek(&key).unwrap_or(Value::Null);
            self.0.state.define_reactive(key, value);
        }
    }

    fn init_computed(&self) {
        let defs = self.options().computed.clone();
        for (key, f) in defs {
            let weak = self.downgrade();
            let computed = Computed::labeled(format!("{}.{key}", self.name()), move || {
                weak.upgrade().map(|vm| f(&vm)).unwrap_or(Value::Null)
            });
            self.0.watchers.borrow_mut().push(computed.watcher().clone());
            self.0.computed.borrow_mut().insert(key, computed);
        }
    }

    fn init_watch(&self) {
        let defs = self.options().watch.clone();
        for (path, handlers) in defs {
            for def in handlers {
                let handler = def.handler.clone();
                let mut options = WatcherOptions::default().label(format!("{}:{path}", self.name()));
                options.deep = def.deep;
                options.immediate = def.immediate;
                self.watch_with(&path, move |vm, new, old| handler(vm, new, old), options);
            }
        }
    }

    /// Watch a dotted path on this instance; the watcher is torn down with it.
    pub fn watch(&self, path: &str, f: impl Fn(&Component, &Value, &Value) + 'static) -> Watcher {
        self.watch_with(path, f, WatcherOptions::default().label(path))
    }

    pub fn watch_with(
        &self,
        path: &str,
        f: impl Fn(&Component, &Value, &Value) + 'static,
        options: WatcherOptions,
    ) -> Watcher {
        let getter_vm = self.downgrade();
        let cb_vm = self.downgrade();
        let path = path.to_string();
        let w = watch(
            move || getter_vm.upgrade().map(|vm| vm.get_path(&path)).unwrap_or(Value::Null),
            move |new, old| {
                if let Some(vm) = cb_vm.upgrade() {
                    f(&vm, new, old);
                }
            },
            options,
        );
        self.0.watchers.borrow_mut().push(w.clone());
        w
    }

    /// Mount: create the render watcher, whose first run renders and patches.
    /// `el` is replaced by the rendered root when given.
    pub fn mount(&self, el: Option<NodeKey>) -> &Self {
        self.0.el.set(el);
        if self.options().render.is_none() {
            report(UsageError::NoRender {
                component: self.name().to_string(),
            });
        }
        call_hook(self, LifecycleHook::BeforeMount);

        let run = self.downgrade();
        let before = self.downgrade();
        let updated = self.downgrade();
        let watcher = Watcher::unstarted(
            move || {
                if let Some(vm) = run.upgrade() {
                    vm.update_component();
                }
                Value::Null
            },
            None,
            WatcherOptions::default()
                .label(format!("render:{}", self.name()))
                .before(move || {
                    if let Some(vm) = before.upgrade()
                        && vm.is_mounted()
                        && !vm.is_destroyed()
                    {
                        call_hook(&vm, LifecycleHook::BeforeUpdate);
                    }
                })
                .updated(move || {
                    if let Some(vm) = updated.upgrade()
                        && vm.is_mounted()
                        && !vm.is_destroyed()
                    {
                        call_hook(&vm, LifecycleHook::Updated);
                    }
                }),
        );
        *self.0.render_watcher.borrow_mut() = Some(watcher.clone());
        watcher.start();

        // Rendered children get `mounted` from their placeholder's insert hook.
        if self.parent_vnode().is_none() {
            self.0.is_mounted.set(true);
            call_hook(self, LifecycleHook::Mounted);
        }
        self
    }

    fn update_component(&self) {
        let name = self.name().to_string();
        let vnode = measure(|| format!("{name} render"), || self.render());
        // Only the render itself is a dependency of the render watcher.
        measure(|| format!("{name} patch"), || untracked(|| self.update(vnode)));
    }

    /// Produce this instance's next tree. Failures fall back to the
    /// `render_error` output, then to the previous tree.
    pub(crate) fn render(&self) -> VNode {
        if self.is_mounted() {
            // Slot nodes from the last render already carry external nodes.
            let mut slots = self.0.slots.borrow_mut();
            for nodes in slots.values_mut() {
                if nodes.first().is_some_and(|n| n.elm().is_some()) {
                    *nodes = nodes.iter().map(|n| n.clone_node(true)).collect();
                }
            }
        }

        let cx = RenderCx::new(self);
        let options = self.options();
        let output = match options.render.clone() {
            Some(render) => catch_unwind(AssertUnwindSafe(|| render(&cx)))
                .unwrap_or_else(|p| RenderOutput::Failed(panic_message(&*p))),
            None => RenderOutput::Empty,
        };

        let output = match output {
            RenderOutput::Failed(message) => {
                let err = Error::Render {
                    component: self.name().to_string(),
                    message,
                };
                handle_error(err.clone());
                self.recover(&cx, &err)
            }
            other => other,
        };

        let vnode = match output {
            RenderOutput::Node(v) => v,
            RenderOutput::Nodes(mut nodes) if nodes.len() == 1 => nodes.remove(0),
            RenderOutput::Nodes(nodes) => {
                revue_core::warn(
                    Error::InvalidRoot {
                        component: self.name().to_string(),
                        found: format!("{} root nodes", nodes.len()),
                    }
                    .to_string(),
                );
                VNode::empty("")
            }
            RenderOutput::Empty | RenderOutput::Failed(_) => VNode::empty(""),
        };
        vnode.set_parent(self.parent_vnode().as_ref());
        vnode
    }

    fn recover(&self, cx: &RenderCx<'_>, err: &Error) -> RenderOutput {
        let previous = || match self.root_vnode() {
            Some(v) => RenderOutput::Node(v),
            None => RenderOutput::Empty,
        };
        let Some(fallback) = self.options().render_error.clone() else {
            return previous();
        };
        let message = match catch_unwind(AssertUnwindSafe(|| fallback(cx, err))) {
            Ok(RenderOutput::Failed(m)) => m,
            Ok(out) => return out,
            Err(p) => panic_message(&*p),
        };
        handle_error(Error::Render {
            component: self.name().to_string(),
            message: format!("render_error: {message}"),
        });
        previous()
    }

    /// Patch `vnode` over the previous tree (or the mount point).
    pub(crate) fn update(&self, vnode: VNode) {
        let prev = self.0.vnode.replace(Some(vnode.clone()));
        let patcher = self.0.patcher.clone();
        let el = match &prev {
            Some(prev) => patcher.patch(OldTree::Node(prev), Some(&vnode), Some(self)),
            None => {
                let old = match self.0.el.get() {
                    Some(el) => OldTree::Element(el),
                    None => OldTree::Empty,
                };
                patcher.patch(old, Some(&vnode), Some(self))
            }
        };
        self.0.el.set(el);

        // A parent whose root is this component shares its root node.
        if let (Some(placeholder), Some(parent)) = (self.parent_vnode(), self.parent())
            && parent.root_vnode().is_some_and(|r| r.ptr_eq(&placeholder))
        {
            parent.0.el.set(el);
        }
    }

    pub fn force_update(&self) {
        let watcher = self.0.render_watcher.borrow().clone();
        if let Some(w) = watcher {
            w.update();
        }
    }

    /// Tear down: watchers, rendered tree (destroy hooks only) and listeners.
    /// Repeated calls are ignored.
    pub fn destroy(&self) {
        if self.0.being_destroyed.get() {
            return;
        }
        call_hook(self, LifecycleHook::BeforeDestroy);
        self.0.being_destroyed.set(true);

        if let Some(parent) = self.parent()
            && !parent.0.being_destroyed.get()
        {
            parent.0.children.borrow_mut().retain(|c| !c.ptr_eq(self));
        }

        let render_watcher = self.0.render_watcher.borrow().clone();
        if let Some(w) = render_watcher {
            w.teardown();
        }
        let watchers = self.0.watchers.borrow().clone();
        for w in watchers.iter().rev() {
            w.teardown();
        }
        self.0.is_destroyed.set(true);

        let vnode = self.root_vnode();
        if let Some(vnode) = vnode {
            self.0.patcher.patch(OldTree::Node(&vnode), None, Some(self));
        }
        call_hook(self, LifecycleHook::Destroyed);

        self.0.own_listeners.borrow_mut().clear();
        self.0.parent_listeners.borrow_mut().clear();
        if let Some(placeholder) = self.parent_vnode() {
            placeholder.set_parent(None);
        }
        *self.0.parent_vnode.borrow_mut() = None;
        log::debug!("destroyed {} (uid {})", self.name(), self.0.uid);
    }

    /// Register a listener on this instance's own event bus.
    pub fn on(&self, event: impl Into<String>, f: impl Fn(&Value) + 'static) {
        self.0.own_listeners.borrow_mut().entry(event.into()).or_default().push(Rc::new(f));
    }

    pub fn off(&self, event: &str) {
        self.0.own_listeners.borrow_mut().remove(event);
    }

    /// Fire `event`: listeners bound by the parent first, then own listeners.
    /// A failing listener is reported and the rest still run.
    pub fn emit(&self, event: &str, payload: &Value) {
        let mut handlers: Vec<_> = self
            .0
            .parent_listeners
            .borrow()
            .get(event)
            .map(|l| l.to_vec())
            .unwrap_or_default();
        if let Some(own) = self.0.own_listeners.borrow().get(event) {
            handlers.extend(own.iter().cloned());
        }
        for h in handlers {
            if let Err(p) = catch_unwind(AssertUnwindSafe(|| h(payload))) {
                handle_error(Error::Hook {
                    hook: "event handler",
                    component: self.name().to_string(),
                    message: format!("{event}: {}", panic_message(&*p)),
                });
            }
        }
    }

    pub(crate) fn has_hook_event(&self) -> bool {
        self.0.own_listeners.borrow().keys().any(|k| k.starts_with("hook:"))
    }

    /// Run `f` with this instance after the next flush.
    pub fn next_tick(&self, f: impl FnOnce(&Component) + 'static) {
        let weak = self.downgrade();
        revue_core::next_tick(move || {
            if let Some(vm) = weak.upgrade() {
                f(&vm);
            }
        });
    }

    /// Tracked read: computed values, then props, then state.
    pub fn get(&self, key: &str) -> Value {
        let computed = self.0.computed.borrow().get(key).cloned();
        if let Some(c) = computed {
            return c.get();
        }
        if self.0.props.peek(key).is_some() {
            return self.0.props.get(key);
        }
        self.0.state.get(key)
    }

    pub fn get_path(&self, path: &str) -> Value {
        match path.split_once('.') {
            Some((head, rest)) => self.get(head).get_path(rest),
            None => self.get(path),
        }
    }

    /// Write a state key. Props belong to the parent and are refused.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if self.options().props.contains_key(&key) {
            report(UsageError::PropWrite {
                component: self.name().to_string(),
                key,
            });
            return;
        }
        self.0.state.set(key, value);
    }

    pub fn state(&self) -> &ReactiveObject {
        &self.0.state
    }

    pub fn props(&self) -> &ReactiveObject {
        &self.0.props
    }

    /// Attach per-instance data for built-in components.
    pub fn set_local(&self, value: Rc<dyn Any>) {
        *self.0.local.borrow_mut() = Some(value);
    }

    pub fn local<T: Any>(&self) -> Option<Rc<T>> {
        self.0.local.borrow().clone().and_then(|v| v.downcast::<T>().ok())
    }

    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    pub fn name(&self) -> &str {
        self.0.ctor.name().unwrap_or("anonymous")
    }

    pub fn ctor(&self) -> &Constructor {
        &self.0.ctor
    }

    pub fn options(&self) -> &Config {
        self.0.ctor.options()
    }

    pub fn patcher(&self) -> &Rc<Patcher> {
        &self.0.patcher
    }

    pub fn parent(&self) -> Option<Component> {
        self.0.parent.as_ref().and_then(WeakComponent::upgrade)
    }

    pub fn root(&self) -> Component {
        let mut vm = self.clone();
        while let Some(p) = vm.parent() {
            vm = p;
        }
        vm
    }

    /// Live non-abstract child instances.
    pub fn children(&self) -> Vec<Component> {
        self.0
            .children
            .borrow()
            .iter()
            .filter(|c| !c.options().is_abstract)
            .cloned()
            .collect()
    }

    pub fn el(&self) -> Option<NodeKey> {
        self.0.el.get()
    }

    /// The tree produced by the last render.
    pub fn root_vnode(&self) -> Option<VNode> {
        self.0.vnode.borrow().clone()
    }

    /// The placeholder standing for this instance in its parent's tree.
    pub fn parent_vnode(&self) -> Option<VNode> {
        self.0.parent_vnode.borrow().as_ref().and_then(WeakVNode::upgrade)
    }

    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.0.slots.borrow().get(name).cloned().unwrap_or_default()
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.0.render_watcher.borrow().clone()
    }

    /// User and computed watchers still owned by this instance.
    pub fn watchers(&self) -> Vec<Watcher> {
        self.0.watchers.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.0.is_mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.is_destroyed.get()
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.0.being_destroyed.get()
    }

    pub fn is_inactive(&self) -> bool {
        self.0.inactive.get() == Some(true)
    }

    pub(crate) fn inner(&self) -> &ComponentInner {
        &self.0
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("uid", &self.0.uid)
            .field("name", &self.name())
            .field("mounted", &self.is_mounted())
            .field("destroyed", &self.is_destroyed())
            .field("inactive", &self.0.inactive.get())
            .field("children", &self.0.children.borrow().len())
            .finish()
    }
}
