//! Component definitions.
//!
//! A [`Config`] is a plain value describing one kind of component. Extending
//! a [`Constructor`] merges the parent's config with the overrides via
//! [`merge_config`]; there is no inheritance chain at runtime.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use revue_core::{Error, ReactiveObject, Value, untracked};
use smallvec::SmallVec;

use crate::component::Component;
use crate::render::{RenderCx, RenderOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleHook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl LifecycleHook {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleHook::BeforeCreate => "beforeCreate",
            LifecycleHook::Created => "created",
            LifecycleHook::BeforeMount => "beforeMount",
            LifecycleHook::Mounted => "mounted",
            LifecycleHook::BeforeUpdate => "beforeUpdate",
            LifecycleHook::Updated => "updated",
            LifecycleHook::Activated => "activated",
            LifecycleHook::Deactivated => "deactivated",
            LifecycleHook::BeforeDestroy => "beforeDestroy",
            LifecycleHook::Destroyed => "destroyed",
        }
    }
}

pub type Hook = Rc<dyn Fn(&Component)>;
pub type DataFn = Rc<dyn Fn(&Component) -> Value>;
pub type ComputedFn = Rc<dyn Fn(&Component) -> Value>;
pub type WatchHandler = Rc<dyn Fn(&Component, &Value, &Value)>;
pub type RenderFn = Rc<dyn Fn(&RenderCx<'_>) -> RenderOutput>;
pub type RenderErrorFn = Rc<dyn Fn(&RenderCx<'_>, &Error) -> RenderOutput>;

#[derive(Clone, Default)]
pub struct PropDef {
    pub default: Option<Value>,
    pub required: bool,
}

impl PropDef {
    /// The default for a fresh instance. Container defaults are copied so
    /// instances never share them.
    pub fn default_value(&self) -> Value {
        match &self.default {
            Some(v) if v.is_container() => Value::from(v.to_json()),
            Some(v) => v.clone(),
            None => Value::Null,
        }
    }
}

#[derive(Clone)]
pub struct WatchDef {
    pub handler: WatchHandler,
    pub deep: bool,
    pub immediate: bool,
}

#[derive(Clone, Default)]
pub struct Config {
    pub name: Option<String>,
    pub props: BTreeMap<String, PropDef>,
    pub data: Option<DataFn>,
    pub computed: BTreeMap<String, ComputedFn>,
    pub watch: BTreeMap<String, SmallVec<[WatchDef; 1]>>,
    pub render: Option<RenderFn>,
    pub render_error: Option<RenderErrorFn>,
    pub hooks: BTreeMap<LifecycleHook, SmallVec<[Hook; 2]>>,
    pub components: BTreeMap<String, Constructor>,
    /// Abstract components render no element of their own and are skipped
    /// when linking parents to children.
    pub is_abstract: bool,
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn prop(mut self, name: impl Into<String>) -> Self {
        self.props.insert(name.into(), PropDef::default());
        self
    }

    pub fn prop_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.props.insert(
            name.into(),
            PropDef {
                default: Some(default.into()),
                required: false,
            },
        );
        self
    }

    pub fn prop_required(mut self, name: impl Into<String>) -> Self {
        self.props.insert(
            name.into(),
            PropDef {
                default: None,
                required: true,
            },
        );
        self
    }

    /// Initial state factory; must produce an object.
    pub fn data(mut self, f: impl Fn(&Component) -> Value + 'static) -> Self {
        self.data = Some(Rc::new(f));
        self
    }

    pub fn computed(mut self, name: impl Into<String>, f: impl Fn(&Component) -> Value + 'static) -> Self {
        self.computed.insert(name.into(), Rc::new(f));
        self
    }

    /// Watch a dotted path on the instance (computed, then props, then state).
    pub fn watch(
        self,
        path: impl Into<String>,
        f: impl Fn(&Component, &Value, &Value) + 'static,
    ) -> Self {
        self.watch_with(path, f, false, false)
    }

    pub fn watch_with(
        mut self,
        path: impl Into<String>,
        f: impl Fn(&Component, &Value, &Value) + 'static,
        deep: bool,
        immediate: bool,
    ) -> Self {
        self.watch.entry(path.into()).or_default().push(WatchDef {
            handler: Rc::new(f),
            deep,
            immediate,
        });
        self
    }

    pub fn render(mut self, f: impl Fn(&RenderCx<'_>) -> RenderOutput + 'static) -> Self {
        self.render = Some(Rc::new(f));
        self
    }

    /// Fallback renderer used when `render` fails.
    pub fn render_error(
        mut self,
        f: impl Fn(&RenderCx<'_>, &Error) -> RenderOutput + 'static,
    ) -> Self {
        self.render_error = Some(Rc::new(f));
        self
    }

    pub fn hook(mut self, hook: LifecycleHook, f: impl Fn(&Component) + 'static) -> Self {
        self.hooks.entry(hook).or_default().push(Rc::new(f));
        self
    }

    pub fn component(mut self, name: impl Into<String>, ctor: Constructor) -> Self {
        self.components.insert(name.into(), ctor);
        self
    }

    pub fn abstract_component(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn hooks_for(&self, hook: LifecycleHook) -> SmallVec<[Hook; 2]> {
        self.hooks.get(&hook).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("props", &self.props.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("watch", &self.watch.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.iter().map(|(k, v)| (k.name(), v.len())).collect::<Vec<_>>())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("abstract", &self.is_abstract)
            .finish()
    }
}

/// Compose `base` with `over`: hook lists and watchers concatenate (base
/// first), maps are overridden key by key, scalars take the override when
/// set.
pub fn merge_config(base: &Config, over: &Config) -> Config {
    let mut props = base.props.clone();
    props.extend(over.props.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut computed = base.computed.clone();
    computed.extend(over.computed.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut watch = base.watch.clone();
    for (k, defs) in &over.watch {
        watch.entry(k.clone()).or_default().extend(defs.iter().cloned());
    }

    let mut hooks = base.hooks.clone();
    for (k, list) in &over.hooks {
        hooks.entry(*k).or_default().extend(list.iter().cloned());
    }

    let mut components = base.components.clone();
    components.extend(over.components.iter().map(|(k, v)| (k.clone(), v.clone())));

    let data = match (&base.data, &over.data) {
        (Some(b), Some(o)) => {
            let (b, o) = (b.clone(), o.clone());
            Some(Rc::new(move |vm: &Component| {
                let child = o(vm);
                let parent = b(vm);
                merge_data(&child, &parent);
                child
            }) as DataFn)
        }
        (b, o) => o.clone().or_else(|| b.clone()),
    };

    Config {
        name: over.name.clone().or_else(|| base.name.clone()),
        props,
        data,
        computed,
        watch,
        render: over.render.clone().or_else(|| base.render.clone()),
        render_error: over.render_error.clone().or_else(|| base.render_error.clone()),
        hooks,
        components,
        is_abstract: base.is_abstract || over.is_abstract,
    }
}

// Fill keys missing from `to` with the ones in `from`, recursing into
// objects present on both sides.
fn merge_data(to: &Value, from: &Value) {
    let (Some(to), Some(from)) = (to.as_object(), from.as_object()) else {
        return;
    };
    untracked(|| merge_objects(to, from));
}

fn merge_objects(to: &ReactiveObject, from: &ReactiveObject) {
    for key in from.keys() {
        let Some(from_val) = from.peek(&key) else { continue };
        match to.peek(&key) {
            None => to.set(key, from_val),
            Some(to_val) => {
                if let (Some(t), Some(f)) = (to_val.as_object(), from_val.as_object()) {
                    merge_objects(t, f);
                }
            }
        }
    }
}

struct ConstructorInner {
    cid: u32,
    options: Config,
    super_ctor: Option<Constructor>,
}

/// A component kind: a merged [`Config`] plus a unique id.
#[derive(Clone)]
pub struct Constructor(Rc<ConstructorInner>);

thread_local! {
    static NEXT_CID: Cell<u32> = const { Cell::new(1) };
    static BASE: Constructor = Constructor(Rc::new(ConstructorInner {
        cid: 0,
        options: Config::default(),
        super_ctor: None,
    }));
    static GLOBAL_COMPONENTS: RefCell<BTreeMap<String, Constructor>> =
        RefCell::new(BTreeMap::from([("keep-alive".to_string(), crate::keep_alive::constructor())]));
    static PLUGINS: RefCell<Vec<Rc<dyn Plugin>>> = const { RefCell::new(Vec::new()) };
}

impl Constructor {
    /// The root every constructor extends from.
    pub fn base() -> Constructor {
        BASE.with(Clone::clone)
    }

    pub fn new(config: Config) -> Constructor {
        Self::base().extend(config)
    }

    /// Derive a constructor with `overrides` merged over this one's config.
    pub fn extend(&self, overrides: Config) -> Constructor {
        let cid = NEXT_CID.with(|n| {
            let cid = n.get();
            n.set(cid + 1);
            cid
        });
        let options = merge_config(&self.0.options, &overrides);
        log::trace!("extend cid {cid} ({:?})", options.name);
        Constructor(Rc::new(ConstructorInner {
            cid,
            options,
            super_ctor: Some(self.clone()),
        }))
    }

    pub fn cid(&self) -> u32 {
        self.0.cid
    }

    pub fn name(&self) -> Option<&str> {
        self.0.options.name.as_deref()
    }

    pub fn options(&self) -> &Config {
        &self.0.options
    }

    pub fn super_ctor(&self) -> Option<&Constructor> {
        self.0.super_ctor.as_ref()
    }

    pub fn ptr_eq(&self, other: &Constructor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Look up a component by name: local registrations first, then this
    /// constructor itself (so recursive components find themselves), then
    /// the global registry.
    pub fn resolve(&self, name: &str) -> Option<Constructor> {
        if let Some(c) = self.0.options.components.get(name) {
            return Some(c.clone());
        }
        if self.name() == Some(name) {
            return Some(self.clone());
        }
        resolve_global(name)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("cid", &self.0.cid)
            .field("name", &self.name())
            .finish()
    }
}

/// Make `ctor` resolvable by `name` from every component.
pub fn register_component(name: impl Into<String>, ctor: Constructor) {
    GLOBAL_COMPONENTS.with(|g| {
        g.borrow_mut().insert(name.into(), ctor);
    });
}

pub fn resolve_global(name: &str) -> Option<Constructor> {
    GLOBAL_COMPONENTS.with(|g| g.borrow().get(name).cloned())
}

/// A bundle of global registrations, installed through [`use_plugin`].
pub trait Plugin {
    fn install(&self);
}

impl<F: Fn()> Plugin for F {
    fn install(&self) {
        self()
    }
}

/// Install `plugin` unless this same handle was installed before.
/// Returns whether `install` ran.
pub fn use_plugin(plugin: Rc<dyn Plugin>) -> bool {
    if PLUGINS.with(|p| p.borrow().iter().any(|q| Rc::ptr_eq(q, &plugin))) {
        log::debug!("plugin already installed");
        return false;
    }
    // Installing may register components or further plugins.
    plugin.install();
    PLUGINS.with(|p| p.borrow_mut().push(plugin));
    true
}
