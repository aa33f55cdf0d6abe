//! Watchers: units of re-computation subscribed to the deps they read.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::{Rc, Weak};

use crate::config::handle_error;
use crate::dep::{Dep, DepId};
use crate::error::{Error, panic_message};
use crate::observer::{Value, same_value, traverse};
use crate::scheduler;

pub type WatcherId = u64;
pub type Getter = Rc<dyn Fn() -> Value>;
pub type Callback = Rc<dyn Fn(&Value, &Value)>;

thread_local! {
    // `None` entries mark untracked sections.
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
    static NEXT_WATCHER_ID: Cell<WatcherId> = const { Cell::new(1) };
}

/// The watcher currently evaluating, if reads should be tracked.
pub fn current_target() -> Option<Watcher> {
    TARGET_STACK.with(|s| s.borrow().last().cloned().flatten())
}

struct TargetGuard;

fn push_target(target: Option<Watcher>) -> TargetGuard {
    TARGET_STACK.with(|s| s.borrow_mut().push(target));
    TargetGuard
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        TARGET_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// Run `f` without a current target, so nothing it reads is tracked.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = push_target(None);
    f()
}

#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Computed: only mark dirty on notify, evaluate on read.
    pub lazy: bool,
    /// User watcher: getter and callback failures are reported, not propagated.
    pub user: bool,
    /// Traverse the value so nested properties are dependencies too.
    pub deep: bool,
    /// Run on notify instead of going through the scheduler.
    pub sync: bool,
    /// Invoke the callback once right after construction.
    pub immediate: bool,
    /// Called by the scheduler just before a queued run.
    pub before: Option<Rc<dyn Fn()>>,
    /// Called after the flush that ran this watcher, child-before-parent.
    pub updated: Option<Rc<dyn Fn()>>,
    pub label: Option<String>,
}

impl WatcherOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }
    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
    pub fn before(mut self, f: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(f));
        self
    }
    pub fn updated(mut self, f: impl Fn() + 'static) -> Self {
        self.updated = Some(Rc::new(f));
        self
    }
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

pub(crate) struct WatcherInner {
    pub(crate) id: WatcherId,
    label: String,
    lazy: bool,
    user: bool,
    deep: bool,
    sync: bool,
    before: Option<Rc<dyn Fn()>>,
    updated: Option<Rc<dyn Fn()>>,
    getter: Getter,
    callback: Option<Callback>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    value: RefCell<Value>,
    deps: RefCell<Vec<Dep>>,
    dep_ids: RefCell<HashSet<DepId>>,
    new_deps: RefCell<Vec<Dep>>,
    new_dep_ids: RefCell<HashSet<DepId>>,
}

/// A subscriber that re-evaluates its getter when a dep it last read changes.
///
/// The dependency set is rebuilt on every evaluation: deps that were not read
/// this time are unsubscribed, so conditional reads shrink the set.
#[derive(Clone)]
pub struct Watcher(Rc<WatcherInner>);

impl Watcher {
    /// Build and, unless lazy, evaluate once to collect dependencies.
    pub fn new(
        getter: impl Fn() -> Value + 'static,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Self {
        let immediate = options.immediate;
        let w = Self::unstarted(getter, callback, options);
        if !w.0.lazy {
            w.start();
            if immediate && let Some(cb) = w.0.callback.clone() {
                let value = w.value();
                w.invoke_callback(&cb, &value, &Value::Null);
            }
        }
        w
    }

    /// Build without evaluating. Call [`start`](Self::start) once the owner
    /// has stored the handle (a render watcher's first evaluation mounts, and
    /// mounting may need to find the watcher).
    pub fn unstarted(
        getter: impl Fn() -> Value + 'static,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Self {
        let id = NEXT_WATCHER_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        let label = options.label.unwrap_or_else(|| format!("watcher#{id}"));
        Self(Rc::new(WatcherInner {
            id,
            label,
            lazy: options.lazy,
            user: options.user,
            deep: options.deep,
            sync: options.sync,
            before: options.before,
            updated: options.updated,
            getter: Rc::new(getter),
            callback,
            active: Cell::new(true),
            dirty: Cell::new(options.lazy),
            value: RefCell::new(Value::Null),
            deps: RefCell::new(Vec::new()),
            dep_ids: RefCell::new(HashSet::new()),
            new_deps: RefCell::new(Vec::new()),
            new_dep_ids: RefCell::new(HashSet::new()),
        }))
    }

    pub fn start(&self) {
        let value = self.get();
        *self.0.value.borrow_mut() = value;
    }

    pub(crate) fn from_inner(inner: Rc<WatcherInner>) -> Self {
        Self(inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.0)
    }

    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_lazy(&self) -> bool {
        self.0.lazy
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    pub fn dep_ids(&self) -> Vec<DepId> {
        self.0.deps.borrow().iter().map(Dep::id).collect()
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn before_hook(&self) -> Option<Rc<dyn Fn()>> {
        self.0.before.clone()
    }

    pub(crate) fn updated_hook(&self) -> Option<Rc<dyn Fn()>> {
        self.0.updated.clone()
    }

    /// Evaluate the getter with this watcher as the current target and
    /// re-collect dependencies.
    pub fn get(&self) -> Value {
        let _target = push_target(Some(self.clone()));
        let _cleanup = CleanupGuard(self);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let value = (self.0.getter)();
            if self.0.deep {
                traverse(&value);
            }
            value
        }));
        match result {
            Ok(value) => value,
            Err(payload) if self.0.user => {
                handle_error(Error::Watcher {
                    id: self.0.id,
                    label: self.0.label.clone(),
                    message: panic_message(&*payload),
                });
                self.value()
            }
            Err(payload) => resume_unwind(payload),
        }
    }

    pub(crate) fn add_dep(&self, dep: &Dep) {
        if !self.is_active() {
            return;
        }
        let id = dep.id();
        if !self.0.new_dep_ids.borrow_mut().insert(id) {
            return;
        }
        self.0.new_deps.borrow_mut().push(dep.clone());
        if !self.0.dep_ids.borrow().contains(&id) {
            dep.add_sub(self);
        }
    }

    fn cleanup_deps(&self) {
        let new_ids = std::mem::take(&mut *self.0.new_dep_ids.borrow_mut());
        let new_deps = std::mem::take(&mut *self.0.new_deps.borrow_mut());
        if !self.0.active.get() {
            // Torn down mid-evaluation: drop what this run subscribed to.
            for dep in &new_deps {
                dep.remove_sub(self.0.id);
            }
            return;
        }
        let old = std::mem::replace(&mut *self.0.deps.borrow_mut(), new_deps);
        for dep in &old {
            if !new_ids.contains(&dep.id()) {
                dep.remove_sub(self.0.id);
            }
        }
        *self.0.dep_ids.borrow_mut() = new_ids;
    }

    /// A dep this watcher holds changed.
    pub fn update(&self) {
        if self.0.lazy {
            self.0.dirty.set(true);
        } else if self.0.sync {
            self.run();
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Scheduler entry point: re-evaluate and fire the callback on change.
    pub fn run(&self) {
        if !self.is_active() {
            return;
        }
        let value = self.get();
        let old = self.value();
        if same_value(&value, &old) && !value.is_container() && !self.0.deep {
            return;
        }
        *self.0.value.borrow_mut() = value.clone();
        if let Some(cb) = self.0.callback.clone() {
            self.invoke_callback(&cb, &value, &old);
        }
    }

    fn invoke_callback(&self, cb: &Callback, value: &Value, old: &Value) {
        if !self.0.user {
            cb(value, old);
            return;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| cb(value, old))) {
            handle_error(Error::WatcherCallback {
                label: self.0.label.clone(),
                message: panic_message(&*payload),
            });
        }
    }

    /// Lazy watchers: recompute and clear the dirty flag.
    pub fn evaluate(&self) {
        let value = self.get();
        *self.0.value.borrow_mut() = value;
        self.0.dirty.set(false);
    }

    /// Make the current target depend on everything this watcher depends on.
    pub fn depend(&self) {
        let deps = self.0.deps.borrow().clone();
        for dep in &deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every held dep. Idempotent.
    pub fn teardown(&self) {
        if !self.0.active.replace(false) {
            return;
        }
        let deps = std::mem::take(&mut *self.0.deps.borrow_mut());
        for dep in &deps {
            dep.remove_sub(self.0.id);
        }
        self.0.dep_ids.borrow_mut().clear();
        log::trace!("watcher {} ({}) torn down", self.0.id, self.0.label);
    }
}

struct CleanupGuard<'a>(&'a Watcher);

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.0.cleanup_deps();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .field("active", &self.0.active.get())
            .field("dirty", &self.0.dirty.get())
            .field("deps", &self.dep_ids())
            .finish()
    }
}

/// Cached derived value backed by a lazy watcher.
#[derive(Clone, Debug)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    pub fn new(getter: impl Fn() -> Value + 'static) -> Self {
        Self::labeled("computed", getter)
    }

    pub fn labeled(label: impl Into<String>, getter: impl Fn() -> Value + 'static) -> Self {
        Self {
            watcher: Watcher::new(getter, None, WatcherOptions::default().lazy().label(label)),
        }
    }

    /// Recompute if dirty, forward dependencies to the reader, return the value.
    pub fn get(&self) -> Value {
        if self.watcher.is_dirty() {
            self.watcher.evaluate();
        }
        if current_target().is_some() {
            self.watcher.depend();
        }
        self.watcher.value()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

/// User watcher over an arbitrary getter.
pub fn watch(
    getter: impl Fn() -> Value + 'static,
    callback: impl Fn(&Value, &Value) + 'static,
    options: WatcherOptions,
) -> Watcher {
    Watcher::new(getter, Some(Rc::new(callback)), options.user())
}

/// User watcher over a dotted path into `source`.
pub fn watch_path(
    source: &Value,
    path: &str,
    callback: impl Fn(&Value, &Value) + 'static,
    options: WatcherOptions,
) -> Watcher {
    let source = source.clone();
    let owned = path.to_string();
    let options = if options.label.is_none() {
        options.label(path)
    } else {
        options
    };
    watch(move || source.get_path(&owned), callback, options)
}
