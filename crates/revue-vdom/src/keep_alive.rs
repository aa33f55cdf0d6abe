//! `keep-alive`: an abstract component that retains the instances of the
//! component it wraps instead of destroying them when they are switched out.
//!
//! Entries are keyed by the placeholder's key, else by constructor id and
//! tag. `max` bounds the cache; the least recently rendered entry goes
//! first. `include` / `exclude` (comma-separated names or an array of
//! names) restrict which components are cached, and changing them prunes
//! entries that no longer qualify.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use revue_core::Value;

use crate::component::Component;
use crate::lifecycle::transfer_instance;
use crate::options::{Config, Constructor, LifecycleHook};
use crate::render::{RenderCx, RenderOutput};
use crate::vnode::{VNode, VNodeFlags, first_component_child};

#[derive(Default)]
pub struct KeepAliveCache {
    entries: HashMap<String, VNode>,
    // Least recently used first.
    keys: Vec<String>,
}

impl KeepAliveCache {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
        self.keys.push(key.to_string());
    }
}

type SharedCache = Rc<RefCell<KeepAliveCache>>;

pub fn config() -> Config {
    Config::new("keep-alive")
        .abstract_component()
        .prop("include")
        .prop("exclude")
        .prop("max")
        .hook(LifecycleHook::Created, |vm| {
            let cache: SharedCache = Rc::new(RefCell::new(KeepAliveCache::default()));
            vm.set_local(cache);
        })
        .hook(LifecycleHook::Destroyed, |vm| {
            let keys = cache_of(vm).map(|c| c.borrow().keys.clone()).unwrap_or_default();
            for key in keys {
                prune_cache_entry(vm, &key, None);
            }
        })
        .watch("include", |vm, include, _| {
            prune_cache(vm, |name| matches(include, name));
        })
        .watch("exclude", |vm, exclude, _| {
            prune_cache(vm, |name| !matches(exclude, name));
        })
        .render(render)
}

pub fn constructor() -> Constructor {
    Constructor::new(config())
}

/// The cache of a keep-alive instance.
pub fn cache_of(vm: &Component) -> Option<SharedCache> {
    vm.local::<RefCell<KeepAliveCache>>()
}

fn render(cx: &RenderCx<'_>) -> RenderOutput {
    let slot = cx.slot("default");
    let Some(vnode) = first_component_child(&slot) else {
        return slot.first().cloned().into();
    };
    let Some(opts) = vnode.component_options() else {
        return vnode.into();
    };

    let name = component_name(&vnode);
    let include = cx.get("include");
    let exclude = cx.get("exclude");
    let not_included = !include.is_null() && !name.is_some_and(|n| matches(&include, n));
    let excluded = !exclude.is_null() && name.is_some_and(|n| matches(&exclude, n));
    if not_included || excluded {
        return vnode.into();
    }

    let vm = cx.vm();
    let Some(cache) = cache_of(vm) else {
        return vnode.into();
    };
    let key = match vnode.key() {
        Some(k) => k.to_string(),
        None => format!("{}::{}", opts.ctor.cid(), opts.tag),
    };
    let max = max_entries(&cx.get("max"));

    let cached = cache.borrow().entries.get(&key).cloned();
    match cached {
        Some(cached) => {
            transfer_instance(&cached, &vnode);
            cache.borrow_mut().touch(&key);
        }
        None => {
            let over = {
                let mut c = cache.borrow_mut();
                c.entries.insert(key.clone(), vnode.clone());
                c.touch(&key);
                match max {
                    Some(max) if c.keys.len() > max => c.keys.first().cloned(),
                    _ => None,
                }
            };
            if let Some(oldest) = over {
                log::debug!("keep-alive evicting `{oldest}`");
                let current = vm.root_vnode();
                prune_cache_entry(vm, &oldest, current.as_ref());
            }
        }
    }
    vnode.set_flag(VNodeFlags::KEEP_ALIVE, true);
    vnode.into()
}

/// A positive `max`; zero, negative or unparsable means unbounded.
pub(crate) fn max_entries(v: &Value) -> Option<usize> {
    let n = match v {
        Value::Number(n) if *n >= 1.0 => *n as usize,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (n > 0).then_some(n)
}

/// Drop every entry whose component name fails `keep`.
fn prune_cache(vm: &Component, keep: impl Fn(&str) -> bool) {
    let Some(cache) = cache_of(vm) else {
        return;
    };
    let doomed: Vec<String> = cache
        .borrow()
        .entries
        .iter()
        .filter(|(_, v)| component_name(v).is_some_and(|n| !keep(n)))
        .map(|(k, _)| k.clone())
        .collect();
    let current = vm.root_vnode();
    for key in doomed {
        prune_cache_entry(vm, &key, current.as_ref());
    }
}

/// Remove `key`, destroying its instance unless it is the node being
/// rendered right now.
fn prune_cache_entry(vm: &Component, key: &str, current: Option<&VNode>) {
    let Some(cache) = cache_of(vm) else {
        return;
    };
    let cached = {
        let mut c = cache.borrow_mut();
        c.keys.retain(|k| k != key);
        c.entries.remove(key)
    };
    let Some(cached) = cached else {
        return;
    };
    if current.is_none_or(|cur| cached.tag() != cur.tag())
        && let Some(instance) = cached.component_instance()
    {
        instance.destroy();
    }
}

fn component_name(vnode: &VNode) -> Option<&str> {
    let opts = vnode.component_options()?;
    opts.ctor.name().or(Some(opts.tag.as_str()))
}

/// `pattern` is a comma-separated list of names or an array of names.
pub fn matches(pattern: &Value, name: &str) -> bool {
    match pattern {
        Value::String(s) => s.split(',').any(|p| p.trim() == name),
        Value::Array(items) => items.to_vec().iter().any(|v| v.as_str() == Some(name)),
        _ => false,
    }
}
