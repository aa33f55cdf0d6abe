//! The bridge between the patch engine and component instances: lifecycle
//! hook dispatch, the component vnode hooks, slot resolution and keep-alive
//! (de)activation.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use revue_core::{Error, Value, handle_error, panic_message, queue_post_flush, untracked};

use crate::component::{Component, InitOptions, WeakComponent};
use crate::options::LifecycleHook;
use crate::patch::Patcher;
use crate::vnode::{VNode, VNodeFlags, is_whitespace};

/// Run every registered `hook` of `vm`, isolating failures, then emit
/// `hook:<name>` for listeners registered through [`Component::on`].
pub fn call_hook(vm: &Component, hook: LifecycleHook) {
    untracked(|| {
        for f in vm.options().hooks_for(hook) {
            if let Err(p) = catch_unwind(AssertUnwindSafe(|| f(vm))) {
                handle_error(Error::Hook {
                    hook: hook.name(),
                    component: vm.name().to_string(),
                    message: panic_message(&*p),
                });
            }
        }
        if vm.has_hook_event() {
            vm.emit(&format!("hook:{}", hook.name()), &Value::Null);
        }
    });
}

/// Group placeholder children into named slots. Named slots only count when
/// the child was rendered in the same scope as the placeholder; anything
/// else lands in `default`. Slots holding only whitespace are dropped.
pub(crate) fn resolve_slots(
    children: Option<&[VNode]>,
    context: Option<&WeakComponent>,
) -> BTreeMap<String, Vec<VNode>> {
    let mut slots: BTreeMap<String, Vec<VNode>> = BTreeMap::new();
    let Some(children) = children else {
        return slots;
    };
    for child in children {
        let same_scope = match (child.context_handle(), context) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        let named = child.data().and_then(|d| d.slot.clone());
        match named {
            Some(name) if same_scope => {
                if child.tag() == Some("template") {
                    let inner = child.children().map(|c| c.to_vec()).unwrap_or_default();
                    slots.entry(name).or_default().extend(inner);
                } else {
                    slots.entry(name).or_default().push(child.clone());
                }
            }
            _ => slots.entry("default".to_string()).or_default().push(child.clone()),
        }
    }
    slots.retain(|_, nodes| !nodes.iter().all(is_whitespace));
    slots
}

fn is_in_inactive_tree(vm: &Component) -> bool {
    let mut cur = vm.parent();
    while let Some(p) = cur {
        if p.is_inactive() {
            return true;
        }
        cur = p.parent();
    }
    false
}

/// Mark `vm` and its subtree active; children fire `activated` before their
/// parent. Subtrees deactivated on their own stay inactive.
pub fn activate_child_component(vm: &Component, direct: bool) {
    let inner = vm.inner();
    if direct {
        inner.direct_inactive.set(false);
        if is_in_inactive_tree(vm) {
            return;
        }
    } else if inner.direct_inactive.get() {
        return;
    }
    if inner.inactive.get() != Some(false) {
        inner.inactive.set(Some(false));
        for child in vm.children() {
            activate_child_component(&child, false);
        }
        call_hook(vm, LifecycleHook::Activated);
    }
}

pub fn deactivate_child_component(vm: &Component, direct: bool) {
    let inner = vm.inner();
    if direct {
        inner.direct_inactive.set(true);
        if is_in_inactive_tree(vm) {
            return;
        }
    }
    if inner.inactive.get() != Some(true) {
        inner.inactive.set(Some(true));
        for child in vm.children() {
            deactivate_child_component(&child, false);
        }
        call_hook(vm, LifecycleHook::Deactivated);
    }
}

/// Defer activation of a re-inserted cached instance until the whole tree
/// has been patched.
fn queue_activated_component(vm: &Component) {
    vm.inner().inactive.set(Some(false));
    let weak = vm.downgrade();
    queue_post_flush(move || {
        if let Some(vm) = weak.upgrade() {
            vm.inner().inactive.set(Some(true));
            activate_child_component(&vm, true);
        }
    });
}

/// Carry a new placeholder's inputs over to an existing instance.
pub(crate) fn update_child_component(vm: &Component, vnode: &VNode) {
    let Some(opts) = vnode.component_options() else {
        return;
    };
    let inner = vm.inner();
    let had_children = inner.render_children.borrow().is_some();
    let needs_force_update = opts.children.is_some() || had_children;

    *inner.parent_vnode.borrow_mut() = Some(vnode.downgrade());
    if let Some(root) = vm.root_vnode() {
        root.set_parent(Some(vnode));
    }
    *inner.render_children.borrow_mut() = opts.children.clone();
    *inner.parent_listeners.borrow_mut() = opts.listeners.clone();

    untracked(|| {
        let old_props = inner.props_data.replace(opts.props_data.clone());
        for (key, def) in &vm.options().props {
            let value = match opts.props_data.get(key) {
                Some(v) => v.clone(),
                // Absent before and now: keep the instance's own default.
                None if !old_props.contains_key(key) => match vm.props().peek(key) {
                    Some(v) => v,
                    None => def.default_value(),
                },
                None => def.default_value(),
            };
            vm.props().set(key.clone(), value);
        }
    });

    if needs_force_update {
        let slots = resolve_slots(opts.children.as_deref(), vnode.context_handle());
        *inner.slots.borrow_mut() = slots;
        vm.force_update();
    }
}

/// `init` vnode hook: create and mount the instance, or reuse a kept-alive one.
pub(crate) fn init_component(vnode: &VNode, patcher: &Rc<Patcher>, active: Option<&Component>) {
    if let Some(existing) = vnode.component_instance()
        && !existing.is_destroyed()
        && vnode.has_flag(VNodeFlags::KEEP_ALIVE)
    {
        prepatch_component(vnode, vnode);
        return;
    }
    let Some(opts) = vnode.component_options() else {
        return;
    };
    let child = Component::new(
        &opts.ctor,
        InitOptions {
            parent: active.cloned(),
            parent_vnode: Some(vnode.clone()),
            props_data: opts.props_data.clone(),
            patcher: patcher.clone(),
        },
    );
    match active {
        Some(_) => vnode.set_component_instance(Some(&child)),
        None => vnode.adopt_instance(child.clone()),
    }
    child.mount(None);
}

/// `prepatch` vnode hook: move the instance to the new placeholder.
pub(crate) fn prepatch_component(old: &VNode, vnode: &VNode) {
    let Some(child) = transfer_instance(old, vnode) else {
        return;
    };
    update_child_component(&child, vnode);
}

/// Point `vnode` at `old`'s instance, keeping ownership where it was.
pub(crate) fn transfer_instance(old: &VNode, vnode: &VNode) -> Option<Component> {
    let child = old.component_instance()?;
    if !old.ptr_eq(vnode) {
        if child.parent().is_none() {
            vnode.adopt_instance(child.clone());
        } else {
            vnode.set_component_instance(Some(&child));
        }
    }
    Some(child)
}

/// `insert` vnode hook: the instance's root is in the tree.
pub(crate) fn insert_component(vnode: &VNode) {
    let Some(child) = vnode.component_instance() else {
        return;
    };
    if !child.is_mounted() {
        child.inner().is_mounted.set(true);
        call_hook(&child, LifecycleHook::Mounted);
    }
    if vnode.has_flag(VNodeFlags::KEEP_ALIVE) {
        if vnode.context().is_some_and(|c| c.is_mounted()) {
            queue_activated_component(&child);
        } else {
            activate_child_component(&child, true);
        }
    }
}

/// `destroy` vnode hook: tear down, or only deactivate when kept alive.
pub(crate) fn destroy_component(vnode: &VNode) {
    let Some(child) = vnode.component_instance() else {
        return;
    };
    if child.is_destroyed() {
        return;
    }
    if vnode.has_flag(VNodeFlags::KEEP_ALIVE) {
        deactivate_child_component(&child, true);
    } else {
        child.destroy();
    }
}
