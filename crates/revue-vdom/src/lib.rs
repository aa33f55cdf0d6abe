//! # Virtual nodes and components
//!
//! A render function describes the UI it wants as a [`VNode`] tree; the
//! [`Patcher`] diffs that tree against the previous one and applies the
//! difference through a platform's [`NodeOps`]. [`Component`]s tie a render
//! function to reactive state: each instance owns a render watcher, so a
//! write to anything the render read schedules exactly one re-render.
//!
//! ```rust,ignore
//! let counter = Constructor::new(
//!     Config::new("counter")
//!         .data(|_| serde_json::json!({ "count": 0 }).into())
//!         .render(|cx| cx.h("p").text(cx.get("count").to_string()).into()),
//! );
//! ```
//!
//! `revue-dom` provides an in-memory platform to mount into.

pub mod component;
pub mod error;
pub mod keep_alive;
pub mod lifecycle;
pub mod node_ops;
pub mod options;
pub mod patch;
pub mod render;
pub mod vnode;

pub use component::{Component, InitOptions, WeakComponent};
pub use error::UsageError;
pub use lifecycle::{activate_child_component, call_hook, deactivate_child_component};
pub use node_ops::{Module, NodeKey, NodeOps};
pub use options::{
    Config, Constructor, LifecycleHook, Plugin, PropDef, merge_config, register_component, resolve_global,
    use_plugin,
};
pub use patch::{OldTree, Patcher};
pub use render::{RenderCx, RenderOutput};
pub use vnode::{
    Key, Listener, Listeners, VNode, VNodeBuilder, VNodeData, VNodeFlags, VNodeHooks, component,
    first_component_child, h, same_vnode,
};
