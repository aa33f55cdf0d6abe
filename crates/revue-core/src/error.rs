use std::any::Any;

use thiserror::Error;

use crate::watcher::WatcherId;

/// Everything the runtime reports through the configured error handler.
///
/// None of these abort the update loop: render failures fall back to the last
/// good tree, hook failures are isolated per callback, and watcher failures are
/// isolated per watcher.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("error in render for {component}: {message}")]
    Render { component: String, message: String },

    #[error("error in {hook} hook for {component}: {message}")]
    Hook {
        hook: &'static str,
        component: String,
        message: String,
    },

    #[error("error evaluating watcher {id} ({label}): {message}")]
    Watcher {
        id: WatcherId,
        label: String,
        message: String,
    },

    #[error("error in callback for watcher \"{label}\": {message}")]
    WatcherCallback { label: String, message: String },

    #[error("render function of {component} returned {found}; expected a single root node")]
    InvalidRoot { component: String, found: String },

    #[error("you may have an infinite update loop in watcher {id} ({label})")]
    InfiniteUpdate { id: WatcherId, label: String },

    #[error("cannot write `{key}` on a frozen container")]
    FrozenWrite { key: String },

    #[error("error in next_tick callback: {message}")]
    NextTick { message: String },
}

/// Best-effort text for a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}
