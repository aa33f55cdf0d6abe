//! # Reactive state and update scheduling
//!
//! Revue tracks which pieces of state each computation read, and re-runs
//! only the affected computations when that state changes. There are four
//! pieces:
//!
//! - [`Value`] / [`observe`]: plain data made observable.
//! - [`Dep`]: the subscriber list behind one reactive property.
//! - [`Watcher`] / [`Computed`]: computations subscribed to what they read.
//! - the scheduler: batches invalidated watchers into one ordered flush.
//!
//! ## Observable state
//!
//! ```rust
//! use revue_core::*;
//!
//! let state = reactive(serde_json::json!({ "count": 0, "user": { "name": "Ada" } }));
//! let obj = state.as_object().unwrap();
//! obj.set("count", 1);
//! assert_eq!(state.get_path("user.name").as_str(), Some("Ada"));
//! ```
//!
//! ## Watchers and batching
//!
//! Writes made during one synchronous turn are coalesced: the watcher below
//! runs once, on the next [`flush_ticks`], and sees the final value.
//!
//! ```rust
//! use revue_core::*;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let state = reactive(serde_json::json!({ "count": 0 }));
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let _w = watch(
//!     { let state = state.clone(); move || state.get_path("count") },
//!     { let seen = seen.clone(); move |new, _old| seen.borrow_mut().push(new.clone()) },
//!     WatcherOptions::default(),
//! );
//!
//! let obj = state.as_object().unwrap();
//! obj.set("count", 1);
//! obj.set("count", 2);
//! flush_ticks();
//! assert_eq!(*seen.borrow(), vec![Value::from(2)]);
//! ```
//!
//! Everything here is single-threaded and per-thread: each thread gets its
//! own dependency graph, scheduler and tick queue.

pub mod config;
pub mod dep;
pub mod error;
pub mod observer;
pub mod scheduler;
pub mod tests;
pub mod watcher;

pub use config::{RuntimeConfig, configure, handle_error, set_config, warn};
pub use dep::*;
pub use error::*;
pub use observer::*;
pub use scheduler::{
    MAX_UPDATE_COUNT, flush_scheduler_queue, flush_ticks, has_pending_ticks, next_tick,
    queue_post_flush, queue_watcher, set_tick_waker,
};
pub use watcher::*;
