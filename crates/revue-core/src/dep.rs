use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::watcher::{Watcher, WatcherId, WatcherInner, current_target};

pub type DepId = u64;

thread_local! {
    static NEXT_DEP_ID: Cell<DepId> = const { Cell::new(0) };
}

/// Subscriber list of one reactive property (or of a container itself).
///
/// Subscribers are kept in subscription order. Deduplication happens on the
/// watcher side, which tracks the dep ids it already holds.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

struct DepInner {
    id: DepId,
    subs: RefCell<Vec<Weak<WatcherInner>>>,
}

impl Dep {
    pub fn new() -> Self {
        let id = NEXT_DEP_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        Self(Rc::new(DepInner {
            id,
            subs: RefCell::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    pub(crate) fn add_sub(&self, watcher: &Watcher) {
        self.0.subs.borrow_mut().push(watcher.downgrade());
    }

    /// Drops `id` from the list, along with any subscribers that no longer exist.
    pub(crate) fn remove_sub(&self, id: WatcherId) {
        self.0
            .subs
            .borrow_mut()
            .retain(|s| s.upgrade().is_some_and(|w| w.id != id));
    }

    /// Subscribe the currently evaluating watcher, if any.
    pub fn depend(&self) {
        if let Some(target) = current_target() {
            target.add_dep(self);
        }
    }

    /// Mark every subscriber dirty, in subscription order.
    pub fn notify(&self) {
        let subs: Vec<Watcher> = self
            .0
            .subs
            .borrow()
            .iter()
            .filter_map(|w| w.upgrade().map(Watcher::from_inner))
            .collect();
        log::trace!("dep {} notify -> {} subscriber(s)", self.0.id, subs.len());
        for w in subs {
            w.update();
        }
    }

    pub fn subscriber_ids(&self) -> Vec<WatcherId> {
        self.0
            .subs
            .borrow()
            .iter()
            .filter_map(|w| w.upgrade().map(|w| w.id))
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_ids().len()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subs", &self.subscriber_ids())
            .finish()
    }
}
