//! Update batching.
//!
//! Watchers dirtied during one synchronous turn are collected, deduplicated
//! and run in ascending id order on the next tick. Parents are created before
//! their children, so a parent's render watcher always runs first.
//!
//! There is no event loop in here: the host calls [`flush_ticks`] at its turn
//! boundary (optionally woken through [`set_tick_waker`]).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::config::{self, handle_error};
use crate::error::{Error, panic_message};
use crate::watcher::{Watcher, WatcherId, untracked};

/// Runs of one watcher within a single flush before it is considered runaway.
pub const MAX_UPDATE_COUNT: u32 = 100;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, u32>,
    post_flush: Vec<Rc<dyn Fn()>>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

#[derive(Default)]
struct TickQueue {
    callbacks: VecDeque<Box<dyn FnOnce()>>,
    waker: Option<Rc<dyn Fn()>>,
    pending: bool,
    draining: bool,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static TICKS: RefCell<TickQueue> = RefCell::new(TickQueue::default());
}

/// Queue `watcher` for the next flush. A watcher already pending is ignored.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule = SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        let s = &mut *state;
        if !s.has.insert(id) {
            return false;
        }
        if !s.flushing {
            let pos = s.queue.partition_point(|w| w.id() < id);
            s.queue.insert(pos, watcher);
        } else {
            // Mid-flush: slot into id order among the not-yet-run tail.
            let mut i = s.queue.len();
            while i > s.index + 1 && s.queue[i - 1].id() > id {
                i -= 1;
            }
            s.queue.insert(i, watcher);
        }
        log::trace!("queued watcher {id}");
        !std::mem::replace(&mut s.waiting, true)
    });
    if schedule {
        schedule_flush();
    }
}

/// Run `cb` after the current (or next) flush has finished patching.
pub fn queue_post_flush(cb: impl Fn() + 'static) {
    let schedule = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        s.post_flush.push(Rc::new(cb));
        !std::mem::replace(&mut s.waiting, true)
    });
    if schedule {
        schedule_flush();
    }
}

fn schedule_flush() {
    if config::config().async_updates {
        enqueue_tick(Box::new(flush_scheduler_queue));
    } else {
        flush_scheduler_queue();
    }
}

pub fn is_flushing() -> bool {
    SCHEDULER.with(|s| s.borrow().flushing)
}

pub fn has_pending() -> bool {
    SCHEDULER.with(|s| s.borrow().waiting)
}

pub fn pending_watcher_ids() -> Vec<WatcherId> {
    SCHEDULER.with(|s| s.borrow().queue.iter().map(Watcher::id).collect())
}

/// Resets the scheduler if a flush unwinds, so later ticks still run.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            if s.flushing {
                log::error!("flush aborted; resetting scheduler state");
                reset(&mut s);
            }
        });
    }
}

fn reset(s: &mut SchedulerState) -> (Vec<Watcher>, Vec<Rc<dyn Fn()>>) {
    s.index = 0;
    s.has.clear();
    s.circular.clear();
    s.waiting = false;
    s.flushing = false;
    (std::mem::take(&mut s.queue), std::mem::take(&mut s.post_flush))
}

/// Run every queued watcher, then the deferred post-flush callbacks, then the
/// `updated` callbacks in reverse run order.
pub fn flush_scheduler_queue() {
    let count = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        s.flushing = true;
        s.index = 0;
        s.queue.sort_by_key(Watcher::id);
        s.queue.len()
    });
    log::debug!("flushing {count} watcher(s)");
    let guard = FlushGuard;

    loop {
        let next = SCHEDULER.with(|s| {
            let s = s.borrow();
            s.queue.get(s.index).cloned()
        });
        let Some(watcher) = next else { break };
        let id = watcher.id();

        if watcher.is_active()
            && let Some(before) = watcher.before_hook()
        {
            untracked(|| before());
        }
        SCHEDULER.with(|s| s.borrow_mut().has.remove(&id));
        watcher.run();

        let runaway = SCHEDULER.with(|s| {
            let mut state = s.borrow_mut();
            let s = &mut *state;
            let mut runaway = false;
            if s.has.contains(&id) {
                let runs = s.circular.entry(id).or_insert(0);
                *runs += 1;
                if *runs > MAX_UPDATE_COUNT {
                    runaway = true;
                    s.has.remove(&id);
                    let tail = s.queue.split_off(s.index + 1);
                    s.queue.extend(tail.into_iter().filter(|w| w.id() != id));
                }
            }
            s.index += 1;
            runaway
        });
        if runaway {
            handle_error(Error::InfiniteUpdate {
                id,
                label: watcher.label().to_string(),
            });
        }
    }

    let (updated, post_flush) = SCHEDULER.with(|s| reset(&mut s.borrow_mut()));
    drop(guard);

    for cb in post_flush {
        cb();
    }
    for w in updated.iter().rev() {
        if w.is_active()
            && let Some(hook) = w.updated_hook()
        {
            hook();
        }
    }
}

fn enqueue_tick(cb: Box<dyn FnOnce()>) {
    let wake = TICKS.with(|t| {
        let mut t = t.borrow_mut();
        t.callbacks.push_back(cb);
        if t.pending {
            None
        } else {
            t.pending = true;
            t.waker.clone()
        }
    });
    if let Some(waker) = wake {
        waker();
    }
}

/// Defer `cb` to the next turn boundary. Panics inside it are reported.
pub fn next_tick(cb: impl FnOnce() + 'static) {
    enqueue_tick(Box::new(move || {
        if let Err(p) = catch_unwind(AssertUnwindSafe(cb)) {
            handle_error(Error::NextTick {
                message: panic_message(&*p),
            });
        }
    }));
}

/// Called once per turn when the first callback is deferred.
pub fn set_tick_waker(waker: Option<Rc<dyn Fn()>>) {
    TICKS.with(|t| t.borrow_mut().waker = waker);
}

pub fn has_pending_ticks() -> bool {
    TICKS.with(|t| !t.borrow().callbacks.is_empty())
}

/// The turn boundary: run deferred callbacks until none are left, including
/// ones queued while draining. Returns how many ran. Re-entrant calls are
/// no-ops.
pub fn flush_ticks() -> usize {
    let entered = TICKS.with(|t| !std::mem::replace(&mut t.borrow_mut().draining, true));
    if !entered {
        return 0;
    }
    struct Draining;
    impl Drop for Draining {
        fn drop(&mut self) {
            TICKS.with(|t| t.borrow_mut().draining = false);
        }
    }
    let _draining = Draining;

    let mut ran = 0;
    loop {
        let batch: Vec<Box<dyn FnOnce()>> = TICKS.with(|t| {
            let mut t = t.borrow_mut();
            t.pending = false;
            t.callbacks.drain(..).collect()
        });
        if batch.is_empty() {
            break;
        }
        for cb in batch {
            cb();
            ran += 1;
        }
    }
    ran
}
