#[cfg(test)]
mod tests {
    use crate::config::{RuntimeConfig, set_config};
    use crate::error::Error;
    use crate::observer::*;
    use crate::scheduler::*;
    use crate::watcher::*;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn state(v: serde_json::Value) -> ReactiveObject {
        reactive(v).as_object().cloned().unwrap()
    }

    fn capture_errors() -> Rc<RefCell<Vec<Error>>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        set_config(RuntimeConfig::default().error_handler(move |e| sink.borrow_mut().push(e.clone())));
        errors
    }

    fn sorted(mut ids: Vec<u64>) -> Vec<u64> {
        ids.sort();
        ids
    }

    #[test]
    fn test_dependency_set_follows_taken_branch() {
        let obj = state(json!({ "flag": true, "a": 1, "b": 2 }));
        let w = Watcher::new(
            {
                let obj = obj.clone();
                move || {
                    if obj.get("flag").truthy() {
                        obj.get("a")
                    } else {
                        obj.get("b")
                    }
                }
            },
            None,
            WatcherOptions::default(),
        );
        let flag = obj.dep_of("flag").unwrap();
        let a = obj.dep_of("a").unwrap();
        let b = obj.dep_of("b").unwrap();
        assert_eq!(sorted(w.dep_ids()), sorted(vec![flag.id(), a.id()]));

        obj.set("flag", false);
        flush_ticks();

        assert_eq!(sorted(w.dep_ids()), sorted(vec![flag.id(), b.id()]));
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_ids(), vec![w.id()]);
        assert_eq!(w.value(), Value::from(2));
    }

    #[test]
    fn test_repeated_writes_queue_once() {
        let obj = state(json!({ "count": 0 }));
        let runs = Rc::new(Cell::new(0));
        let seen = Rc::new(RefCell::new(Value::Null));
        let _w = Watcher::new(
            {
                let obj = obj.clone();
                let runs = runs.clone();
                let seen = seen.clone();
                move || {
                    runs.set(runs.get() + 1);
                    *seen.borrow_mut() = obj.get("count");
                    Value::Null
                }
            },
            None,
            WatcherOptions::default(),
        );
        assert_eq!(runs.get(), 1);

        obj.set("count", 1);
        obj.set("count", 2);
        assert_eq!(pending_watcher_ids().len(), 1);
        flush_ticks();

        assert_eq!(runs.get(), 2);
        assert_eq!(*seen.borrow(), Value::from(2));
    }

    #[test]
    fn test_flush_runs_in_id_order() {
        let obj = state(json!({ "a": 0, "b": 0 }));
        let order = Rc::new(RefCell::new(Vec::new()));
        let make = |key: &'static str, name: &'static str| {
            let obj = obj.clone();
            let order = order.clone();
            Watcher::new(
                move || {
                    order.borrow_mut().push(name);
                    obj.get(key)
                },
                None,
                WatcherOptions::default(),
            )
        };
        let parent = make("b", "parent");
        let child = make("a", "child");
        assert!(parent.id() < child.id());
        order.borrow_mut().clear();

        obj.set("a", 1);
        obj.set("b", 1);
        flush_ticks();

        assert_eq!(*order.borrow(), vec!["parent", "child"]);
    }

    #[test]
    fn test_equal_writes_do_not_notify() {
        let obj = state(json!({ "n": 1 }));
        obj.set("n", f64::NAN);
        let runs = Rc::new(Cell::new(0));
        let _w = Watcher::new(
            {
                let obj = obj.clone();
                let runs = runs.clone();
                move || {
                    runs.set(runs.get() + 1);
                    obj.get("n")
                }
            },
            None,
            WatcherOptions::default(),
        );
        obj.set("n", f64::NAN);
        flush_ticks();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let obj = state(json!({ "x": 1 }));
        let w = Watcher::new(
            {
                let obj = obj.clone();
                move || obj.get("x")
            },
            None,
            WatcherOptions::default(),
        );
        let dep = obj.dep_of("x").unwrap();
        assert_eq!(dep.subscriber_count(), 1);

        w.teardown();
        w.teardown();

        assert!(!w.is_active());
        assert_eq!(dep.subscriber_count(), 0);
        assert!(w.dep_ids().is_empty());
    }

    #[test]
    fn test_teardown_during_evaluation_drops_new_deps() {
        let obj = state(json!({ "x": 0, "y": 0 }));
        let slot: Rc<RefCell<Option<Watcher>>> = Rc::new(RefCell::new(None));
        let w = Watcher::new(
            {
                let obj = obj.clone();
                let slot = slot.clone();
                move || {
                    let x = obj.get("x");
                    if let Some(me) = slot.borrow().as_ref() {
                        me.teardown();
                    }
                    obj.get("y");
                    x
                }
            },
            None,
            WatcherOptions::default().sync(),
        );
        *slot.borrow_mut() = Some(w.clone());
        let (x, y) = (obj.dep_of("x").unwrap(), obj.dep_of("y").unwrap());
        assert_eq!((x.subscriber_count(), y.subscriber_count()), (1, 1));

        obj.set("x", 1);

        assert!(!w.is_active());
        assert_eq!((x.subscriber_count(), y.subscriber_count()), (0, 0));
        assert!(w.dep_ids().is_empty());
    }

    #[test]
    fn test_torn_down_watcher_is_skipped_mid_flush() {
        let obj = state(json!({ "x": 0 }));
        let victim_runs = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<Watcher>>> = Rc::new(RefCell::new(None));

        let _killer = watch(
            {
                let obj = obj.clone();
                move || obj.get("x")
            },
            {
                let victim = victim.clone();
                move |_, _| {
                    if let Some(v) = victim.borrow().as_ref() {
                        v.teardown();
                    }
                }
            },
            WatcherOptions::default(),
        );
        let w = Watcher::new(
            {
                let obj = obj.clone();
                let runs = victim_runs.clone();
                move || {
                    runs.set(runs.get() + 1);
                    obj.get("x")
                }
            },
            None,
            WatcherOptions::default(),
        );
        *victim.borrow_mut() = Some(w);

        obj.set("x", 1);
        flush_ticks();
        assert_eq!(victim_runs.get(), 1);
    }

    #[test]
    fn test_computed_is_lazy_and_cached() {
        let obj = state(json!({ "a": 2 }));
        let evals = Rc::new(Cell::new(0));
        let doubled = Computed::new({
            let obj = obj.clone();
            let evals = evals.clone();
            move || {
                evals.set(evals.get() + 1);
                Value::from(obj.get("a").as_f64().unwrap_or(0.0) * 2.0)
            }
        });
        assert_eq!(evals.get(), 0);
        assert_eq!(doubled.get(), Value::from(4));
        assert_eq!(doubled.get(), Value::from(4));
        assert_eq!(evals.get(), 1);

        obj.set("a", 5);
        assert!(doubled.watcher().is_dirty());
        assert_eq!(doubled.get(), Value::from(10));
        assert_eq!(evals.get(), 2);
    }

    #[test]
    fn test_computed_forwards_deps_to_reader() {
        let obj = state(json!({ "first": "Jane", "last": "Doe" }));
        let full = Computed::new({
            let obj = obj.clone();
            move || Value::from(format!("{} {}", obj.get("first"), obj.get("last")))
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _w = watch(
            {
                let full = full.clone();
                move || full.get()
            },
            {
                let seen = seen.clone();
                move |new, old| seen.borrow_mut().push(format!("{old} -> {new}"))
            },
            WatcherOptions::default(),
        );
        obj.set("last", "Roe");
        flush_ticks();
        assert_eq!(*seen.borrow(), vec!["Jane Doe -> Jane Roe".to_string()]);
    }

    #[test]
    fn test_array_mutators_notify() {
        let obj = state(json!({ "items": [1, 2, 3] }));
        let lens = Rc::new(RefCell::new(Vec::new()));
        let _w = Watcher::new(
            {
                let obj = obj.clone();
                let lens = lens.clone();
                move || {
                    let items = obj.get("items");
                    lens.borrow_mut().push(items.as_array().map(|a| a.len()).unwrap_or(0));
                    Value::Null
                }
            },
            None,
            WatcherOptions::default(),
        );
        let items = obj.peek("items").unwrap();
        let arr = items.as_array().unwrap();

        arr.push(4);
        flush_ticks();
        arr.reverse();
        flush_ticks();
        arr.set(0, 40);
        flush_ticks();
        arr.splice(0, 2, vec![]);
        flush_ticks();

        assert_eq!(*lens.borrow(), vec![3, 4, 4, 4, 2]);
        assert_eq!(items.to_json(), json!([2.0, 1.0]));
    }

    #[test]
    fn test_nested_reads_return_same_wrapper() {
        let obj = state(json!({ "user": { "name": "Ada" } }));
        let first = obj.get("user");
        let second = obj.get("user");
        assert!(first.as_object().unwrap().ptr_eq(second.as_object().unwrap()));
        assert!(first.as_object().unwrap().is_observed());
    }

    #[test]
    fn test_new_key_is_reactive_for_readers_of_missing_key() {
        let obj = state(json!({}));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _w = watch(
            {
                let obj = obj.clone();
                move || obj.get("late")
            },
            {
                let seen = seen.clone();
                move |new, _| seen.borrow_mut().push(new.clone())
            },
            WatcherOptions::default(),
        );
        obj.set("late", "here");
        flush_ticks();
        assert_eq!(*seen.borrow(), vec![Value::from("here")]);
        assert!(obj.dep_of("late").is_some());
    }

    #[test]
    fn test_deep_watcher_sees_nested_writes() {
        let obj = state(json!({ "form": { "address": { "city": "Oslo" } } }));
        let fired = Rc::new(Cell::new(0));
        let _w = watch_path(
            &Value::Object(obj.clone()),
            "form",
            {
                let fired = fired.clone();
                move |_, _| fired.set(fired.get() + 1)
            },
            WatcherOptions::default().deep(),
        );
        let address = Value::Object(obj.clone()).get_path("form.address");
        address.as_object().unwrap().set("city", "Bergen");
        flush_ticks();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_frozen_container_stays_plain() {
        let errors = capture_errors();
        let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
        let sink = warnings.clone();
        crate::config::configure(|c| {
            *c = c.clone().warn_handler(move |m| sink.borrow_mut().push(m.to_string()));
        });

        let value = Value::from(json!({ "k": 1 }));
        value.as_object().unwrap().freeze();
        assert!(observe(&value).is_none());
        value.as_object().unwrap().set("k", 2);

        assert_eq!(value.as_object().unwrap().peek("k"), Some(Value::from(1)));
        assert_eq!(warnings.borrow().len(), 1);
        assert!(errors.borrow().is_empty());
    }

    #[test]
    fn test_redirtied_watcher_reruns_in_same_flush() {
        let obj = state(json!({ "x": 0, "y": 0 }));
        let reader = Watcher::new(
            {
                let obj = obj.clone();
                move || obj.get("x")
            },
            None,
            WatcherOptions::default(),
        );
        let _writer = watch(
            {
                let obj = obj.clone();
                move || obj.get("y")
            },
            {
                let obj = obj.clone();
                move |new, _| obj.set("x", new.as_f64().unwrap_or(0.0) * 10.0)
            },
            WatcherOptions::default(),
        );

        obj.set("y", 1);
        flush_scheduler_queue();

        assert_eq!(reader.value(), Value::from(10));
        assert!(pending_watcher_ids().is_empty());
    }

    #[test]
    fn test_runaway_watcher_is_reported() {
        let errors = capture_errors();
        let obj = state(json!({ "n": 0 }));
        let _w = watch(
            {
                let obj = obj.clone();
                move || obj.get("n")
            },
            {
                let obj = obj.clone();
                move |new, _| obj.set("n", new.as_f64().unwrap_or(0.0) + 1.0)
            },
            WatcherOptions::default(),
        );
        obj.set("n", 1);
        flush_ticks();

        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::InfiniteUpdate { .. }));
    }

    #[test]
    fn test_failing_user_watcher_does_not_abort_flush() {
        let errors = capture_errors();
        let obj = state(json!({ "x": 0 }));
        let _bad = watch(
            {
                let obj = obj.clone();
                move || obj.get("x")
            },
            |_, _| panic!("boom"),
            WatcherOptions::default(),
        );
        let good = Watcher::new(
            {
                let obj = obj.clone();
                move || obj.get("x")
            },
            None,
            WatcherOptions::default(),
        );
        obj.set("x", 3);
        flush_ticks();

        assert_eq!(good.value(), Value::from(3));
        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Error::WatcherCallback { message, .. } if message == "boom"));
    }

    #[test]
    fn test_post_flush_then_updated_in_reverse() {
        let obj = state(json!({ "x": 0 }));
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = |name: &'static str| {
            let obj = obj.clone();
            let log = log.clone();
            Watcher::new(
                move || obj.get("x"),
                None,
                WatcherOptions::default().updated({
                    let log = log.clone();
                    move || log.borrow_mut().push(format!("updated:{name}"))
                }),
            )
        };
        let _parent = make("parent");
        let _child = make("child");

        obj.set("x", 1);
        queue_post_flush({
            let log = log.clone();
            move || log.borrow_mut().push("activated".to_string())
        });
        flush_ticks();

        assert_eq!(
            *log.borrow(),
            vec!["activated", "updated:child", "updated:parent"]
        );
    }

    #[test]
    fn test_sync_updates_without_ticks() {
        set_config(RuntimeConfig::default().async_updates(false));
        let obj = state(json!({ "x": 0 }));
        let w = Watcher::new(
            {
                let obj = obj.clone();
                move || obj.get("x")
            },
            None,
            WatcherOptions::default(),
        );
        obj.set("x", 7);
        assert_eq!(w.value(), Value::from(7));
        assert!(!has_pending_ticks());
    }

    #[test]
    fn test_next_tick_panics_are_reported() {
        let errors = capture_errors();
        let ran = Rc::new(Cell::new(false));
        next_tick(|| panic!("tick failed"));
        next_tick({
            let ran = ran.clone();
            move || ran.set(true)
        });
        assert_eq!(flush_ticks(), 2);
        assert!(ran.get());
        assert!(matches!(errors.borrow()[0], Error::NextTick { .. }));
    }

    #[test]
    fn test_untracked_reads_do_not_subscribe() {
        let obj = state(json!({ "a": 1, "b": 2 }));
        let w = Watcher::new(
            {
                let obj = obj.clone();
                move || {
                    let _ = untracked(|| obj.get("b"));
                    obj.get("a")
                }
            },
            None,
            WatcherOptions::default(),
        );
        assert_eq!(w.dep_ids(), vec![obj.dep_of("a").unwrap().id()]);
    }

    #[test]
    fn test_json_round_trip_keeps_shape() {
        let value = reactive(json!({ "list": [1, "two", null], "ok": true }));
        assert_eq!(
            value.to_json(),
            json!({ "list": [1.0, "two", null], "ok": true })
        );
        assert_eq!(value.get_path("list.1").as_str(), Some("two"));
        assert_eq!(format!("{}", value.get_path("list.0")), "1");
    }
}
