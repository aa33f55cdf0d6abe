#[cfg(test)]
mod tests {
    use crate::app::App;
    use crate::document::{Document, Mutation, NodeKind};
    use revue_core::{Error, RuntimeConfig, Value, set_config};
    use revue_vdom::{
        Component, Config, Constructor, LifecycleHook, NodeKey, NodeOps, OldTree, RenderCx, RenderOutput, VNode,
        h,
    };
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn setup() -> Rc<RefCell<Vec<String>>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let reports = Rc::new(RefCell::new(Vec::new()));
        let errors = reports.clone();
        let warnings = reports.clone();
        set_config(
            RuntimeConfig::default()
                .error_handler(move |e: &Error| errors.borrow_mut().push(e.to_string()))
                .warn_handler(move |w: &str| warnings.borrow_mut().push(w.to_string())),
        );
        reports
    }

    fn log_hook(log: &Rc<RefCell<Vec<String>>>, entry: &str) -> impl Fn(&Component) + 'static {
        let log = log.clone();
        let entry = entry.to_string();
        move |_: &Component| log.borrow_mut().push(entry.clone())
    }

    fn count(log: &Rc<RefCell<Vec<String>>>, entry: &str) -> usize {
        log.borrow().iter().filter(|e| *e == entry).count()
    }

    fn list(keys: &[&str]) -> VNode {
        h("ul")
            .children(keys.iter().map(|k| h("li").key(*k).text(*k)))
            .build()
    }

    fn structural(muts: &[Mutation]) -> (usize, usize, usize, usize) {
        let mut creates = 0;
        let mut inserts = 0;
        let mut moves = 0;
        let mut removes = 0;
        for m in muts {
            match m {
                Mutation::Create(_) => creates += 1,
                Mutation::Insert { .. } => inserts += 1,
                Mutation::Move { .. } => moves += 1,
                Mutation::Remove { .. } => removes += 1,
                Mutation::SetText(_) => {}
            }
        }
        (creates, inserts, moves, removes)
    }

    #[test]
    fn test_document_serializes_and_escapes() {
        let doc = Document::new();
        let div = doc.create_element("div");
        doc.append_child(doc.root(), div);
        doc.set_attr(div, "title", "a \"quoted\" <b>");
        doc.set_classes(div, vec!["card".into(), "open".into()]);
        let text = doc.create_text_node("1 < 2 & 3");
        doc.append_child(div, text);
        let note = doc.create_comment("note");
        doc.append_child(div, note);

        assert_eq!(
            doc.html(),
            "<div title=\"a &quot;quoted&quot; &lt;b&gt;\" class=\"card open\">1 &lt; 2 &amp; 3<!--note--></div>"
        );
        assert_eq!(doc.text_content(div), "1 < 2 & 3");
        assert_eq!(doc.kind(note), Some(NodeKind::Comment));
        assert_eq!(doc.find(doc.root(), "div"), Some(div));
    }

    #[test]
    fn test_reinsert_is_journaled_as_move() {
        let doc = Document::new();
        let ul = doc.create_element("ul");
        let a = doc.create_element("li");
        let b = doc.create_element("li");
        doc.append_child(ul, a);
        doc.append_child(ul, b);
        doc.take_mutations();

        doc.insert_before(ul, b, Some(a));
        assert_eq!(doc.children(ul), vec![b, a]);
        assert_eq!(doc.next_sibling(b), Some(a));
        assert_eq!(doc.take_mutations(), vec![Mutation::Move { parent: ul, node: b }]);

        doc.remove_child(ul, a);
        assert_eq!(doc.parent_node(a), None);
        assert_eq!(doc.collect(a), 1);
        assert!(!doc.contains(a));
        // Attached nodes are never freed.
        assert_eq!(doc.collect(b), 0);
    }

    #[test]
    fn test_set_text_content_replaces_element_children() {
        let doc = Document::new();
        let p = doc.create_element("p");
        let span = doc.create_element("span");
        doc.append_child(p, span);
        doc.take_mutations();

        doc.set_text_content(p, "hello");
        assert_eq!(doc.to_html(p), "<p>hello</p>");
        assert_eq!(doc.take_mutations(), vec![Mutation::SetText(p)]);
        assert_eq!(doc.parent_node(span), None);
    }

    #[test]
    fn test_append_inserts_one_node() {
        setup();
        let app = App::new();
        let patcher = app.patcher().clone();
        let doc = app.document().clone();

        let old = list(&["a", "b", "c"]);
        let ul = patcher.patch(OldTree::Empty, Some(&old), None).unwrap();
        let before = doc.children(ul);
        doc.take_mutations();

        let new = list(&["a", "b", "c", "d"]);
        patcher.patch(OldTree::Node(&old), Some(&new), None);

        let muts = doc.take_mutations();
        let into_ul = muts
            .iter()
            .filter(|m| matches!(m, Mutation::Insert { parent, .. } if *parent == ul))
            .count();
        assert_eq!(into_ul, 1);
        let (_, _, moves, removes) = structural(&muts);
        assert_eq!((moves, removes), (0, 0));
        assert_eq!(doc.children(ul)[..3], before[..]);
        assert_eq!(doc.text_content(ul), "abcd");
    }

    fn reverse_moves(keys: &[&str]) -> usize {
        let app = App::new();
        let patcher = app.patcher().clone();
        let doc = app.document().clone();

        let old = list(keys);
        let ul = patcher.patch(OldTree::Empty, Some(&old), None).unwrap();
        let mut before = doc.children(ul);
        doc.take_mutations();

        let reversed: Vec<&str> = keys.iter().rev().copied().collect();
        let new = list(&reversed);
        patcher.patch(OldTree::Node(&old), Some(&new), None);

        let (creates, inserts, moves, removes) = structural(&doc.take_mutations());
        assert_eq!((creates, inserts, removes), (0, 0, 0));
        before.reverse();
        assert_eq!(doc.children(ul), before);
        assert_eq!(doc.text_content(ul), reversed.concat());
        moves
    }

    #[test]
    fn test_reverse_only_moves_existing_nodes() {
        setup();
        assert!(reverse_moves(&["a", "b", "c"]) <= 2);
        assert!(reverse_moves(&["a", "b", "c", "d", "e"]) <= 4);
    }

    #[test]
    fn test_keyed_shuffle_with_insert_and_removal() {
        setup();
        let app = App::new();
        let patcher = app.patcher().clone();
        let doc = app.document().clone();

        let old = list(&["a", "b", "c", "d", "e"]);
        let ul = patcher.patch(OldTree::Empty, Some(&old), None).unwrap();
        let by_text: BTreeMap<String, NodeKey> =
            doc.children(ul).into_iter().map(|k| (doc.text_content(k), k)).collect();
        doc.take_mutations();

        let new = list(&["e", "x", "b", "a", "d"]);
        patcher.patch(OldTree::Node(&old), Some(&new), None);

        let kids = doc.children(ul);
        assert_eq!(doc.text_content(ul), "exbad");
        for (i, k) in ["e", "x", "b", "a", "d"].iter().enumerate() {
            if let Some(node) = by_text.get(*k) {
                assert_eq!(kids[i], *node, "`{k}` kept its node");
            }
        }
        let (creates, _, _, removes) = structural(&doc.take_mutations());
        // One <li> plus its text node for `x`; only `c` goes.
        assert_eq!((creates, removes), (2, 1));
        assert_eq!(doc.parent_node(by_text["c"]), None);
    }

    #[test]
    fn test_text_update_keeps_node_identity() {
        setup();
        let mut app = App::new();
        let ctor = Constructor::new(
            Config::new("counter")
                .data(|_| json!({ "count": 0 }).into())
                .render(|cx| cx.h("p").text(format!("count {}", cx.get("count"))).into()),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        let el = vm.el().unwrap();
        assert_eq!(app.html(), "<p>count 0</p>");
        app.document().take_mutations();

        vm.set("count", 1);
        app.tick();

        assert_eq!(vm.el(), Some(el));
        assert_eq!(app.html(), "<p>count 1</p>");
        assert_eq!(app.document().take_mutations(), vec![Mutation::SetText(el)]);
    }

    #[test]
    fn test_mount_replaces_given_target() {
        setup();
        let mut app = App::new();
        let doc = app.document().clone();
        let host = doc.create_element("main");
        doc.append_child(doc.root(), host);
        let target = doc.create_element("div");
        doc.append_child(host, target);

        let ctor = Constructor::new(Config::new("hello").render(|cx| cx.h("h1").text("hi").into()));
        let vm = app.mount(&ctor, BTreeMap::new(), Some(target)).unwrap();

        assert_eq!(doc.children(host), vec![vm.el().unwrap()]);
        assert_eq!(doc.parent_node(target), None);
        assert_eq!(app.html(), "<main><h1>hi</h1></main>");

        doc.remove_child(host, vm.el().unwrap());
        doc.collect(target);
        assert!(app.mount(&ctor, BTreeMap::new(), Some(target)).is_err());
    }

    #[test]
    fn test_mount_survives_panicking_data_factory() {
        let reports = setup();
        let mut app = App::new();
        let ctor = Constructor::new(
            Config::new("bad")
                .data(|_| panic!("boom"))
                .render(|cx| cx.h("p").text("fallback").into()),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        assert!(vm.el().is_some());
        assert_eq!(app.html(), "<p>fallback</p>");
        assert!(reports.borrow().iter().any(|r| r.contains("data hook") && r.contains("boom")));
    }

    #[test]
    fn test_attrs_class_and_style_follow_state() {
        setup();
        let mut app = App::new();
        let ctor = Constructor::new(
            Config::new("badge")
                .data(|_| json!({ "on": true }).into())
                .render(|cx| {
                    let on = cx.get("on") == Value::from(true);
                    let mut b = cx.h("span").class("badge").class_if("on", on);
                    if on {
                        b = b.attr("aria-pressed", "true").style("color", "red");
                    }
                    b.into()
                }),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        let el = vm.el().unwrap();
        let doc = app.document();
        assert_eq!(doc.classes(el), vec!["badge", "on"]);
        assert_eq!(doc.attr(el, "aria-pressed").as_deref(), Some("true"));
        assert_eq!(doc.style(el).get("color").map(String::as_str), Some("red"));

        vm.set("on", false);
        app.tick();
        assert_eq!(doc.classes(el), vec!["badge"]);
        assert_eq!(doc.attr(el, "aria-pressed"), None);
        assert!(doc.style(el).is_empty());
    }

    #[test]
    fn test_dropping_last_class_keeps_element_and_children() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let child = Constructor::new(
            Config::new("child")
                .data(|_| json!({ "clicks": 0 }).into())
                .hook(LifecycleHook::Destroyed, log_hook(&log, "child destroyed"))
                .render(|cx| cx.h("b").text(cx.get("clicks").to_string()).into()),
        );
        let ctor = Constructor::new(
            Config::new("panel")
                .component("child", child)
                .data(|_| json!({ "on": true }).into())
                .render(|cx| {
                    let on = cx.get("on") == Value::from(true);
                    cx.h("div").class_if("on", on).child(cx.h("child")).into()
                }),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        let el = vm.el().unwrap();
        let kid = vm.children()[0].clone();
        kid.set("clicks", 3);
        app.tick();
        assert_eq!(app.html(), "<div class=\"on\"><b>3</b></div>");
        app.document().take_mutations();

        vm.set("on", false);
        app.tick();
        assert_eq!(vm.el(), Some(el));
        assert!(vm.children()[0].ptr_eq(&kid));
        assert!(log.borrow().is_empty());
        assert_eq!(app.html(), "<div><b>3</b></div>");
        let (creates, inserts, moves, removes) = structural(&app.document().take_mutations());
        assert_eq!((creates, inserts, moves, removes), (0, 0, 0, 0));
    }

    #[test]
    fn test_placeholder_classes_merge_onto_child_root() {
        setup();
        let mut app = App::new();
        let button = Constructor::new(
            Config::new("fancy-button").render(|cx| cx.h("button").class("btn").text("ok").into()),
        );
        let ctor = Constructor::new(
            Config::new("form")
                .component("fancy-button", button)
                .render(|cx| cx.h("form").child(cx.h("fancy-button").class("primary")).into()),
        );
        app.mount(&ctor, BTreeMap::new(), None).unwrap();
        assert_eq!(app.html(), "<form><button class=\"btn primary\">ok</button></form>");
    }

    #[test]
    fn test_hooks_order_children_mount_first_and_update_last() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let child = Constructor::new(
            Config::new("child")
                .prop("n")
                .hook(LifecycleHook::Mounted, log_hook(&log, "child mounted"))
                .hook(LifecycleHook::BeforeUpdate, log_hook(&log, "child beforeUpdate"))
                .hook(LifecycleHook::Updated, log_hook(&log, "child updated"))
                .render(|cx| cx.h("b").text(cx.get("n").to_string()).into()),
        );
        let parent = Constructor::new(
            Config::new("parent")
                .component("child", child)
                .data(|_| json!({ "n": 0 }).into())
                .hook(LifecycleHook::Mounted, log_hook(&log, "parent mounted"))
                .hook(LifecycleHook::BeforeUpdate, log_hook(&log, "parent beforeUpdate"))
                .hook(LifecycleHook::Updated, log_hook(&log, "parent updated"))
                .render(|cx| {
                    cx.h("div")
                        .child(cx.h("i").text(cx.get("n").to_string()))
                        .child(cx.h("child").prop("n", cx.get("n")))
                        .into()
                }),
        );
        let vm = app.mount(&parent, BTreeMap::new(), None).unwrap();
        assert_eq!(*log.borrow(), vec!["child mounted", "parent mounted"]);
        assert_eq!(app.html(), "<div><i>0</i><b>0</b></div>");

        log.borrow_mut().clear();
        vm.set("n", 1);
        app.tick();
        assert_eq!(app.html(), "<div><i>1</i><b>1</b></div>");
        assert_eq!(
            *log.borrow(),
            vec!["parent beforeUpdate", "child beforeUpdate", "child updated", "parent updated"]
        );
        assert_eq!(vm.children().len(), 1);
        assert_eq!(vm.children()[0].get("n"), Value::from(1));
    }

    #[test]
    fn test_render_error_output_is_used_on_failure() {
        let reports = setup();
        let mut app = App::new();
        let ctor = Constructor::new(
            Config::new("fragile")
                .data(|_| json!({ "broken": false }).into())
                .render(|cx| {
                    if cx.get("broken") == Value::from(true) {
                        return RenderOutput::Failed("no data".into());
                    }
                    cx.h("p").text("fine").into()
                })
                .render_error(|cx, err| cx.h("pre").text(err.to_string()).into()),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        vm.set("broken", true);
        app.tick();

        assert_eq!(app.html(), "<pre>error in render for fragile: no data</pre>");
        assert!(reports.borrow().iter().any(|r| r.contains("no data")));
    }

    #[test]
    fn test_multiple_roots_render_a_comment_and_warn() {
        let reports = setup();
        let mut app = App::new();
        let ctor = Constructor::new(
            Config::new("pair").render(|cx| vec![cx.h("a").build(), cx.h("b").build()].into()),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();

        assert_eq!(app.html(), "<!---->");
        assert_eq!(app.document().kind(vm.el().unwrap()), Some(NodeKind::Comment));
        assert!(reports.borrow().iter().any(|r| r.contains("2 root nodes")));
    }

    #[test]
    fn test_dispatch_runs_listeners_and_emits() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let picker = Constructor::new(
            Config::new("picker")
                .render(|cx| cx.h("button").on("click", cx.emit_handler("pick")).text("pick").into()),
        );
        let (on_pick, on_native) = (log.clone(), log.clone());
        let ctor = Constructor::new(
            Config::new("page")
                .component("picker", picker)
                .data(|_| json!({ "clicks": 0 }).into())
                .render(move |cx| {
                    let weak = cx.vm().downgrade();
                    let on_pick = on_pick.clone();
                    let on_native = on_native.clone();
                    cx.h("div")
                        .child(
                            cx.h("span")
                                .on("click", move |_| {
                                    if let Some(vm) = weak.upgrade() {
                                        let n = vm.get("clicks").as_f64().unwrap_or_default();
                                        vm.set("clicks", n + 1.0);
                                    }
                                })
                                .text(format!("clicks {}", cx.get("clicks"))),
                        )
                        .child(
                            cx.h("picker")
                                .on("pick", move |_| on_pick.borrow_mut().push("pick".to_string()))
                                .native_on("click", move |_| on_native.borrow_mut().push("native".to_string())),
                        )
                        .into()
                }),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        let doc = app.document().clone();
        let root = vm.el().unwrap();

        let span = doc.find(root, "span").unwrap();
        assert_eq!(doc.dispatch(span, "click", &Value::Null), 1);
        app.tick();
        assert_eq!(doc.text_content(span), "clicks 1");

        let button = doc.find(root, "button").unwrap();
        assert!(doc.has_listener(button, "click"));
        assert_eq!(doc.dispatch(button, "click", &Value::Null), 2);
        assert_eq!(*log.borrow(), vec!["pick", "native"]);
        assert_eq!(doc.dispatch(button, "hover", &Value::Null), 0);
    }

    #[test]
    fn test_failing_listener_is_reported() {
        let reports = setup();
        let mut app = App::new();
        let ctor = Constructor::new(
            Config::new("bomb").render(|cx| cx.h("button").on("click", |_| panic!("boom")).into()),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        assert_eq!(app.document().dispatch(vm.el().unwrap(), "click", &Value::Null), 1);
        assert!(reports.borrow().iter().any(|r| r.contains("boom")));
    }

    #[test]
    fn test_named_and_default_slots() {
        setup();
        let mut app = App::new();
        let card = Constructor::new(Config::new("card").render(|cx| {
            cx.h("div")
                .children(cx.slot("header"))
                .child(cx.h("hr"))
                .children(cx.slot("default"))
                .into()
        }));
        let ctor = Constructor::new(
            Config::new("page")
                .component("card", card)
                .data(|_| json!({ "body": "first" }).into())
                .render(|cx| {
                    cx.h("section")
                        .child(
                            cx.h("card")
                                .child(cx.h("span").slot("header").text("H"))
                                .child(cx.text(cx.get("body").to_string())),
                        )
                        .into()
                }),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        assert_eq!(app.html(), "<section><div><span>H</span><hr></hr>first</div></section>");

        vm.set("body", "second");
        app.tick();
        assert_eq!(app.html(), "<section><div><span>H</span><hr></hr>second</div></section>");
    }

    #[test]
    fn test_root_replacement_updates_parent_el() {
        setup();
        let mut app = App::new();
        let inner = Constructor::new(
            Config::new("inner")
                .data(|_| json!({ "tag": "p" }).into())
                .render(|cx| cx.h(cx.get("tag").to_string()).text("x").into()),
        );
        let outer = Constructor::new(
            Config::new("outer")
                .component("inner", inner)
                .render(|cx| cx.h("inner").into()),
        );
        let vm = app.mount(&outer, BTreeMap::new(), None).unwrap();
        let child = vm.children()[0].clone();
        assert_eq!(vm.el(), child.el());
        assert_eq!(app.html(), "<p>x</p>");

        child.set("tag", "span");
        app.tick();
        assert_eq!(app.html(), "<span>x</span>");
        assert_eq!(vm.el(), child.el());
        assert_eq!(app.document().tag(vm.el().unwrap()).as_deref(), Some("span"));
    }

    #[test]
    fn test_unmount_destroys_tree_and_detaches() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let leaf = Constructor::new(
            Config::new("leaf")
                .hook(LifecycleHook::Destroyed, log_hook(&log, "leaf destroyed"))
                .render(|cx| cx.h("i").into()),
        );
        let ctor = Constructor::new(
            Config::new("tree")
                .component("leaf", leaf)
                .hook(LifecycleHook::Destroyed, log_hook(&log, "tree destroyed"))
                .render(|cx| cx.h("div").child(cx.h("leaf")).into()),
        );
        let vm = app.mount(&ctor, BTreeMap::new(), None).unwrap();
        let leaf_vm = vm.children()[0].clone();

        app.unmount(&vm);
        assert!(vm.is_destroyed());
        assert!(leaf_vm.is_destroyed());
        assert_eq!(*log.borrow(), vec!["leaf destroyed", "tree destroyed"]);
        assert_eq!(app.html(), "");
        assert!(app.roots().is_empty());
    }

    /// A shell switching between three views inside `<keep-alive>`.
    fn tabs(log: &Rc<RefCell<Vec<String>>>, keep_alive_props: serde_json::Value) -> Constructor {
        let view = |name: &str| {
            Constructor::new(
                Config::new(name)
                    .hook(LifecycleHook::Created, log_hook(log, &format!("{name} created")))
                    .hook(LifecycleHook::Activated, log_hook(log, &format!("{name} activated")))
                    .hook(LifecycleHook::Deactivated, log_hook(log, &format!("{name} deactivated")))
                    .hook(LifecycleHook::Destroyed, log_hook(log, &format!("{name} destroyed")))
                    .render({
                        let name = name.to_string();
                        move |cx: &RenderCx<'_>| cx.h("p").text(name.clone()).into()
                    }),
            )
        };
        let config = Config::new("shell")
            .component("x", view("x"))
            .component("y", view("y"))
            .component("z", view("z"))
            .data(move |_| {
                let mut state = json!({ "view": "x" });
                if let (Some(s), Some(extra)) = (state.as_object_mut(), keep_alive_props.as_object()) {
                    for (k, v) in extra {
                        s.insert(k.clone(), v.clone());
                    }
                }
                state.into()
            })
            .render(move |cx| {
                let view = cx.get("view").to_string();
                let mut keep_alive = cx.h("keep-alive");
                for key in ["include", "exclude", "max"] {
                    let v = cx.get(key);
                    if !v.is_null() {
                        keep_alive = keep_alive.prop(key, v);
                    }
                }
                cx.h("div")
                    .child(keep_alive.child(cx.h(view.clone()).key(view)))
                    .into()
            });
        Constructor::new(config)
    }

    #[test]
    fn test_keep_alive_reactivates_cached_instance() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let shell = app.mount(&tabs(&log, json!(null)), BTreeMap::new(), None).unwrap();
        assert_eq!(app.html(), "<div><p>x</p></div>");

        shell.set("view", "y");
        app.tick();
        assert_eq!(app.html(), "<div><p>y</p></div>");
        shell.set("view", "x");
        app.tick();
        assert_eq!(app.html(), "<div><p>x</p></div>");

        assert_eq!(count(&log, "x created"), 1);
        assert_eq!(count(&log, "x activated"), 2);
        assert_eq!(count(&log, "x deactivated"), 1);
        assert_eq!(count(&log, "y deactivated"), 1);
        assert_eq!(count(&log, "x destroyed") + count(&log, "y destroyed"), 0);
    }

    #[test]
    fn test_keep_alive_evicts_least_recently_used() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let props = json!({ "max": 2 });
        let shell = app.mount(&tabs(&log, props), BTreeMap::new(), None).unwrap();

        for view in ["y", "z"] {
            shell.set("view", view);
            app.tick();
        }
        assert_eq!(app.html(), "<div><p>z</p></div>");
        assert_eq!(count(&log, "x destroyed"), 1);
        assert_eq!(count(&log, "y destroyed") + count(&log, "z destroyed"), 0);

        // `y` is still cached: coming back does not create it again.
        shell.set("view", "y");
        app.tick();
        assert_eq!(count(&log, "y created"), 1);
        assert_eq!(count(&log, "y activated"), 2);
    }

    #[test]
    fn test_keep_alive_include_change_prunes_cache() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let props = json!({ "include": "x,y" });
        let shell = app.mount(&tabs(&log, props), BTreeMap::new(), None).unwrap();

        shell.set("view", "y");
        app.tick();
        assert_eq!(count(&log, "x deactivated"), 1);

        shell.set("include", "y");
        app.tick();
        assert_eq!(count(&log, "x destroyed"), 1);
        assert_eq!(count(&log, "y destroyed"), 0);

        // Not included any more: rendered, but destroyed when switched out.
        shell.set("view", "z");
        app.tick();
        shell.set("view", "y");
        app.tick();
        assert_eq!(count(&log, "z destroyed"), 1);
        assert_eq!(count(&log, "y created"), 1);
    }

    #[test]
    fn test_keep_alive_zero_max_is_unbounded() {
        setup();
        let mut app = App::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let shell = app.mount(&tabs(&log, json!({ "max": 0 })), BTreeMap::new(), None).unwrap();

        for view in ["y", "x", "y", "x"] {
            shell.set("view", view);
            app.tick();
        }
        assert_eq!(app.html(), "<div><p>x</p></div>");
        assert_eq!(count(&log, "x created"), 1);
        assert_eq!(count(&log, "y created"), 1);
        assert_eq!(count(&log, "x destroyed") + count(&log, "y destroyed"), 0);
        assert_eq!(shell.children().len(), 1);
        assert_eq!(shell.children()[0].children().len(), 2);
    }
}
