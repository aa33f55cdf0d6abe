use std::collections::BTreeMap;

use revue_core::{RuntimeConfig, Value, set_config};
use revue_dom::App;
use revue_vdom::{Config, Constructor, LifecycleHook, RenderCx, RenderOutput};
use serde_json::json;

fn counter() -> Constructor {
    Constructor::new(
        Config::new("counter")
            .prop_default("step", 1)
            .data(|_| json!({ "count": 0 }).into())
            .computed("label", |vm| Value::from(format!("Count: {}", vm.get("count"))))
            .hook(LifecycleHook::Activated, |vm| log::info!("counter {} activated", vm.uid()))
            .hook(LifecycleHook::Deactivated, |vm| log::info!("counter {} deactivated", vm.uid()))
            .render(|cx| {
                let weak = cx.vm().downgrade();
                cx.h("div")
                    .class("counter")
                    .child(cx.h("span").text(cx.get("label").to_string()))
                    .child(
                        cx.h("button")
                            .attr("id", "increment")
                            .on("click", move |_| {
                                if let Some(vm) = weak.upgrade() {
                                    let n = vm.get("count").as_f64().unwrap_or_default();
                                    let step = vm.get("step").as_f64().unwrap_or(1.0);
                                    vm.set("count", n + step);
                                }
                            })
                            .text("+"),
                    )
                    .into()
            }),
    )
}

fn about() -> Constructor {
    Constructor::new(Config::new("about").render(|cx| cx.h("p").text("A tiny reactive runtime.").into()))
}

fn tabs(cx: &RenderCx<'_>) -> RenderOutput {
    let tab = cx.get("tab").to_string();
    let select = |name: &'static str| {
        let weak = cx.vm().downgrade();
        cx.h("button")
            .class_if("selected", tab == name)
            .on("click", move |_| {
                if let Some(vm) = weak.upgrade() {
                    vm.set("tab", name);
                }
            })
            .text(name)
    };
    cx.h("main")
        .child(cx.h("nav").child(select("counter")).child(select("about")))
        .child(
            cx.h("keep-alive")
                .prop("max", 4)
                .child(cx.h(tab.clone()).key(tab).prop("step", 2)),
        )
        .into()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    set_config(RuntimeConfig::default().performance(true));

    let shell = Constructor::new(
        Config::new("shell")
            .component("counter", counter())
            .component("about", about())
            .data(|_| json!({ "tab": "counter" }).into())
            .render(tabs),
    );

    let mut app = App::new();
    let root = app.mount(&shell, BTreeMap::new(), None)?;
    log::info!("{}", app.html());

    let doc = app.document().clone();
    let el = root.el().ok_or_else(|| anyhow::anyhow!("shell has no element"))?;
    for _ in 0..3 {
        let button = doc
            .find_all(el, "button")
            .into_iter()
            .find(|b| doc.attr(*b, "id").as_deref() == Some("increment"))
            .ok_or_else(|| anyhow::anyhow!("no increment button"))?;
        doc.dispatch(button, "click", &Value::Null);
        app.tick();
    }
    log::info!("{}", app.html());

    // Switch away and back: the counter keeps its state.
    for tab in ["about", "counter"] {
        root.set("tab", tab);
        app.tick();
        log::info!("{}", app.html());
    }
    println!("{}", app.html());
    Ok(())
}
