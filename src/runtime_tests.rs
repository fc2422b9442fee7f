//! Runtime simulator scenarios: converted markup driven through page and
//! component lifecycles, setData, the scheduler and event dispatch.

#[cfg(test)]
mod tests {
    use crate::config::SimulatorConfig;
    use crate::dom::{self, find_by_id, is_visible, text_content};
    use crate::error::RuntimeError;
    use crate::render::OWNER_ATTR;
    use crate::runtime::{
        ComponentDefinition, ComponentInstance, Event, PageDefinition, PageInstance, PageState,
        Simulator,
    };
    use crate::wxml;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    type Log = Rc<RefCell<Vec<String>>>;

    fn new_log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.borrow().clone()
    }

    /// A page definition that records every lifecycle hook as `name:hook`.
    fn tracked(name: &str, log: &Log) -> PageDefinition {
        let hook = |suffix: &str| {
            let log = log.clone();
            let entry = format!("{}:{}", name, suffix);
            move |_: &mut PageInstance| log.borrow_mut().push(entry.clone())
        };
        let load_log = log.clone();
        let load_name = name.to_string();
        PageDefinition::new()
            .on_load(move |_, options| {
                let entry = match options.get("id").and_then(Value::as_str) {
                    Some(id) => format!("{}:load {}", load_name, id),
                    None => format!("{}:load", load_name),
                };
                load_log.borrow_mut().push(entry)
            })
            .on_show(hook("show"))
            .on_ready(hook("ready"))
            .on_hide(hook("hide"))
            .on_unload(hook("unload"))
    }

    fn owner_clones(root: &markup5ever_rcdom::Handle) -> Vec<markup5ever_rcdom::Handle> {
        dom::descendants(root)
            .into_iter()
            .filter(|n| dom::has_attr(n, OWNER_ATTR))
            .collect()
    }

    fn texts(page: &PageInstance) -> Vec<String> {
        owner_clones(page.root()).iter().map(text_content).collect()
    }

    fn clone_styles(page: &PageInstance) -> Vec<(bool, String)> {
        owner_clones(page.root())
            .iter()
            .map(|n| (is_visible(n), dom::get_attr(n, "style").unwrap_or_default()))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // setData
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_conditional_toggle_is_visible_in_callback() {
        let markup = wxml::convert(
            r#"<view id="yes" wx:if="{{show}}">Y</view><view id="no" wx:else>N</view>"#,
        );
        let mut sim = Simulator::new(SimulatorConfig::default());
        let page = sim
            .register_page(
                "pages/home/index",
                &markup,
                PageDefinition::new().with_data(json!({ "show": true })),
            )
            .unwrap();

        let root = page.root().clone();
        assert!(is_visible(&find_by_id(&root, "yes").unwrap()));
        assert!(!is_visible(&find_by_id(&root, "no").unwrap()));

        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        page.set_data_with(json!({ "show": false }), move |page| {
            let yes = is_visible(&page.find_by_id("yes").unwrap());
            let no = is_visible(&page.find_by_id("no").unwrap());
            *sink.borrow_mut() = Some((yes, no));
        })
        .unwrap();
        assert_eq!(*seen.borrow(), Some((false, true)));
    }

    #[test]
    fn test_empty_patch_changes_nothing() {
        let markup = wxml::convert(r#"<view><text id="n">{{count}}</text></view>"#);
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_page(
            "pages/home/index",
            &markup,
            PageDefinition::new().with_data(json!({ "count": 2 })),
        )
        .unwrap();

        let before = sim.render_html("pages/home/index").unwrap();
        let page = sim.page_mut("pages/home/index").unwrap();
        let data_before = page.data().clone();
        let mut called = false;
        page.set_data_with(json!({}), |_| called = true).unwrap();
        assert!(called);
        assert_eq!(page.data(), &data_before);
        assert_eq!(sim.render_html("pages/home/index").unwrap(), before);
    }

    #[test]
    fn test_nested_path_and_invalid_patch() {
        let markup = wxml::convert(r#"<text id="name">{{user.name}}</text>"#);
        let mut sim = Simulator::new(SimulatorConfig::default());
        let page = sim
            .register_page(
                "pages/profile/index",
                &markup,
                PageDefinition::new().with_data(json!({ "user": { "name": "Ann", "age": 3 } })),
            )
            .unwrap();

        page.set_data(json!({ "user.name": "Bo" })).unwrap();
        assert_eq!(page.data()["user"], json!({ "name": "Bo", "age": 3 }));
        assert_eq!(text_content(&page.find_by_id("name").unwrap()), "Bo");

        assert_eq!(
            page.set_data(json!("nope")),
            Err(RuntimeError::InvalidPatch("string".to_string()))
        );
    }

    #[test]
    fn test_list_follows_array_length() {
        let markup = wxml::convert(
            r#"<view id="list"><view wx:for="{{items}}" wx:key="id"><text>{{item.name}}</text></view></view>"#,
        );
        let mut sim = Simulator::new(SimulatorConfig::default());
        let page = sim
            .register_page(
                "pages/home/index",
                &markup,
                PageDefinition::new()
                    .with_data(json!({ "items": [{ "id": 1, "name": "a" }, { "id": 2, "name": "b" }] })),
            )
            .unwrap();

        assert_eq!(texts(page), vec!["a", "b"]);

        page.set_data(json!({ "items": [{ "id": 3, "name": "c" }] })).unwrap();
        assert_eq!(texts(page), vec!["c"]);

        page.set_data(json!({ "items": [] })).unwrap();
        assert!(texts(page).is_empty());
    }

    #[test]
    fn test_list_item_conditions_survive_bound_style() {
        let markup = wxml::convert(
            r#"<view wx:for="{{items}}" wx:if="{{item.on}}" hidden="{{item.h}}" style="color: {{item.c}}"></view>"#,
        );
        let mut sim = Simulator::new(SimulatorConfig::default());
        let page = sim
            .register_page(
                "pages/home/index",
                &markup,
                PageDefinition::new().with_data(json!({ "items": [
                    { "on": true, "h": false, "c": "red" },
                    { "on": false, "h": false, "c": "blue" },
                    { "on": true, "h": true, "c": "green" },
                ] })),
            )
            .unwrap();

        let rows = clone_styles(page);
        assert_eq!(
            rows.iter().map(|(visible, _)| *visible).collect::<Vec<_>>(),
            vec![true, false, false]
        );
        for ((_, style), color) in rows.iter().zip(["red", "blue", "green"]) {
            assert!(style.contains(&format!("color: {}", color)), "{}", style);
        }

        page.set_data(json!({ "items[1].on": true })).unwrap();
        assert_eq!(
            clone_styles(page).iter().map(|(visible, _)| *visible).collect::<Vec<_>>(),
            vec![true, true, false]
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_page_lifecycle_order() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());

        sim.register_page("pages/a/index?id=1", "<div></div>", tracked("a", &log))
            .unwrap();
        assert_eq!(entries(&log), vec!["a:load 1"]);
        assert_eq!(sim.current_page().map(|p| p.state()), Some(PageState::Loaded));

        assert_eq!(sim.run_pending(), 2);
        assert_eq!(sim.current_page().map(|p| p.state()), Some(PageState::Shown));

        sim.register_page("pages/b/index", "<div></div>", tracked("b", &log))
            .unwrap();
        sim.run_pending();
        sim.navigate_back().unwrap();
        sim.run_pending();

        assert_eq!(
            entries(&log),
            vec![
                "a:load 1", "a:show", "a:ready", "a:hide", "b:load", "b:show", "b:ready",
                "b:unload", "a:show",
            ]
        );
        assert_eq!(sim.routes(), vec!["pages/a/index"]);
        assert_eq!(sim.navigate_back(), Err(RuntimeError::NoPreviousPage));
    }

    #[test]
    fn test_stale_tasks_are_skipped() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());

        sim.register_page("pages/a/index", "<div></div>", tracked("a", &log))
            .unwrap();
        sim.register_page("pages/b/index", "<div></div>", tracked("b", &log))
            .unwrap();
        assert_eq!(sim.run_pending(), 4);
        sim.navigate_back().unwrap();
        sim.run_pending();

        assert_eq!(
            entries(&log),
            vec!["a:load", "b:load", "b:show", "b:ready", "b:unload", "a:show", "a:ready"]
        );
    }

    #[test]
    fn test_reregistering_a_route_replaces_it() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());

        sim.register_page("pages/a/index?id=1", "<div></div>", tracked("a", &log))
            .unwrap();
        sim.register_page("pages/a/index?id=2", "<div></div>", tracked("a", &log))
            .unwrap();
        sim.run_pending();

        assert_eq!(
            entries(&log),
            vec!["a:load 1", "a:unload", "a:load 2", "a:show", "a:ready"]
        );
        assert_eq!(sim.routes(), vec!["pages/a/index"]);
    }

    #[test]
    fn test_work_queued_during_a_turn_waits() {
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_component(
            "late-card",
            ComponentDefinition::new().with_template("<span>x</span>"),
        );
        sim.register_page(
            "pages/a/index",
            &wxml::convert(r#"<view><late-card wx:for="{{cards}}"></late-card></view>"#),
            PageDefinition::new()
                .with_data(json!({ "cards": [] }))
                .on_ready(|page| page.set_data(json!({ "cards": [1] })).unwrap()),
        )
        .unwrap();

        // show and ready; the card mounted by onReady is ready a turn later
        assert_eq!(sim.run_pending(), 2);
        assert_eq!(sim.current_page().unwrap().components().len(), 1);
        assert_eq!(sim.run_pending(), 1);
        assert_eq!(sim.run_pending(), 0);
    }

    #[test]
    fn test_background_and_foreground() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_page("pages/a/index", "<div></div>", tracked("a", &log))
            .unwrap();
        sim.run_pending();

        sim.enter_background();
        sim.enter_foreground();
        assert_eq!(
            entries(&log),
            vec!["a:load", "a:show", "a:ready", "a:hide", "a:show"]
        );
    }

    #[test]
    fn test_teardown_unloads_every_page() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_page("pages/a/index", "<div></div>", tracked("a", &log))
            .unwrap();
        sim.register_page("pages/b/index", "<div></div>", tracked("b", &log))
            .unwrap();
        sim.teardown();

        assert_eq!(entries(&log), vec!["a:load", "b:load", "b:unload", "a:unload"]);
        assert!(sim.routes().is_empty());
        assert_eq!(sim.run_pending(), 0);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // TICK
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_tick_renders_per_elapsed_interval() {
        let markup = wxml::convert(r#"<user-card id="card"></user-card>"#);
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_page("pages/home/index", &markup, PageDefinition::new())
            .unwrap();
        assert!(sim.current_page().unwrap().components().is_empty());

        assert_eq!(sim.tick(Duration::from_millis(500)), 0);

        sim.register_component(
            "user-card",
            ComponentDefinition::new().with_template(r#"<span id="inner">hi</span>"#),
        );
        assert_eq!(sim.tick(Duration::from_millis(600)), 1);

        let page = sim.current_page().unwrap();
        assert_eq!(page.components().len(), 1);
        assert_eq!(text_content(&page.find_by_id("inner").unwrap()), "hi");

        assert_eq!(sim.tick(Duration::from_millis(2500)), 2);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // EVENTS
    // ═══════════════════════════════════════════════════════════════════════════════

    fn event_page(log: &Log) -> PageDefinition {
        let record = |name: &'static str| {
            let log = log.clone();
            move |_: &mut PageInstance, e: &Event| {
                log.borrow_mut()
                    .push(format!("{} target={} current={}", name, e.target.id, e.current_target.id))
            }
        };
        let dataset_log = log.clone();
        PageDefinition::new()
            .with_data(json!({ "count": 0 }))
            .method("onOuter", record("outer"))
            .method("onMiddle", record("middle"))
            .method("onInner", move |page, e| {
                dataset_log.borrow_mut().push(format!("inner detail={}", e.detail));
                let next = page.data()["count"].as_i64().unwrap_or(0) + 1;
                page.set_data(json!({ "count": next })).unwrap();
            })
    }

    const EVENT_MARKUP: &str = r#"<view id="outer" bindtap="onOuter"><view id="middle" catchtap="onMiddle"><view id="inner" bindtap="onInner">x</view></view><text id="label" data-user-id="42">u</text><text id="count">{{count}}</text></view>"#;

    #[test]
    fn test_catch_stops_bubbling() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_page("pages/home/index", &wxml::convert(EVENT_MARKUP), event_page(&log))
            .unwrap();

        let handled = sim
            .dispatch("pages/home/index", "inner", "tap", json!({ "x": 1 }))
            .unwrap();
        assert_eq!(handled, 2);
        assert_eq!(
            entries(&log),
            vec![r#"inner detail={"x":1}"#, "middle target=inner current=middle"]
        );

        let page = sim.page("pages/home/index").unwrap();
        assert_eq!(text_content(&page.find_by_id("count").unwrap()), "1");
    }

    #[test]
    fn test_bubbling_reaches_ancestor_with_dataset() {
        let mut sim = Simulator::new(SimulatorConfig::default());
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        sim.register_page(
            "pages/home/index",
            &wxml::convert(EVENT_MARKUP),
            PageDefinition::new().method("onOuter", move |_, e| {
                *sink.borrow_mut() = Some(e.clone());
            }),
        )
        .unwrap();

        let handled = sim
            .dispatch("pages/home/index", "label", "tap", Value::Null)
            .unwrap();
        assert_eq!(handled, 1);

        let event = seen.borrow().clone().unwrap();
        assert_eq!(event.event_type, "tap");
        assert_eq!(event.target.id, "label");
        assert_eq!(event.target.dataset["userId"], json!("42"));
        assert_eq!(event.current_target.id, "outer");
    }

    #[test]
    fn test_dispatch_errors() {
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_page(
            "pages/home/index",
            &wxml::convert(EVENT_MARKUP),
            PageDefinition::new(),
        )
        .unwrap();

        assert_eq!(
            sim.dispatch("pages/missing", "inner", "tap", Value::Null),
            Err(RuntimeError::UnknownRoute("pages/missing".to_string()))
        );
        assert_eq!(
            sim.dispatch("pages/home/index", "ghost", "tap", Value::Null),
            Err(RuntimeError::UnknownElement {
                route: "pages/home/index".to_string(),
                id: "ghost".to_string()
            })
        );
        assert_eq!(
            sim.dispatch("pages/home/index", "inner", "tap", Value::Null),
            Err(RuntimeError::UnknownHandler {
                route: "pages/home/index".to_string(),
                handler: "onInner".to_string()
            })
        );
        // no handler for this event type anywhere on the path
        assert_eq!(
            sim.dispatch("pages/home/index", "inner", "longpress", Value::Null),
            Ok(0)
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPONENTS
    // ═══════════════════════════════════════════════════════════════════════════════

    fn card_definition(log: &Log) -> ComponentDefinition {
        let hook = |name: &'static str| {
            let log = log.clone();
            move |c: &mut ComponentInstance| {
                log.borrow_mut().push(format!("{}:{}", c.tag(), name))
            }
        };
        ComponentDefinition::new()
            .with_template(&wxml::convert(
                r#"<view id="card-btn" bindtap="onTap"><text id="card-name">{{name}}</text><text id="card-taps">{{taps}}</text></view>"#,
            ))
            .with_properties(json!({ "name": "", "maxCount": 0 }))
            .with_data(json!({ "taps": 0 }))
            .created(hook("created"))
            .attached(hook("attached"))
            .ready(hook("ready"))
            .detached(hook("detached"))
            .method("onTap", |c, _| {
                let taps = c.data()["taps"].as_i64().unwrap_or(0) + 1;
                c.set_data(json!({ "taps": taps })).unwrap();
            })
    }

    #[test]
    fn test_component_lifecycle_and_properties() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_component("user-card", card_definition(&log));

        let markup = wxml::convert(
            r#"<view><user-card id="card" name="{{user}}" max-count="3"></user-card></view>"#,
        );
        let page = sim
            .register_page(
                "pages/home/index",
                &markup,
                PageDefinition::new().with_data(json!({ "user": "Ann" })),
            )
            .unwrap();

        assert_eq!(page.components().len(), 1);
        let card = &page.components()[0];
        assert_eq!(card.data()["name"], json!("Ann"));
        assert_eq!(card.properties()["maxCount"], json!(3.0));
        assert_eq!(text_content(&page.find_by_id("card-name").unwrap()), "Ann");
        assert_eq!(entries(&log), vec!["user-card:created", "user-card:attached"]);

        page.set_data(json!({ "user": "Bo" })).unwrap();
        assert_eq!(page.components()[0].data()["name"], json!("Bo"));
        assert_eq!(text_content(&page.find_by_id("card-name").unwrap()), "Bo");

        sim.run_pending();
        assert_eq!(
            entries(&log),
            vec!["user-card:created", "user-card:attached", "user-card:ready"]
        );

        sim.teardown();
        assert_eq!(entries(&log).last().map(String::as_str), Some("user-card:detached"));
    }

    #[test]
    fn test_component_handles_its_own_events() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_component("user-card", card_definition(&log));
        sim.register_page(
            "pages/home/index",
            &wxml::convert(r#"<user-card name="{{user}}"></user-card>"#),
            PageDefinition::new().with_data(json!({ "user": "Ann" })),
        )
        .unwrap();

        let handled = sim
            .dispatch("pages/home/index", "card-btn", "tap", Value::Null)
            .unwrap();
        assert_eq!(handled, 1);

        let page = sim.page("pages/home/index").unwrap();
        assert_eq!(page.components()[0].data()["taps"], json!(1));
        assert_eq!(text_content(&page.find_by_id("card-taps").unwrap()), "1");
    }

    #[test]
    fn test_vanished_host_detaches_component() {
        let log = new_log();
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_component("user-card", card_definition(&log));
        let page = sim
            .register_page(
                "pages/home/index",
                &wxml::convert(r#"<view><user-card wx:for="{{users}}" name="{{item}}"></user-card></view>"#),
                PageDefinition::new().with_data(json!({ "users": ["a", "b"] })),
            )
            .unwrap();
        assert_eq!(page.components().len(), 2);

        page.set_data(json!({ "users": [] })).unwrap();
        assert!(page.components().is_empty());
        let detached = entries(&log)
            .iter()
            .filter(|e| e.ends_with(":detached"))
            .count();
        assert_eq!(detached, 2);
    }

    #[test]
    fn test_host_api_is_shared_between_pages() {
        let mut sim = Simulator::new(SimulatorConfig::default());
        sim.register_page(
            "pages/a/index",
            "<div></div>",
            PageDefinition::new().on_load(|page, _| {
                page.host_api()
                    .storage
                    .set_storage_sync("token", json!("t-1"));
            }),
        )
        .unwrap();

        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        sim.register_page(
            "pages/b/index",
            "<div></div>",
            PageDefinition::new().on_load(move |page, _| {
                *sink.borrow_mut() = page.host_api().storage.get_storage_sync("token").cloned();
            }),
        )
        .unwrap();
        assert_eq!(*seen.borrow(), Some(json!("t-1")));
    }
}
