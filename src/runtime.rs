//! Runtime Simulator
//!
//! Re-implements enough of the Mini Program object model to make converted
//! markup interactive: app/page/component registration, lifecycle ordering,
//! `setData` with synchronous re-rendering, event dispatch and a deferred
//! task queue standing in for the host event loop.
//!
//! All state hangs off an explicit [`Simulator`] value; several simulators
//! can coexist in one process (one per test, say).

use lazy_static::lazy_static;
use markup5ever_rcdom::Handle;
use regex::Regex;
use serde_json::{Map, Value};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::config::SimulatorConfig;
use crate::dom;
use crate::error::RuntimeError;
use crate::expression::apply_patch;
use crate::host::Host;
use crate::render::{self, camel_case, HostBinding, COMPONENT_ATTR};

lazy_static! {
    static ref DISPATCH_RE: Regex =
        Regex::new(r"wxDispatch\(event,\s*'([^']*)',\s*'((?:[^'\\]|\\.)*)',\s*(true|false)\)")
            .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct EventTarget {
    pub id: String,
    /// `data-*` attributes of the element, camelCased.
    pub dataset: Map<String, Value>,
}

impl EventTarget {
    fn of(node: &Handle) -> Self {
        let mut dataset = Map::new();
        for (name, value) in dom::attributes(node) {
            let Some(key) = name.strip_prefix("data-") else {
                continue;
            };
            if is_metadata_key(key) {
                continue;
            }
            dataset.insert(camel_case(key), Value::String(value));
        }
        EventTarget {
            id: dom::get_attr(node, "id").unwrap_or_default(),
            dataset,
        }
    }
}

fn is_metadata_key(key: &str) -> bool {
    key == "expression" || key == "component" || key.starts_with("bind-") || key.starts_with("wx-")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub detail: Value,
    pub target: EventTarget,
    pub current_target: EventTarget,
}

/// A converted event attribute: which handler to run and whether it stops
/// propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Listener {
    handler: String,
    catching: bool,
}

fn handler_for(node: &Handle, event_type: &str) -> Option<Listener> {
    dom::attributes(node)
        .into_iter()
        .filter(|(name, _)| name.starts_with("on"))
        .find_map(|(_, value)| {
            let caps = DISPATCH_RE.captures(&value)?;
            (&caps[1] == event_type).then(|| Listener {
                handler: caps[2].replace("\\'", "'"),
                catching: &caps[3] == "true",
            })
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════════

pub type PageHook = Box<dyn FnMut(&mut PageInstance)>;
pub type LoadHook = Box<dyn FnMut(&mut PageInstance, &Map<String, Value>)>;
pub type PageMethod = Box<dyn FnMut(&mut PageInstance, &Event)>;

/// Everything a page registers: initial data, lifecycle hooks and event
/// handlers. Every field is optional.
#[derive(Default)]
pub struct PageDefinition {
    pub data: Map<String, Value>,
    pub on_load: Option<LoadHook>,
    pub on_show: Option<PageHook>,
    pub on_ready: Option<PageHook>,
    pub on_hide: Option<PageHook>,
    pub on_unload: Option<PageHook>,
    pub methods: HashMap<String, PageMethod>,
}

impl PageDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial data. Anything but an object is ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    pub fn on_load(mut self, f: impl FnMut(&mut PageInstance, &Map<String, Value>) + 'static) -> Self {
        self.on_load = Some(Box::new(f));
        self
    }

    pub fn on_show(mut self, f: impl FnMut(&mut PageInstance) + 'static) -> Self {
        self.on_show = Some(Box::new(f));
        self
    }

    pub fn on_ready(mut self, f: impl FnMut(&mut PageInstance) + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    pub fn on_hide(mut self, f: impl FnMut(&mut PageInstance) + 'static) -> Self {
        self.on_hide = Some(Box::new(f));
        self
    }

    pub fn on_unload(mut self, f: impl FnMut(&mut PageInstance) + 'static) -> Self {
        self.on_unload = Some(Box::new(f));
        self
    }

    pub fn method(
        mut self,
        name: &str,
        f: impl FnMut(&mut PageInstance, &Event) + 'static,
    ) -> Self {
        self.methods.insert(name.to_string(), Box::new(f));
        self
    }
}

pub type ComponentHook = Rc<dyn Fn(&mut ComponentInstance)>;
pub type ComponentMethod = Rc<dyn Fn(&mut ComponentInstance, &Event)>;

/// A component behaviour, shared by every instance of its tag.
#[derive(Default, Clone)]
pub struct ComponentDefinition {
    /// Converted markup mounted into each host element.
    pub template: Option<String>,
    /// Declared properties and their defaults. Host attributes only flow
    /// into declared properties unless none are declared.
    pub properties: Map<String, Value>,
    pub data: Map<String, Value>,
    pub created: Option<ComponentHook>,
    pub attached: Option<ComponentHook>,
    pub ready: Option<ComponentHook>,
    pub detached: Option<ComponentHook>,
    pub methods: HashMap<String, ComponentMethod>,
}

impl ComponentDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, markup: &str) -> Self {
        self.template = Some(markup.to_string());
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.properties = map;
        }
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    pub fn created(mut self, f: impl Fn(&mut ComponentInstance) + 'static) -> Self {
        self.created = Some(Rc::new(f));
        self
    }

    pub fn attached(mut self, f: impl Fn(&mut ComponentInstance) + 'static) -> Self {
        self.attached = Some(Rc::new(f));
        self
    }

    pub fn ready(mut self, f: impl Fn(&mut ComponentInstance) + 'static) -> Self {
        self.ready = Some(Rc::new(f));
        self
    }

    pub fn detached(mut self, f: impl Fn(&mut ComponentInstance) + 'static) -> Self {
        self.detached = Some(Rc::new(f));
        self
    }

    pub fn method(
        mut self,
        name: &str,
        f: impl Fn(&mut ComponentInstance, &Event) + 'static,
    ) -> Self {
        self.methods.insert(name.to_string(), Rc::new(f));
        self
    }

    /// Match a host property name to a declared one. html5ever lowercases
    /// attribute names, so `maxCount` arrives as `maxcount`.
    fn declared_name(&self, name: &str) -> Option<String> {
        if self.properties.is_empty() {
            return Some(name.to_string());
        }
        let wanted = name.replace('-', "").to_lowercase();
        self.properties
            .keys()
            .find(|k| k.replace('-', "").to_lowercase() == wanted)
            .cloned()
    }

    /// Coerce an attribute value to the type of the declared default.
    fn coerce(&self, name: &str, value: Value) -> Value {
        match (self.properties.get(name), value) {
            (Some(Value::Number(_)), Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            (Some(Value::Bool(_)), Value::String(s)) => Value::Bool(!s.is_empty() && s != "false"),
            (_, value) => value,
        }
    }
}

pub type AppLaunchHook = Box<dyn FnMut(&mut AppInstance, &Map<String, Value>)>;
pub type AppHook = Box<dyn FnMut(&mut AppInstance)>;

#[derive(Default)]
pub struct AppDefinition {
    pub global_data: Map<String, Value>,
    pub on_launch: Option<AppLaunchHook>,
    pub on_show: Option<AppHook>,
    pub on_hide: Option<AppHook>,
}

impl AppDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.global_data = map;
        }
        self
    }

    pub fn on_launch(mut self, f: impl FnMut(&mut AppInstance, &Map<String, Value>) + 'static) -> Self {
        self.on_launch = Some(Box::new(f));
        self
    }

    pub fn on_show(mut self, f: impl FnMut(&mut AppInstance) + 'static) -> Self {
        self.on_show = Some(Box::new(f));
        self
    }

    pub fn on_hide(mut self, f: impl FnMut(&mut AppInstance) + 'static) -> Self {
        self.on_hide = Some(Box::new(f));
        self
    }
}

#[derive(Default)]
pub struct AppInstance {
    pub global_data: Map<String, Value>,
    launched: bool,
    on_show: Option<AppHook>,
    on_hide: Option<AppHook>,
}

impl AppInstance {
    pub fn is_launched(&self) -> bool {
        self.launched
    }

    fn show(&mut self) {
        if let Some(mut hook) = self.on_show.take() {
            hook(self);
            self.on_show = Some(hook);
        }
    }

    fn hide(&mut self) {
        if let Some(mut hook) = self.on_hide.take() {
            hook(self);
            self.on_hide = Some(hook);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════════

/// Deferred lifecycle work. Tasks name the page generation they were
/// scheduled for; once that instance is gone they do nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Task {
    PageShow { route: String, generation: u64 },
    PageReady { route: String, generation: u64 },
    ComponentReady { id: usize },
}

/// State shared by a simulator and every instance it created.
#[derive(Default)]
struct Shared {
    components: RefCell<HashMap<String, Rc<ComponentDefinition>>>,
    queue: RefCell<VecDeque<Task>>,
    next_id: Cell<usize>,
    host: RefCell<Host>,
    app: RefCell<AppInstance>,
}

impl Shared {
    fn definition(&self, tag: &str) -> Option<Rc<ComponentDefinition>> {
        self.components.borrow().get(tag).cloned()
    }

    fn schedule(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }

    fn next_id(&self) -> usize {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

fn object_patch(patch: Value) -> Result<Map<String, Value>, RuntimeError> {
    match patch {
        Value::Object(map) => Ok(map),
        Value::Null => Err(RuntimeError::InvalidPatch("null".to_string())),
        Value::Bool(_) => Err(RuntimeError::InvalidPatch("boolean".to_string())),
        Value::Number(_) => Err(RuntimeError::InvalidPatch("number".to_string())),
        Value::String(_) => Err(RuntimeError::InvalidPatch("string".to_string())),
        Value::Array(_) => Err(RuntimeError::InvalidPatch("array".to_string())),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT INSTANCES
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ComponentInstance {
    id: usize,
    tag: String,
    host: Handle,
    data: Map<String, Value>,
    properties: Map<String, Value>,
    definition: Rc<ComponentDefinition>,
    children: Vec<ComponentInstance>,
    shared: Rc<Shared>,
}

impl ComponentInstance {
    fn mount(definition: Rc<ComponentDefinition>, binding: HostBinding, shared: &Rc<Shared>) -> Self {
        let HostBinding {
            node,
            tag,
            properties: given,
        } = binding;

        let mut data = definition.data.clone();
        let mut properties = definition.properties.clone();
        for (name, value) in given {
            if let Some(declared) = definition.declared_name(&name) {
                let value = definition.coerce(&declared, value);
                properties.insert(declared, value);
            }
        }
        data.extend(properties.clone());

        if let Some(template) = &definition.template {
            match dom::parse_fragment(template) {
                Ok(fragment) => {
                    dom::clear_children(&node);
                    for child in dom::children(&fragment) {
                        dom::append(&node, child);
                    }
                }
                Err(e) => log::warn!("component <{}> template failed to mount: {}", tag, e),
            }
        }

        let mut instance = ComponentInstance {
            id: shared.next_id(),
            tag,
            host: node,
            data,
            properties,
            definition,
            children: Vec::new(),
            shared: shared.clone(),
        };
        log::debug!("component <{}> #{} created", instance.tag, instance.id);

        instance.run_hook(|d| d.created.clone());
        instance.render(None);
        instance.run_hook(|d| d.attached.clone());
        shared.schedule(Task::ComponentReady { id: instance.id });
        instance
    }

    fn run_hook(&mut self, pick: impl Fn(&ComponentDefinition) -> Option<ComponentHook>) {
        if let Some(hook) = pick(self.definition.as_ref()) {
            hook(self);
        }
    }

    fn render(&mut self, changed: Option<&HashSet<String>>) {
        let hosts = render::render(&self.host, &self.data, changed);
        reconcile(&mut self.children, hosts, &self.shared);
    }

    /// New property values from the host element after a parent render.
    fn receive_properties(&mut self, given: Map<String, Value>) {
        let mut patch = Map::new();
        for (name, value) in given {
            let Some(declared) = self.definition.declared_name(&name) else {
                continue;
            };
            let value = self.definition.coerce(&declared, value);
            if self.properties.get(&declared) != Some(&value) {
                self.properties.insert(declared.clone(), value.clone());
                patch.insert(declared, value);
            }
        }
        if !patch.is_empty() {
            let changed: HashSet<String> = apply_patch(&mut self.data, &patch).into_iter().collect();
            self.render(Some(&changed));
        }
    }

    fn detach(&mut self) {
        for child in self.children.iter_mut() {
            child.detach();
        }
        self.run_hook(|d| d.detached.clone());
        log::debug!("component <{}> #{} detached", self.tag, self.id);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn host(&self) -> &Handle {
        &self.host
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn children(&self) -> &[ComponentInstance] {
        &self.children
    }

    pub fn set_data(&mut self, patch: Value) -> Result<(), RuntimeError> {
        self.set_data_with(patch, |_| {})
    }

    /// Merge `patch`, re-render this component's subtree, then run
    /// `callback`.
    pub fn set_data_with(
        &mut self,
        patch: Value,
        callback: impl FnOnce(&mut Self),
    ) -> Result<(), RuntimeError> {
        let patch = object_patch(patch)?;
        if !patch.is_empty() {
            let changed: HashSet<String> = apply_patch(&mut self.data, &patch).into_iter().collect();
            self.render(Some(&changed));
        }
        callback(self);
        Ok(())
    }

    pub fn host_api(&self) -> RefMut<'_, Host> {
        self.shared.host.borrow_mut()
    }
}

/// Match component instances to the hosts found by a render: new hosts get
/// an instance, known hosts get their properties refreshed, vanished hosts
/// are detached.
fn reconcile(children: &mut Vec<ComponentInstance>, hosts: Vec<HostBinding>, shared: &Rc<Shared>) {
    let mut previous = std::mem::take(children);
    let mut current = Vec::with_capacity(hosts.len());

    for binding in hosts {
        if let Some(pos) = previous
            .iter()
            .position(|c| Rc::ptr_eq(&c.host, &binding.node))
        {
            let mut instance = previous.remove(pos);
            instance.receive_properties(binding.properties);
            current.push(instance);
        } else if let Some(definition) = shared.definition(&binding.tag) {
            current.push(ComponentInstance::mount(definition, binding, shared));
        } else {
            log::debug!("no component registered for <{}>", binding.tag);
        }
    }

    for mut gone in previous {
        gone.detach();
    }
    *children = current;
}

fn find_component(list: &mut [ComponentInstance], id: usize) -> Option<&mut ComponentInstance> {
    list.iter_mut().find_map(|c| {
        if c.id == id {
            Some(c)
        } else {
            find_component(&mut c.children, id)
        }
    })
}

fn find_component_by_host<'a>(
    list: &'a mut [ComponentInstance],
    host: &Handle,
) -> Option<&'a mut ComponentInstance> {
    list.iter_mut().find_map(|c| {
        if Rc::ptr_eq(&c.host, host) {
            Some(c)
        } else {
            find_component_by_host(&mut c.children, host)
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAGE INSTANCES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Registered,
    Loaded,
    Shown,
    Hidden,
    Unloaded,
}

struct PageHooks {
    on_load: Option<LoadHook>,
    on_show: Option<PageHook>,
    on_ready: Option<PageHook>,
    on_hide: Option<PageHook>,
    on_unload: Option<PageHook>,
    methods: HashMap<String, PageMethod>,
}

pub struct PageInstance {
    route: String,
    options: Map<String, Value>,
    data: Map<String, Value>,
    root: Handle,
    state: PageState,
    ready: bool,
    generation: u64,
    hooks: PageHooks,
    components: Vec<ComponentInstance>,
    shared: Rc<Shared>,
}

/// Run a page hook taken out of its slot, then put it back.
macro_rules! page_hook {
    ($page:expr, $slot:ident) => {
        if let Some(mut hook) = $page.hooks.$slot.take() {
            hook($page);
            $page.hooks.$slot = Some(hook);
        }
    };
}

impl PageInstance {
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Query options parsed from the registration URL.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn root(&self) -> &Handle {
        &self.root
    }

    pub fn components(&self) -> &[ComponentInstance] {
        &self.components
    }

    pub fn component_mut(&mut self, id: usize) -> Option<&mut ComponentInstance> {
        find_component(&mut self.components, id)
    }

    pub fn host_api(&self) -> RefMut<'_, Host> {
        self.shared.host.borrow_mut()
    }

    pub fn app(&self) -> RefMut<'_, AppInstance> {
        self.shared.app.borrow_mut()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Handle> {
        dom::find_by_id(&self.root, id)
    }

    pub fn set_data(&mut self, patch: Value) -> Result<(), RuntimeError> {
        self.set_data_with(patch, |_| {})
    }

    /// Merge `patch` into the store, re-render synchronously, then run
    /// `callback`. Dotted and indexed keys (`user.name`, `list[0].done`)
    /// write nested fields. An empty patch renders nothing.
    pub fn set_data_with(
        &mut self,
        patch: Value,
        callback: impl FnOnce(&mut Self),
    ) -> Result<(), RuntimeError> {
        let patch = object_patch(patch)?;
        if !patch.is_empty() {
            let changed: HashSet<String> = apply_patch(&mut self.data, &patch).into_iter().collect();
            log::trace!("{}: setData {:?}", self.route, changed);
            self.render(Some(&changed));
        }
        callback(self);
        Ok(())
    }

    fn render(&mut self, changed: Option<&HashSet<String>>) {
        let hosts = render::render(&self.root, &self.data, changed);
        reconcile(&mut self.components, hosts, &self.shared);
    }

    fn load(&mut self) {
        self.state = PageState::Loaded;
        if let Some(mut hook) = self.hooks.on_load.take() {
            let options = self.options.clone();
            hook(self, &options);
            self.hooks.on_load = Some(hook);
        }
    }

    fn show(&mut self) {
        self.state = PageState::Shown;
        page_hook!(self, on_show);
    }

    fn mark_ready(&mut self) {
        self.ready = true;
        page_hook!(self, on_ready);
    }

    fn hide(&mut self) {
        self.state = PageState::Hidden;
        page_hook!(self, on_hide);
    }

    fn unload(&mut self) {
        for component in self.components.iter_mut() {
            component.detach();
        }
        self.components.clear();
        self.state = PageState::Unloaded;
        page_hook!(self, on_unload);
    }

    fn call_method(&mut self, name: &str, event: &Event) -> Result<(), RuntimeError> {
        let mut method =
            self.hooks
                .methods
                .remove(name)
                .ok_or_else(|| RuntimeError::UnknownHandler {
                    route: self.route.clone(),
                    handler: name.to_string(),
                })?;
        method(self, event);
        self.hooks.methods.entry(name.to_string()).or_insert(method);
        Ok(())
    }
}

/// `pages/detail/index?id=3&from=home` → route and options.
pub fn parse_url(url: &str) -> (String, Map<String, Value>) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let route = path.trim_start_matches('/').to_string();

    let mut options = Map::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decode = |s: &str| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        };
        options.insert(decode(key), Value::String(decode(value)));
    }
    (route, options)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Simulator {
    config: SimulatorConfig,
    shared: Rc<Shared>,
    stack: Vec<PageInstance>,
    generation: u64,
    since_tick: Duration,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        log::debug!(
            "simulator created: tick every {:?}, design width {}rpx",
            config.tick_interval,
            config.design_width
        );
        Simulator {
            config,
            shared: Rc::new(Shared::default()),
            stack: Vec::new(),
            generation: 0,
            since_tick: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Unload every page, newest first, and drop pending work.
    pub fn teardown(&mut self) {
        while let Some(mut page) = self.stack.pop() {
            page.unload();
        }
        self.shared.queue.borrow_mut().clear();
        self.since_tick = Duration::ZERO;
    }

    // ───────────────────────────────────────────────────────────────────────────
    // registration
    // ───────────────────────────────────────────────────────────────────────────

    /// Register the application. `onLaunch` then `onShow` run immediately.
    pub fn register_app(&mut self, definition: AppDefinition) {
        let AppDefinition {
            global_data,
            on_launch,
            on_show,
            on_hide,
        } = definition;

        let mut app = self.shared.app.borrow_mut();
        *app = AppInstance {
            global_data,
            launched: true,
            on_show,
            on_hide,
        };
        if let Some(mut launch) = on_launch {
            launch(&mut *app, &Map::new());
        }
        app.show();
    }

    pub fn app(&self) -> Ref<'_, AppInstance> {
        self.shared.app.borrow()
    }

    pub fn app_mut(&self) -> RefMut<'_, AppInstance> {
        self.shared.app.borrow_mut()
    }

    pub fn host_api(&self) -> RefMut<'_, Host> {
        self.shared.host.borrow_mut()
    }

    /// Register a component behaviour for every host whose
    /// `data-component` equals `tag`. Hosts rendered before registration
    /// are picked up by the next render of their page.
    pub fn register_component(&mut self, tag: &str, definition: ComponentDefinition) {
        self.shared
            .components
            .borrow_mut()
            .insert(tag.to_string(), Rc::new(definition));
    }

    /// Mount converted markup as a new page on top of the stack.
    ///
    /// `onLoad` runs before this returns; `onShow` and `onReady` run on the
    /// next [`run_pending`](Self::run_pending). Registering a route that is
    /// already on the stack unloads the old instance first.
    pub fn register_page(
        &mut self,
        url: &str,
        markup: &str,
        definition: PageDefinition,
    ) -> Result<&mut PageInstance, RuntimeError> {
        let (route, options) = parse_url(url);
        let root = dom::parse_fragment(markup)?;

        if let Some(pos) = self.stack.iter().position(|p| p.route == route) {
            let mut old = self.stack.remove(pos);
            old.unload();
        }
        if let Some(top) = self.stack.last_mut() {
            if top.state == PageState::Shown {
                top.hide();
            }
        }

        self.generation += 1;
        let PageDefinition {
            data,
            on_load,
            on_show,
            on_ready,
            on_hide,
            on_unload,
            methods,
        } = definition;

        let mut page = PageInstance {
            route: route.clone(),
            options,
            data,
            root,
            state: PageState::Registered,
            ready: false,
            generation: self.generation,
            hooks: PageHooks {
                on_load,
                on_show,
                on_ready,
                on_hide,
                on_unload,
                methods,
            },
            components: Vec::new(),
            shared: self.shared.clone(),
        };

        page.render(None);
        page.load();
        log::debug!("page {} loaded (generation {})", route, self.generation);

        self.shared.schedule(Task::PageShow {
            route: route.clone(),
            generation: self.generation,
        });
        self.shared.schedule(Task::PageReady {
            route,
            generation: self.generation,
        });

        self.stack.push(page);
        self.stack.last_mut().ok_or(RuntimeError::EmptyStack)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // pages
    // ───────────────────────────────────────────────────────────────────────────

    pub fn page(&self, route: &str) -> Option<&PageInstance> {
        self.stack.iter().find(|p| p.route == route)
    }

    pub fn page_mut(&mut self, route: &str) -> Option<&mut PageInstance> {
        self.stack.iter_mut().find(|p| p.route == route)
    }

    pub fn current_page(&self) -> Option<&PageInstance> {
        self.stack.last()
    }

    pub fn current_page_mut(&mut self) -> Option<&mut PageInstance> {
        self.stack.last_mut()
    }

    /// Routes on the page stack, bottom first.
    pub fn routes(&self) -> Vec<&str> {
        self.stack.iter().map(|p| p.route.as_str()).collect()
    }

    /// Pop the current page and show the one below it.
    pub fn navigate_back(&mut self) -> Result<(), RuntimeError> {
        if self.stack.is_empty() {
            return Err(RuntimeError::EmptyStack);
        }
        if self.stack.len() < 2 {
            return Err(RuntimeError::NoPreviousPage);
        }
        if let Some(mut leaving) = self.stack.pop() {
            leaving.unload();
        }
        let top = self.stack.last_mut().ok_or(RuntimeError::EmptyStack)?;
        top.show();
        if !top.ready {
            self.shared.schedule(Task::PageReady {
                route: top.route.clone(),
                generation: top.generation,
            });
        }
        Ok(())
    }

    pub fn enter_background(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            if top.state == PageState::Shown {
                top.hide();
            }
        }
        self.shared.app.borrow_mut().hide();
    }

    pub fn enter_foreground(&mut self) {
        self.shared.app.borrow_mut().show();
        if let Some(top) = self.stack.last_mut() {
            if top.state == PageState::Hidden {
                top.show();
            }
        }
    }

    pub fn render_html(&self, route: &str) -> Result<String, RuntimeError> {
        let page = self
            .page(route)
            .ok_or_else(|| RuntimeError::UnknownRoute(route.to_string()))?;
        dom::serialize_children(&page.root)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // event loop
    // ───────────────────────────────────────────────────────────────────────────

    /// Run the tasks queued before this call (one scheduler turn). Tasks
    /// queued while running wait for the next turn. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let batch: Vec<Task> = self.shared.queue.borrow_mut().drain(..).collect();
        let count = batch.len();
        for task in batch {
            self.run_task(task);
        }
        count
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::PageShow { route, generation } => {
                let top = self.stack.len().checked_sub(1);
                match self.live_page(&route, generation) {
                    Some((index, page)) if Some(index) == top && page.state == PageState::Loaded => {
                        page.show()
                    }
                    _ => log::trace!("skipping stale show for {}", route),
                }
            }
            Task::PageReady { route, generation } => match self.live_page(&route, generation) {
                Some((_, page)) if page.state == PageState::Shown && !page.ready => page.mark_ready(),
                _ => log::trace!("skipping stale ready for {}", route),
            },
            Task::ComponentReady { id } => {
                let found = self
                    .stack
                    .iter_mut()
                    .find_map(|page| find_component(&mut page.components, id));
                if let Some(component) = found {
                    component.run_hook(|d| d.ready.clone());
                }
            }
        }
    }

    fn live_page(&mut self, route: &str, generation: u64) -> Option<(usize, &mut PageInstance)> {
        self.stack
            .iter_mut()
            .enumerate()
            .find(|(_, p)| p.route == route && p.generation == generation)
    }

    /// Advance the background timer. Every elapsed `tick_interval` re-runs a
    /// full render of the current page. Returns the number of renders.
    pub fn tick(&mut self, elapsed: Duration) -> usize {
        let interval = self.config.tick_interval;
        self.since_tick += elapsed;

        let mut renders = 0;
        if interval.is_zero() {
            self.since_tick = Duration::ZERO;
            renders = 1;
        } else {
            while self.since_tick >= interval {
                self.since_tick -= interval;
                renders += 1;
            }
        }

        if let Some(page) = self.stack.last_mut() {
            for _ in 0..renders {
                page.render(None);
            }
        }
        renders
    }

    /// Dispatch `event_type` (a WXML event name such as `tap`) at the
    /// element with `element_id`, bubbling towards the page root until a
    /// `catch` handler stops it. Returns the number of handlers run.
    pub fn dispatch(
        &mut self,
        route: &str,
        element_id: &str,
        event_type: &str,
        detail: Value,
    ) -> Result<usize, RuntimeError> {
        let page = self
            .page_mut(route)
            .ok_or_else(|| RuntimeError::UnknownRoute(route.to_string()))?;
        let target = page
            .find_by_id(element_id)
            .ok_or_else(|| RuntimeError::UnknownElement {
                route: route.to_string(),
                id: element_id.to_string(),
            })?;

        // resolve the whole path first; handlers may re-render the tree
        let mut path = Vec::new();
        let mut current = Some(target.clone());
        while let Some(node) = current {
            if Rc::ptr_eq(&node, &page.root) {
                break;
            }
            if let Some(listener) = handler_for(&node, event_type) {
                let owner = owning_host(&node, &page.root);
                path.push((node.clone(), listener, owner));
            }
            current = dom::parent(&node);
        }

        let target_info = EventTarget::of(&target);
        let mut handled = 0;
        for (node, listener, owner) in path {
            let event = Event {
                event_type: event_type.to_string(),
                detail: detail.clone(),
                target: target_info.clone(),
                current_target: EventTarget::of(&node),
            };

            let component = owner
                .as_ref()
                .and_then(|host| find_component_by_host(&mut page.components, host));
            match component {
                Some(instance) => {
                    let method = instance
                        .definition
                        .methods
                        .get(&listener.handler)
                        .cloned()
                        .ok_or_else(|| RuntimeError::UnknownHandler {
                            route: route.to_string(),
                            handler: listener.handler.clone(),
                        })?;
                    method(instance, &event);
                }
                None => page.call_method(&listener.handler, &event)?,
            }

            handled += 1;
            if listener.catching {
                break;
            }
        }
        Ok(handled)
    }
}

/// Innermost component host strictly above `node`.
fn owning_host(node: &Handle, root: &Handle) -> Option<Handle> {
    let mut current = dom::parent(node);
    while let Some(n) = current {
        if Rc::ptr_eq(&n, root) {
            return None;
        }
        if dom::has_attr(&n, COMPONENT_ATTR) {
            return Some(n);
        }
        current = dom::parent(&n);
    }
    None
}
