//! Render Pass
//!
//! Applies a data store to a converted DOM subtree: expression text,
//! `data-bind-*` attributes, conditional chains, hidden predicates, lists and
//! template instances. Custom component hosts are reported back to the
//! caller instead of being descended into, since each component renders its
//! own subtree from its own store.

use markup5ever_rcdom::Handle;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::dom;
use crate::expression::{is_truthy, referenced_roots, root_key, to_text, Scope};

pub const EXPRESSION_ATTR: &str = "data-expression";
pub const BIND_PREFIX: &str = "data-bind-";
pub const IF_ATTR: &str = "data-wx-if";
pub const ELIF_ATTR: &str = "data-wx-elif";
pub const ELSE_ATTR: &str = "data-wx-else";
pub const HIDDEN_ATTR: &str = "data-wx-hidden";
pub const FOR_ATTR: &str = "data-wx-for";
pub const FOR_ITEM_ATTR: &str = "data-wx-for-item";
pub const FOR_INDEX_ATTR: &str = "data-wx-for-index";
pub const KEY_ATTR: &str = "data-wx-key";
/// Marks a generated list clone; the value is the list expression.
pub const OWNER_ATTR: &str = "data-wx-for-owner";
pub const COMPONENT_ATTR: &str = "data-component";
pub const TEMPLATE_ATTR: &str = "data-wx-template";
pub const TEMPLATE_IS_ATTR: &str = "data-wx-template-is";
pub const TEMPLATE_DATA_ATTR: &str = "data-wx-template-data";

/// A custom component host found during a render, with the property values
/// its attributes evaluated to.
#[derive(Debug, Clone)]
pub struct HostBinding {
    pub node: Handle,
    pub tag: String,
    pub properties: Map<String, Value>,
}

/// Render `root`'s subtree against `data`.
///
/// With `changed = None` every binding is refreshed. Otherwise only text and
/// attribute bindings referencing one of the changed top-level keys are;
/// conditionals, lists and templates are always recomputed.
pub fn render(
    root: &Handle,
    data: &Map<String, Value>,
    changed: Option<&HashSet<String>>,
) -> Vec<HostBinding> {
    let mut renderer = Renderer {
        templates: collect_templates(root),
        changed,
        hosts: Vec::new(),
    };
    let scope = Scope::new(data);
    renderer.walk(root, &scope, changed.is_none());
    renderer.hosts
}

fn collect_templates(root: &Handle) -> HashMap<String, Handle> {
    dom::descendants(root)
        .into_iter()
        .filter_map(|node| dom::get_attr(&node, TEMPLATE_ATTR).map(|name| (name, node)))
        .collect()
}

struct Renderer<'c> {
    templates: HashMap<String, Handle>,
    changed: Option<&'c HashSet<String>>,
    hosts: Vec<HostBinding>,
}

impl<'c> Renderer<'c> {
    fn needs_update(&self, roots: &[String], full: bool) -> bool {
        match self.changed {
            _ if full => true,
            None => true,
            Some(changed) => roots.is_empty() || roots.iter().any(|r| changed.contains(r)),
        }
    }

    fn walk(&mut self, parent: &Handle, scope: &Scope<'_>, full: bool) {
        for child in dom::children(parent) {
            if dom::has_attr(&child, OWNER_ATTR) {
                dom::detach(&child);
            }
        }

        for child in dom::children(parent) {
            if !dom::is_element(&child) || dom::has_attr(&child, TEMPLATE_ATTR) {
                continue;
            }
            match dom::get_attr(&child, FOR_ATTR) {
                Some(expr) => self.expand_list(&child, &expr, scope),
                None => self.render_node(&child, scope, full),
            }
        }

        apply_conditionals(parent, scope);
    }

    fn render_node(&mut self, node: &Handle, scope: &Scope<'_>, full: bool) {
        self.bind_attributes(node, scope, full);

        if let Some(tag) = dom::get_attr(node, COMPONENT_ATTR) {
            let properties = host_properties(node, scope);
            self.hosts.push(HostBinding {
                node: node.clone(),
                tag,
                properties,
            });
            return;
        }

        if let Some(name) = dom::get_attr(node, TEMPLATE_IS_ATTR) {
            self.instantiate_template(node, &name, scope);
            return;
        }

        if let Some(expr) = dom::get_attr(node, EXPRESSION_ATTR) {
            let roots: Vec<String> = root_key(&expr).into_iter().collect();
            if self.needs_update(&roots, full) {
                dom::set_text(node, &to_text(scope.evaluate(&expr).as_ref()));
            }
            return;
        }

        self.walk(node, scope, full);
    }

    fn bind_attributes(&self, node: &Handle, scope: &Scope<'_>, full: bool) {
        for (name, template) in dom::attributes(node) {
            let Some(target) = name.strip_prefix(BIND_PREFIX) else {
                continue;
            };
            if self.needs_update(&referenced_roots(&template), full) {
                dom::set_attr(node, target, &scope.interpolate(&template));
            }
        }
    }

    /// Rebuild the clones of a list template as its following siblings.
    fn expand_list(&mut self, template: &Handle, expr: &str, scope: &Scope<'_>) {
        dom::set_visible(template, false);

        let item_name = dom::get_attr(template, FOR_ITEM_ATTR).unwrap_or_else(|| "item".into());
        let index_name =
            dom::get_attr(template, FOR_INDEX_ATTR).unwrap_or_else(|| "index".into());

        let mut anchor = template.clone();
        for (index, item) in list_entries(scope.evaluate(expr)) {
            let clone = dom::deep_clone(template);
            for attr in [FOR_ATTR, FOR_ITEM_ATTR, FOR_INDEX_ATTR, KEY_ATTR] {
                dom::remove_attr(&clone, attr);
            }
            dom::set_attr(&clone, OWNER_ATTR, expr);
            dom::insert_after(&anchor, clone.clone());
            anchor = clone.clone();

            let inner = scope.with(&item_name, item).with(&index_name, index);

            // a condition on the list element is evaluated per item
            let mut visible = match dom::remove_attr(&clone, IF_ATTR) {
                Some(cond) => is_truthy(inner.evaluate(&cond).as_ref()),
                None => true,
            };
            if let Some(hidden) = dom::get_attr(&clone, HIDDEN_ATTR) {
                visible &= !is_truthy(inner.evaluate(&hidden).as_ref());
            }
            // after binding, since a bound `style` replaces the whole attribute
            self.render_node(&clone, &inner, true);
            dom::set_visible(&clone, visible);
        }
    }

    fn instantiate_template(&mut self, node: &Handle, name: &str, scope: &Scope<'_>) {
        let definition = match self.templates.get(name) {
            Some(def) => Some(def.clone()),
            // `is="{{expr}}"` names the template dynamically
            None => {
                let resolved = to_text(scope.evaluate(name).as_ref());
                self.templates.get(&resolved).cloned()
            }
        };

        dom::clear_children(node);
        let Some(definition) = definition else {
            log::debug!("template '{}' is not defined", name);
            return;
        };

        for child in dom::children(&definition) {
            dom::append(node, dom::deep_clone(&child));
        }
        let data_expr = dom::get_attr(node, TEMPLATE_DATA_ATTR).unwrap_or_default();
        let data = template_data(&data_expr, scope);
        self.walk(node, &Scope::isolated(&data), true);
    }
}

fn list_entries(source: Option<Value>) -> Vec<(Value, Value)> {
    match source {
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item))
            .collect(),
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(key, item)| (Value::String(key), item))
            .collect(),
        Some(Value::Number(n)) => {
            let count = n.as_u64().unwrap_or(0);
            (0..count)
                .map(|i| (Value::from(i), Value::from(i)))
                .collect()
        }
        Some(Value::String(s)) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (Value::from(i), Value::String(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

/// Evaluate a template `data` object body: `...spread, key: path, shorthand`.
pub fn template_data(body: &str, scope: &Scope<'_>) -> Map<String, Value> {
    let mut data = Map::new();
    for entry in body.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if let Some(path) = entry.strip_prefix("...") {
            if let Some(Value::Object(fields)) = scope.evaluate(path) {
                data.extend(fields);
            }
        } else if let Some((key, path)) = entry.split_once(':') {
            let key = key.trim().trim_matches(|c| c == '\'' || c == '"');
            if let Some(value) = scope.evaluate(path) {
                data.insert(key.to_string(), value);
            }
        } else if let Some(value) = scope.evaluate(entry) {
            data.insert(entry.to_string(), value);
        }
    }
    data
}

/// Conditional chains and hidden predicates among the element children of
/// `parent`. Exactly one member of each `if / elif* / else?` run is shown.
fn apply_conditionals(parent: &Handle, scope: &Scope<'_>) {
    let truthy = |expr: &str| is_truthy(scope.evaluate(expr).as_ref());
    let mut chain_open = false;
    let mut satisfied = false;

    for child in dom::children(parent) {
        if !dom::is_element(&child)
            || dom::has_attr(&child, OWNER_ATTR)
            || dom::has_attr(&child, FOR_ATTR)
            || dom::has_attr(&child, TEMPLATE_ATTR)
        {
            continue;
        }

        let mut show = if let Some(expr) = dom::get_attr(&child, IF_ATTR) {
            satisfied = truthy(&expr);
            chain_open = true;
            satisfied
        } else if let Some(expr) = dom::get_attr(&child, ELIF_ATTR) {
            let show = chain_open && !satisfied && truthy(&expr);
            satisfied |= show;
            show
        } else if dom::has_attr(&child, ELSE_ATTR) {
            let show = chain_open && !satisfied;
            chain_open = false;
            show
        } else {
            chain_open = false;
            match dom::get_attr(&child, HIDDEN_ATTR) {
                Some(_) => true,
                None => continue,
            }
        };

        if let Some(hidden) = dom::get_attr(&child, HIDDEN_ATTR) {
            show &= !truthy(&hidden);
        }
        dom::set_visible(&child, show);
    }
}

/// Host attributes that are not converter metadata become component
/// properties. Bound attributes keep their raw evaluated value.
fn host_properties(node: &Handle, scope: &Scope<'_>) -> Map<String, Value> {
    let attrs = dom::attributes(node);
    let mut properties = Map::new();
    for (name, value) in &attrs {
        if matches!(name.as_str(), "class" | "style" | "id")
            || name.starts_with("data-")
            || name.starts_with("on")
        {
            continue;
        }
        let binding = attrs
            .iter()
            .find(|(n, _)| n.strip_prefix(BIND_PREFIX) == Some(name.as_str()))
            .map(|(_, template)| template);
        let value = match binding {
            Some(template) => scope.evaluate_template(template).unwrap_or(Value::Null),
            None => Value::String(value.clone()),
        };
        properties.insert(camel_case(name), value);
    }
    properties
}

/// `max-count` → `maxCount`.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
