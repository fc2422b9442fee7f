//! Expression Evaluator
//!
//! Resolves the `{{ }}` expressions left in converted markup against a page
//! or component data store. Only dotted paths (`user.name`, `list.0.title`,
//! `list[0].title`) are understood. Anything else, operators and literals
//! included, is logged once and evaluates to undefined.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashSet;

// ═══════════════════════════════════════════════════════════════════════════════
// PATHS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Split `a.b[0].c` into segments. `None` when the expression is not a path.
pub fn parse_path(expr: &str) -> Option<Vec<PathSegment>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for (i, part) in expr.split('.').enumerate() {
        let (head, mut rest) = match part.find('[') {
            Some(p) => (&part[..p], &part[p..]),
            None => (part, ""),
        };

        if i == 0 {
            if !is_identifier(head) {
                return None;
            }
            segments.push(PathSegment::Key(head.to_string()));
        } else if let Ok(index) = head.parse::<usize>() {
            segments.push(PathSegment::Index(index));
        } else if is_identifier(head) {
            segments.push(PathSegment::Key(head.to_string()));
        } else {
            return None;
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;
            let inner = rest[1..close].trim();
            let inner = inner.trim_matches(|c| c == '\'' || c == '"');
            match inner.parse::<usize>() {
                Ok(index) => segments.push(PathSegment::Index(index)),
                Err(_) if is_identifier(inner) => segments.push(PathSegment::Key(inner.to_string())),
                Err(_) => return None,
            }
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }
    Some(segments)
}

/// Top-level data key an expression depends on, if it is a path.
pub fn root_key(expr: &str) -> Option<String> {
    match parse_path(expr)?.into_iter().next()? {
        PathSegment::Key(key) => Some(key),
        PathSegment::Index(_) => None,
    }
}

fn step<'v>(value: &'v Value, segment: &PathSegment) -> Option<&'v Value> {
    match (value, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get(key),
        (Value::Object(map), PathSegment::Index(i)) => map.get(&i.to_string()),
        (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
        _ => None,
    }
}

thread_local! {
    static REPORTED: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

fn report_unsupported(expr: &str) {
    REPORTED.with(|seen| {
        if seen.borrow_mut().insert(expr.to_string()) {
            log::warn!("unsupported expression '{}', treated as undefined", expr);
        }
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// A data store plus the list-item and template bindings layered over it.
/// Inner bindings shadow outer ones and never escape the subtree that
/// created them.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    root: &'a Map<String, Value>,
    locals: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Map<String, Value>) -> Self {
        Scope {
            root,
            locals: Vec::new(),
        }
    }

    /// A child scope with one more binding.
    pub fn with(&self, name: &str, value: Value) -> Scope<'a> {
        let mut locals = self.locals.clone();
        locals.push((name.to_string(), value));
        Scope {
            root: self.root,
            locals,
        }
    }

    /// A scope that sees only `data` (template instantiation).
    pub fn isolated(data: &'a Map<String, Value>) -> Scope<'a> {
        Scope::new(data)
    }

    fn binding(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.root.get(name))
    }

    /// Evaluate an expression. `None` is undefined.
    pub fn evaluate(&self, expr: &str) -> Option<Value> {
        let expr = expr.trim();
        let Some(path) = parse_path(expr) else {
            report_unsupported(expr);
            return None;
        };

        let mut segments = path.iter();
        let first = match segments.next()? {
            PathSegment::Key(key) => self.binding(key)?,
            PathSegment::Index(_) => return None,
        };
        segments
            .try_fold(first, |value, segment| step(value, segment))
            .cloned()
    }

    /// Substitute every `{{e}}` in `template` with the text form of `e`.
    pub fn interpolate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            let Some(end) = rest[start + 2..].find("}}") else {
                break;
            };
            out.push_str(&rest[..start]);
            let value = self.evaluate(&rest[start + 2..start + 2 + end]);
            out.push_str(&to_text(value.as_ref()));
            rest = &rest[start + 2 + end + 2..];
        }
        out.push_str(rest);
        out
    }

    /// Like `interpolate`, but a template made of exactly one `{{e}}` keeps
    /// the raw value (objects and arrays survive as property values).
    pub fn evaluate_template(&self, template: &str) -> Option<Value> {
        let trimmed = template.trim();
        if let Some(inner) = trimmed
            .strip_prefix("{{")
            .and_then(|t| t.strip_suffix("}}"))
        {
            if !inner.contains("{{") && !inner.contains("}}") {
                return self.evaluate(inner);
            }
        }
        Some(Value::String(self.interpolate(template)))
    }
}

/// Every top-level key referenced by the `{{ }}` expressions of a template.
pub fn referenced_roots(template: &str) -> Vec<String> {
    let mut roots = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        if let Some(root) = root_key(&rest[start + 2..start + 2 + end]) {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        rest = &rest[start + 2 + end + 2..];
    }
    roots
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE SEMANTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Script truthiness: undefined, null, false, 0, NaN and "" are false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Text rendering of a value. Undefined and null render blank.
pub fn to_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => number_text(n),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| to_text(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

fn number_text(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => format!("{}", f),
        None => n.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DATA PATCHES
// ═══════════════════════════════════════════════════════════════════════════════

/// How far past its end an array may be grown by a single indexed write.
const MAX_ARRAY_GROWTH: usize = 10_000;

/// Write `value` at a dotted/indexed `key`, creating intermediate containers.
pub fn set_path(data: &mut Map<String, Value>, key: &str, value: Value) {
    let segments = match parse_path(key) {
        Some(segments) => segments,
        // not a path: store under the literal key
        None => {
            data.insert(key.to_string(), value);
            return;
        }
    };

    let (first, rest) = match segments.split_first() {
        Some((PathSegment::Key(first), rest)) => (first, rest),
        _ => return,
    };
    if rest.is_empty() {
        data.insert(first.clone(), value);
        return;
    }

    let slot = data.entry(first.clone()).or_insert(Value::Null);
    write_into(slot, rest, value);
}

fn write_into(slot: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((segment, rest)) = segments.split_first() else {
        *slot = value;
        return;
    };

    let child = match segment {
        PathSegment::Index(i) => {
            if !slot.is_array() && !slot.is_object() {
                *slot = Value::Array(Vec::new());
            }
            match slot {
                Value::Array(items) => {
                    if *i >= items.len() + MAX_ARRAY_GROWTH {
                        log::warn!(
                            "ignoring write to index {} of an array of length {}",
                            i,
                            items.len()
                        );
                        return;
                    }
                    if items.len() <= *i {
                        items.resize(*i + 1, Value::Null);
                    }
                    &mut items[*i]
                }
                Value::Object(map) => map.entry(i.to_string()).or_insert(Value::Null),
                _ => return,
            }
        }
        PathSegment::Key(key) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            match slot {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                _ => return,
            }
        }
    };
    write_into(child, rest, value);
}

/// Merge a patch into `data`. Returns the changed top-level keys in patch
/// order.
pub fn apply_patch(data: &mut Map<String, Value>, patch: &Map<String, Value>) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, value) in patch {
        set_path(data, key, value.clone());
        let root = root_key(key).unwrap_or_else(|| key.clone());
        if !changed.contains(&root) {
            changed.push(root);
        }
    }
    changed
}
