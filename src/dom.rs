//! In-memory DOM
//!
//! Thin helpers over `markup5ever_rcdom` so the renderer can query and mutate
//! converted markup the way page scripts would in a browser.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::{namespace_url, ns, parse_document, Attribute, LocalName, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::rc::Rc;
use tendril::{StrTendril, TendrilSink};

use crate::error::RuntimeError;

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING AND SERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse converted page markup into a detached `<body>` root.
pub fn parse_fragment(markup: &str) -> Result<Handle, RuntimeError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut markup.as_bytes())
        .map_err(|e| RuntimeError::Markup(e.to_string()))?;

    let root = new_element("body", &[]);
    if let Some(body) = find_element(&dom.document, "body") {
        // rcdom tears down every subtree still attached when the document is
        // dropped, so the nodes must be moved out first
        let children: Vec<Handle> = body.children.borrow_mut().drain(..).collect();
        for child in children {
            child.parent.set(Some(Rc::downgrade(&root)));
            root.children.borrow_mut().push(child);
        }
    }
    Ok(root)
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if tag_name(handle).as_deref() == Some(tag) {
        return Some(handle.clone());
    }
    let children = handle.children.borrow();
    let found = children.iter().find_map(|child| find_element(child, tag));
    found
}

/// Serialize the children of `node` as HTML.
pub fn serialize_children(node: &Handle) -> Result<String, RuntimeError> {
    let mut bytes = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };
    serialize(&mut bytes, &SerializableHandle::from(node.clone()), opts)
        .map_err(|e| RuntimeError::Markup(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════════

fn attr_name(name: &str) -> QualName {
    QualName::new(None, ns!(), LocalName::from(name))
}

pub fn new_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(
            attrs
                .iter()
                .map(|(name, value)| Attribute {
                    name: attr_name(name),
                    value: StrTendril::from(*value),
                })
                .collect(),
        ),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn new_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// Copy a subtree. The copy has no parent.
pub fn deep_clone(node: &Handle) -> Handle {
    let copy = match &node.data {
        NodeData::Element {
            name,
            attrs,
            mathml_annotation_xml_integration_point,
            ..
        } => Node::new(NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(None),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        }),
        NodeData::Text { contents } => new_text(&contents.borrow()),
        NodeData::Comment { contents } => Node::new(NodeData::Comment {
            contents: contents.clone(),
        }),
        _ => Node::new(NodeData::Document),
    };
    for child in node.children.borrow().iter() {
        append(&copy, deep_clone(child));
    }
    copy
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUERIES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

pub fn get_attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn has_attr(node: &Handle, name: &str) -> bool {
    get_attr(node, name).is_some()
}

/// All attributes in document order.
pub fn attributes(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|a| (a.name.local.to_string(), a.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

pub fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

/// Concatenated text of every descendant text node.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// Elements under `root` in document order, `root` excluded.
pub fn descendants(root: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut stack: Vec<Handle> = children(root).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if is_element(&node) {
            stack.extend(children(&node).into_iter().rev());
            out.push(node);
        }
    }
    out
}

pub fn find_by_id(root: &Handle, id: &str) -> Option<Handle> {
    descendants(root)
        .into_iter()
        .find(|node| get_attr(node, "id").as_deref() == Some(id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// MUTATION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn set_attr(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|a| &*a.name.local == name) {
            Some(attr) => {
                if &*attr.value != value {
                    attr.value = StrTendril::from(value);
                }
            }
            None => attrs.push(Attribute {
                name: attr_name(name),
                value: StrTendril::from(value),
            }),
        }
    }
}

pub fn remove_attr(node: &Handle, name: &str) -> Option<String> {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        let index = attrs.iter().position(|a| &*a.name.local == name)?;
        return Some(attrs.remove(index).value.to_string());
    }
    None
}

pub fn detach(node: &Handle) {
    if let Some(parent) = parent(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

pub fn append(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// Insert `node` as the sibling right after `anchor`.
pub fn insert_after(anchor: &Handle, node: Handle) {
    let Some(parent) = parent(anchor) else {
        return;
    };
    detach(&node);
    node.parent.set(Some(Rc::downgrade(&parent)));
    let mut siblings = parent.children.borrow_mut();
    let index = siblings
        .iter()
        .position(|child| Rc::ptr_eq(child, anchor))
        .map(|i| i + 1)
        .unwrap_or(siblings.len());
    siblings.insert(index, node);
}

pub fn clear_children(node: &Handle) {
    let removed: Vec<Handle> = node.children.borrow_mut().drain(..).collect();
    for child in removed {
        child.parent.set(None);
    }
}

/// Replace the children of `node` with a single text node.
pub fn set_text(node: &Handle, text: &str) {
    let current = children(node);
    if let [only] = current.as_slice() {
        if let NodeData::Text { contents } = &only.data {
            if &**contents.borrow() != text {
                *contents.borrow_mut() = StrTendril::from(text);
            }
            return;
        }
    }
    clear_children(node);
    append(node, new_text(text));
}

// ═══════════════════════════════════════════════════════════════════════════════
// VISIBILITY
// ═══════════════════════════════════════════════════════════════════════════════

fn is_display_none(declaration: &str) -> bool {
    let compact: String = declaration.chars().filter(|c| !c.is_whitespace()).collect();
    compact.eq_ignore_ascii_case("display:none")
}

pub fn is_visible(node: &Handle) -> bool {
    get_attr(node, "style")
        .map(|style| !style.split(';').any(is_display_none))
        .unwrap_or(true)
}

/// Toggle the inline `display: none` declaration, leaving the rest of the
/// style alone.
pub fn set_visible(node: &Handle, visible: bool) {
    if is_visible(node) == visible {
        return;
    }
    let style = get_attr(node, "style").unwrap_or_default();
    let rest: Vec<&str> = style
        .split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty() && !is_display_none(d))
        .collect();

    if visible {
        if rest.is_empty() {
            remove_attr(node, "style");
        } else {
            set_attr(node, "style", &format!("{};", rest.join("; ")));
        }
    } else {
        let mut declarations = vec!["display: none"];
        declarations.extend(rest);
        set_attr(node, "style", &format!("{};", declarations.join("; ")));
    }
}
