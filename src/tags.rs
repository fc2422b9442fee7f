//! Tag Tables and Markup Scanner
//!
//! Holds the closed WXML component table shared by the markup and style
//! converters, and a small tokenizer that splits markup into open tags,
//! close tags, comments and text so each rewrite pass can work on structured
//! tags instead of raw regex matches.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::error::ConvertError;

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT TAG TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// One WXML built-in component and its HTML rendition.
#[derive(Debug, Clone, Copy)]
pub struct TagMapping {
    pub wx: &'static str,
    pub html: &'static str,
    /// Marker class added when the HTML element alone does not identify the
    /// component. Style selectors for the component target this class.
    pub class: Option<&'static str>,
    /// Attributes injected when the source tag does not set them.
    pub attrs: &'static [(&'static str, &'static str)],
}

const fn tag(wx: &'static str, html: &'static str) -> TagMapping {
    TagMapping {
        wx,
        html,
        class: None,
        attrs: &[],
    }
}

const fn classed(wx: &'static str, html: &'static str, class: &'static str) -> TagMapping {
    TagMapping {
        wx,
        html,
        class: Some(class),
        attrs: &[],
    }
}

pub const TAG_TABLE: &[TagMapping] = &[
    // layout
    tag("view", "div"),
    tag("text", "span"),
    classed("block", "div", "wx-block"),
    classed("scroll-view", "div", "wx-scroll-view"),
    classed("swiper", "div", "wx-swiper"),
    classed("swiper-item", "div", "wx-swiper-item"),
    classed("movable-area", "div", "wx-movable-area"),
    classed("movable-view", "div", "wx-movable-view"),
    classed("cover-view", "div", "wx-cover-view"),
    tag("cover-image", "img"),
    classed("page-container", "div", "wx-page-container"),
    classed("root-portal", "div", "wx-root-portal"),
    classed("rich-text", "div", "wx-rich-text"),
    classed("icon", "i", "wx-icon"),
    tag("progress", "progress"),
    // form
    tag("button", "button"),
    tag("input", "input"),
    tag("textarea", "textarea"),
    tag("label", "label"),
    tag("form", "form"),
    TagMapping {
        wx: "checkbox",
        html: "input",
        class: Some("wx-checkbox"),
        attrs: &[("type", "checkbox")],
    },
    classed("checkbox-group", "div", "wx-checkbox-group"),
    TagMapping {
        wx: "radio",
        html: "input",
        class: Some("wx-radio"),
        attrs: &[("type", "radio")],
    },
    classed("radio-group", "div", "wx-radio-group"),
    TagMapping {
        wx: "switch",
        html: "input",
        class: Some("wx-switch"),
        attrs: &[("type", "checkbox")],
    },
    TagMapping {
        wx: "slider",
        html: "input",
        class: Some("wx-slider"),
        attrs: &[("type", "range")],
    },
    classed("picker", "div", "wx-picker"),
    classed("picker-view", "div", "wx-picker-view"),
    classed("picker-view-column", "div", "wx-picker-view-column"),
    TagMapping {
        wx: "editor",
        html: "div",
        class: Some("wx-editor"),
        attrs: &[("contenteditable", "true")],
    },
    // media
    tag("image", "img"),
    tag("video", "video"),
    tag("audio", "audio"),
    classed("camera", "video", "wx-camera"),
    classed("live-player", "video", "wx-live-player"),
    // navigation
    tag("navigator", "a"),
    tag("functional-page-navigator", "a"),
    tag("web-view", "iframe"),
    // canvas and map
    tag("canvas", "canvas"),
    classed("map", "div", "wx-map"),
];

/// Selectors that only exist on the style side.
const STYLE_ONLY_SELECTORS: &[(&str, &str)] = &[("page", "body")];

lazy_static! {
    static ref TAG_MAP: HashMap<&'static str, &'static TagMapping> =
        TAG_TABLE.iter().map(|m| (m.wx, m)).collect();

    static ref SELECTOR_MAP: HashMap<&'static str, String> = {
        let mut m: HashMap<&'static str, String> = TAG_TABLE
            .iter()
            .map(|t| {
                let selector = match t.class {
                    Some(class) => format!(".{}", class),
                    None => t.html.to_string(),
                };
                (t.wx, selector)
            })
            .collect();
        for (wx, css) in STYLE_ONLY_SELECTORS {
            m.insert(wx, css.to_string());
        }
        m
    };
}

pub fn lookup_tag(name: &str) -> Option<&'static TagMapping> {
    TAG_MAP.get(name).copied()
}

/// CSS selector replacing a WXML component type selector.
pub fn lookup_selector(name: &str) -> Option<&'static str> {
    SELECTOR_MAP.get(name).map(|s| s.as_str())
}

pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Lowercase, hyphenated, not a built-in: a custom component tag.
pub fn is_custom_component_tag(name: &str) -> bool {
    if lookup_tag(name).is_some() || !name.contains('-') {
        return false;
    }
    let mut parts = name.split('-');
    let first_ok = parts
        .next()
        .and_then(|p| p.chars().next())
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(false);
    first_ok
        && name
            .split('-')
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAG MODEL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
    quote: char,
}

impl Attr {
    pub fn new(name: &str, value: Option<&str>) -> Self {
        Attr {
            name: name.to_string(),
            value: value.map(|v| v.to_string()),
            quote: '"',
        }
    }
}

/// An opening (or self-closing) tag as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTag {
    pub name: String,
    pub attrs: Vec<Attr>,
    pub self_closing: bool,
}

impl OpenTag {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn has(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Set an attribute, replacing the value in place if it already exists.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => {
                attr.value = Some(value.to_string());
                attr.quote = '"';
            }
            None => self.attrs.push(Attr::new(name, Some(value))),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Attr> {
        let index = self.attrs.iter().position(|a| a.name == name)?;
        Some(self.attrs.remove(index))
    }

    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(attr) = self.attrs.iter_mut().find(|a| a.name == from) {
            attr.name = to.to_string();
        }
    }

    /// Prepend a class, keeping any classes already present.
    pub fn merge_class(&mut self, class: &str) {
        match self.get("class") {
            Some(existing) if existing.split_whitespace().any(|c| c == class) => {}
            Some(existing) if !existing.trim().is_empty() => {
                let merged = format!("{} {}", class, existing.trim());
                self.set("class", &merged);
            }
            _ => self.set("class", class),
        }
    }

    /// Prepend style declarations, keeping any inline style already present.
    /// Declarations the style already carries are not repeated.
    pub fn merge_style(&mut self, declarations: &str) {
        let existing = self.get("style").map(str::trim).unwrap_or("").to_string();
        let present: Vec<String> = existing.split(';').map(compact_declaration).collect();
        let missing: Vec<&str> = declarations
            .split(';')
            .map(str::trim)
            .filter(|d| !d.is_empty() && !present.contains(&compact_declaration(d)))
            .collect();
        if missing.is_empty() {
            return;
        }

        let prefix = format!("{};", missing.join("; "));
        if existing.is_empty() {
            self.set("style", &prefix);
        } else {
            self.set("style", &format!("{} {}", prefix, existing));
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + 2 + self.attrs.len() * 16);
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attrs {
            out.push(' ');
            out.push_str(&attr.name);
            if let Some(value) = &attr.value {
                let quote = if attr.quote == '\'' && !value.contains('\'') {
                    '\''
                } else {
                    '"'
                };
                out.push('=');
                out.push(quote);
                if quote == '"' {
                    out.push_str(&value.replace('"', "&quot;"));
                } else {
                    out.push_str(value);
                }
                out.push(quote);
            }
        }
        if self.self_closing {
            out.push_str(" />");
        } else {
            out.push('>');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Open(OpenTag),
    Close(&'a str),
    Comment(&'a str),
    Text(&'a str),
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Split markup into tokens. Text that merely contains `<` (not followed by a
/// tag name) stays text.
pub fn tokenize(markup: &str) -> Result<Vec<Token<'_>>, ConvertError> {
    let bytes = markup.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let next = bytes.get(i + 1).copied();

        if markup[i..].starts_with("<!--") {
            let end = markup[i + 4..]
                .find("-->")
                .map(|p| i + 4 + p + 3)
                .ok_or(ConvertError::UnterminatedComment { offset: i })?;
            push_text(&mut tokens, markup, text_start, i);
            tokens.push(Token::Comment(&markup[i..end]));
            i = end;
            text_start = i;
            continue;
        }

        let closes_tag = next == Some(b'/')
            && bytes
                .get(i + 2)
                .map(|c| c.is_ascii_alphabetic())
                .unwrap_or(false);
        if closes_tag {
            let end = find_tag_end(markup, i)?;
            let name = markup[i + 2..end - 1].trim();
            push_text(&mut tokens, markup, text_start, i);
            tokens.push(Token::Close(name));
            i = end;
            text_start = i;
            continue;
        }

        if next.map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
            let end = find_tag_end(markup, i)?;
            push_text(&mut tokens, markup, text_start, i);
            tokens.push(Token::Open(parse_open_tag(&markup[i + 1..end - 1])));
            i = end;
            text_start = i;
            continue;
        }

        i += 1;
    }

    push_text(&mut tokens, markup, text_start, bytes.len());
    Ok(tokens)
}

fn push_text<'a>(tokens: &mut Vec<Token<'a>>, markup: &'a str, start: usize, end: usize) {
    if end > start {
        tokens.push(Token::Text(&markup[start..end]));
    }
}

/// Index just past the `>` closing the tag that starts at `start`, skipping
/// quoted attribute values and `{{ }}` interpolations.
fn find_tag_end(markup: &str, start: usize) -> Result<usize, ConvertError> {
    let bytes = markup.as_bytes();
    let mut quote: Option<u8> = None;
    let mut mustache = 0usize;
    let mut i = start + 1;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
        } else if c == b'{' && bytes.get(i + 1) == Some(&b'{') {
            mustache += 1;
            i += 2;
            continue;
        } else if c == b'}' && bytes.get(i + 1) == Some(&b'}') && mustache > 0 {
            mustache -= 1;
            i += 2;
            continue;
        } else if mustache == 0 && (c == b'"' || c == b'\'') {
            quote = Some(c);
        } else if mustache == 0 && c == b'>' {
            return Ok(i + 1);
        }
        i += 1;
    }

    Err(ConvertError::UnterminatedTag { offset: start })
}

/// Parse the inside of `<...>` (without the angle brackets).
fn parse_open_tag(inner: &str) -> OpenTag {
    let trimmed = inner.trim_end();
    let (body, self_closing) = match trimmed.strip_suffix('/') {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };

    let name_end = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let name = body[..name_end].to_string();
    let attrs = parse_attributes(&body[name_end..]);

    OpenTag {
        name,
        attrs,
        self_closing,
    }
}

fn parse_attributes(src: &str) -> Vec<Attr> {
    let chars: Vec<char> = src.chars().collect();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let name_start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '=' {
            i += 1;
        }
        let name: String = chars[name_start..i].iter().collect();

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() || chars[i] != '=' {
            if !name.is_empty() {
                attrs.push(Attr {
                    name,
                    value: None,
                    quote: '"',
                });
            }
            continue;
        }

        // skip '='
        i += 1;
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        let (value, quote) = if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
            let q = chars[i];
            i += 1;
            let value_start = i;
            while i < chars.len() && chars[i] != q {
                i += 1;
            }
            let value: String = chars[value_start..i].iter().collect();
            i += 1;
            (value, q)
        } else {
            let value_start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            (chars[value_start..i].iter().collect(), '"')
        };

        attrs.push(Attr {
            name,
            value: Some(value),
            quote,
        });
    }

    attrs
}

/// Run `on_tag` over every open tag, `on_close` over every close tag and
/// `on_text` over every text run, reassembling the markup. Comments are
/// copied through untouched.
pub fn rewrite_markup<T, C, X>(
    markup: &str,
    mut on_tag: T,
    mut on_close: C,
    mut on_text: X,
) -> Result<String, ConvertError>
where
    T: FnMut(OpenTag) -> Result<String, ConvertError>,
    C: FnMut(&str) -> String,
    X: FnMut(&str) -> Result<String, ConvertError>,
{
    let mut out = String::with_capacity(markup.len() + markup.len() / 4);
    for token in tokenize(markup)? {
        match token {
            Token::Open(tag) => out.push_str(&on_tag(tag)?),
            Token::Close(name) => out.push_str(&on_close(name)),
            Token::Comment(c) => out.push_str(c),
            Token::Text(t) => out.push_str(&on_text(t)?),
        }
    }
    Ok(out)
}

/// Shorthand for passes that only touch open tags.
pub fn rewrite_open_tags<T>(markup: &str, mut on_tag: T) -> Result<String, ConvertError>
where
    T: FnMut(&mut OpenTag),
{
    rewrite_markup(
        markup,
        |mut tag| {
            on_tag(&mut tag);
            Ok(tag.render())
        },
        |name| format!("</{}>", name),
        |text| Ok(text.to_string()),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

fn compact_declaration(declaration: &str) -> String {
    declaration
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}
