//! WXML → HTML Converter
//!
//! A fixed, ordered pipeline of text-level passes. Each pass is a pure
//! `&str -> String` function and may assume every earlier pass already ran
//! (directive rewriting expects tag names to be HTML already).
//!
//! Dynamic behaviour is not evaluated here; it is recorded in metadata
//! attributes consumed by the runtime simulator:
//!
//! | metadata                         | meaning                                   |
//! |----------------------------------|-------------------------------------------|
//! | `data-expression`                | text bound to an expression               |
//! | `data-bind-<attr>`               | attribute template with `{{ }}` bindings  |
//! | `data-wx-if/elif/else`           | conditional chain member                  |
//! | `data-wx-hidden`                 | hidden predicate                          |
//! | `data-wx-for(-item/-index)`      | list template                             |
//! | `data-wx-key`                    | list key (captured, unused at runtime)    |
//! | `data-component`                 | custom component host                     |
//! | `data-wx-template(-is/-data)`    | template definition / instantiation       |

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::error::ConvertError;
use crate::tags::{
    is_custom_component_tag, is_void_element, lookup_tag, rewrite_markup, rewrite_open_tags,
    OpenTag,
};

pub type Pass = fn(&str) -> Result<String, ConvertError>;

/// The passes in execution order.
pub const PIPELINE: &[(&str, Pass)] = &[
    ("strip_wrappers", strip_wrappers),
    ("rewrite_tags", rewrite_tags),
    ("rewrite_attributes", rewrite_attributes),
    ("rewrite_attribute_values", rewrite_attribute_values),
    ("rewrite_interpolations", rewrite_interpolations),
    ("rewrite_conditionals", rewrite_conditionals),
    ("rewrite_loops", rewrite_loops),
    ("rewrite_templates", rewrite_templates),
    ("rewrite_components", rewrite_components),
    ("normalize_markup", normalize_markup),
];

/// Name of the page-level function every converted event attribute calls.
pub const DISPATCH_FN: &str = "wxDispatch";

/// Inline style that keeps directive-controlled nodes invisible until the
/// runtime has evaluated them.
pub const DEFAULT_HIDDEN: &str = "display: none;";

lazy_static! {
    static ref XML_DECL_RE: Regex = Regex::new(r"(?s)<\?xml.*?\?>").unwrap();
    static ref DOCTYPE_RE: Regex = Regex::new(r"(?is)<!DOCTYPE[^>]*>").unwrap();
    static ref CDATA_RE: Regex = Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap();
    static ref WXS_BLOCK_RE: Regex =
        Regex::new(r#"(?s)<wxs\b([^>]*?)(?:/>|>.*?</wxs\s*>)"#).unwrap();
    static ref MODULE_ATTR_RE: Regex = Regex::new(r#"module\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref EVENT_ATTR_RE: Regex =
        Regex::new(r"^(capture-bind|capture-catch|mut-bind|bind|catch):?([a-z]+)$").unwrap();
    static ref BLANK_LINES_RE: Regex = Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)*").unwrap();
}

/// Convert WXML markup. Never fails: on an internal error the source is
/// returned unchanged.
pub fn convert(source: &str) -> String {
    match run_pipeline(source) {
        Ok(html) => html,
        Err(e) => {
            log::warn!("wxml conversion failed, passing source through: {}", e);
            source.to_string()
        }
    }
}

pub fn run_pipeline(source: &str) -> Result<String, ConvertError> {
    let mut current = source.to_string();
    for (name, pass) in PIPELINE {
        current = pass(&current)?;
        log::trace!("wxml pass {} -> {} bytes", name, current.len());
    }
    Ok(current)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 1: WRAPPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn strip_wrappers(markup: &str) -> Result<String, ConvertError> {
    let out = XML_DECL_RE.replace_all(markup, "");
    let out = DOCTYPE_RE.replace_all(&out, "");
    let out = CDATA_RE.replace_all(&out, "$1");
    let out = strip_comments(&out)?;

    // wxs bodies are script, not markup; keep only a marker
    let out = WXS_BLOCK_RE.replace_all(&out, |caps: &Captures| {
        let module = MODULE_ATTR_RE
            .captures(&caps[1])
            .map(|m| m[1].to_string())
            .unwrap_or_default();
        format!("<!-- wx:wxs {} -->", module)
    });

    Ok(out.into_owned())
}

fn strip_comments(markup: &str) -> Result<String, ConvertError> {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    let mut offset = 0;

    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        let end = rest[start + 4..]
            .find("-->")
            .ok_or(ConvertError::UnterminatedComment {
                offset: offset + start,
            })?;
        let consumed = start + 4 + end + 3;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 2: TAGS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn rewrite_tags(markup: &str) -> Result<String, ConvertError> {
    rewrite_markup(
        markup,
        |mut tag| {
            if let Some(mapping) = lookup_tag(&tag.name) {
                tag.name = mapping.html.to_string();
                if let Some(class) = mapping.class {
                    tag.merge_class(class);
                }
                for (name, value) in mapping.attrs {
                    if !tag.has(name) {
                        tag.set(name, value);
                    }
                }
            }
            Ok(tag.render())
        },
        |name| match lookup_tag(name) {
            Some(mapping) => format!("</{}>", mapping.html),
            None => format!("</{}>", name),
        },
        |text| Ok(text.to_string()),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 3: ATTRIBUTE NAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Proprietary attributes with a fixed HTML name.
const ATTRIBUTE_RENAMES: &[(&str, &str)] = &[
    ("hover-class", "data-hover-class"),
    ("hover-stop-propagation", "data-hover-stop-propagation"),
    ("hover-start-time", "data-hover-start-time"),
    ("hover-stay-time", "data-hover-stay-time"),
    ("open-type", "data-open-type"),
    ("placeholder-class", "data-placeholder-class"),
    ("placeholder-style", "data-placeholder-style"),
    ("confirm-type", "enterkeyhint"),
    ("scroll-x", "data-scroll-x"),
    ("scroll-y", "data-scroll-y"),
    ("scroll-top", "data-scroll-top"),
    ("scroll-left", "data-scroll-left"),
    ("scroll-into-view", "data-scroll-into-view"),
    ("scroll-with-animation", "data-scroll-with-animation"),
    ("enable-flex", "data-enable-flex"),
    ("indicator-dots", "data-indicator-dots"),
    ("indicator-color", "data-indicator-color"),
    ("indicator-active-color", "data-indicator-active-color"),
    ("show-menu-by-longpress", "data-show-menu-by-longpress"),
    ("user-select", "data-user-select"),
    ("decode", "data-decode"),
    ("space", "data-space"),
    ("selectable", "data-selectable"),
];

/// Swiper options that collide with media attributes of the same name.
const SWIPER_RENAMES: &[(&str, &str)] = &[
    ("autoplay", "data-autoplay"),
    ("interval", "data-interval"),
    ("duration", "data-duration"),
    ("circular", "data-circular"),
    ("current", "data-current"),
];

/// WXML event name → DOM event name.
fn dom_event(wx_event: &str) -> &str {
    match wx_event {
        "tap" => "click",
        "longpress" | "longtap" => "contextmenu",
        "confirm" => "keydown",
        "scrolltolower" | "scrolltoupper" => "scroll",
        other => other,
    }
}

pub fn rewrite_attributes(markup: &str) -> Result<String, ConvertError> {
    rewrite_open_tags(markup, |tag| {
        let mut events = Vec::new();
        tag.attrs.retain(|attr| match EVENT_ATTR_RE.captures(&attr.name) {
            Some(caps) => {
                let catching = caps[1].contains("catch");
                let handler = attr.value.clone().unwrap_or_default();
                events.push((caps[2].to_string(), handler, catching));
                false
            }
            None => true,
        });

        for (name, to) in ATTRIBUTE_RENAMES {
            tag.rename(name, to);
        }
        let is_swiper = tag
            .get("class")
            .map(|c| c.split_whitespace().any(|c| c == "wx-swiper"))
            .unwrap_or(false);
        if is_swiper {
            for (name, to) in SWIPER_RENAMES {
                tag.rename(name, to);
            }
        }
        if tag.name == "a" {
            tag.rename("url", "href");
        }
        if let Some(lazy) = tag.remove("lazy-load") {
            if lazy.value.as_deref().map(|v| v != "false").unwrap_or(true) {
                tag.set("loading", "lazy");
            }
        }

        for (wx_event, handler, catching) in events {
            let value = format!(
                "{}(event, '{}', '{}', {})",
                DISPATCH_FN,
                wx_event,
                handler.trim().replace('\'', "\\'"),
                catching
            );
            tag.set(&format!("on{}", dom_event(&wx_event)), &value);
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 4: ATTRIBUTE VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Image `mode` keyword → inline style.
pub fn image_mode_style(mode: &str) -> Option<&'static str> {
    Some(match mode {
        "scaleToFill" => "object-fit: fill;",
        "aspectFit" => "object-fit: contain;",
        "aspectFill" => "object-fit: cover;",
        "widthFix" => "object-fit: contain; height: auto;",
        "heightFix" => "object-fit: contain; width: auto;",
        "center" => "object-fit: none; object-position: center;",
        "top" => "object-fit: none; object-position: top;",
        "bottom" => "object-fit: none; object-position: bottom;",
        "left" => "object-fit: none; object-position: left;",
        "right" => "object-fit: none; object-position: right;",
        "top left" => "object-fit: none; object-position: top left;",
        "top right" => "object-fit: none; object-position: top right;",
        "bottom left" => "object-fit: none; object-position: bottom left;",
        "bottom right" => "object-fit: none; object-position: bottom right;",
        _ => return None,
    })
}

pub fn rewrite_attribute_values(markup: &str) -> Result<String, ConvertError> {
    rewrite_open_tags(markup, |tag| {
        let name = tag.name.clone();
        match name.as_str() {
            "img" => rewrite_image(tag),
            "button" => rewrite_button(tag),
            "input" => rewrite_input(tag),
            _ => {}
        }
    })
}

fn rewrite_image(tag: &mut OpenTag) {
    let Some(mode) = tag.get("mode").map(|m| m.trim().to_string()) else {
        return;
    };
    if let Some(style) = image_mode_style(&mode) {
        tag.remove("mode");
        tag.merge_style(style);
    }
}

fn rewrite_button(tag: &mut OpenTag) {
    if let Some(kind) = tag.get("type").map(|t| t.trim().to_string()) {
        if matches!(kind.as_str(), "primary" | "default" | "warn") {
            tag.remove("type");
            tag.merge_class(&format!("wx-button-{}", kind));
        }
    }
    if tag.get("size") == Some("mini") {
        tag.remove("size");
        tag.merge_class("wx-button-mini");
    }
    match tag.remove("form-type") {
        Some(form_type) => {
            let kind = form_type.value.unwrap_or_default();
            if kind == "submit" || kind == "reset" {
                tag.set("type", &kind);
            }
        }
        None => {
            if !tag.has("type") {
                tag.set("type", "button");
            }
        }
    }
}

fn rewrite_input(tag: &mut OpenTag) {
    if let Some(password) = tag.remove("password") {
        if password.value.as_deref().map(|v| v != "false").unwrap_or(true) {
            tag.set("type", "password");
            return;
        }
    }
    let kind = tag.get("type").map(|t| t.to_string());
    match kind.as_deref() {
        Some("number") | Some("digit") => tag.set("type", "number"),
        Some("idcard") | Some("safe-password") | Some("nickname") => tag.set("type", "text"),
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 5: INTERPOLATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Attributes whose `{{ }}` is owned by a later directive pass.
fn is_directive_attribute(tag: &str, name: &str) -> bool {
    name.starts_with("wx:")
        || name == "hidden"
        || name.starts_with("data-bind-")
        || (tag == "template" && (name == "is" || name == "data"))
}

pub fn rewrite_interpolations(markup: &str) -> Result<String, ConvertError> {
    rewrite_markup(
        markup,
        |mut tag| {
            let bindings: Vec<(String, String)> = tag
                .attrs
                .iter()
                .filter(|a| !is_directive_attribute(&tag.name, &a.name))
                .filter_map(|a| {
                    let value = a.value.as_deref()?;
                    value
                        .contains("{{")
                        .then(|| (format!("data-bind-{}", a.name), value.to_string()))
                })
                .collect();
            for (name, template) in bindings {
                if !tag.has(&name) {
                    tag.set(&name, &template);
                }
            }
            Ok(tag.render())
        },
        |name| format!("</{}>", name),
        interpolate_text,
    )
}

/// `Hello {{user.name}}!` →
/// `Hello <span data-expression="user.name">{{user.name}}</span>!`
pub fn interpolate_text(text: &str) -> Result<String, ConvertError> {
    let mut out = String::with_capacity(text.len() + 32);
    let mut rest = text;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let end = rest[start + 2..]
            .find("}}")
            .ok_or(ConvertError::UnterminatedInterpolation {
                offset: offset + start,
            })?;
        let expr = rest[start + 2..start + 2 + end].trim();
        out.push_str(&format!(
            "<span data-expression=\"{}\">{{{{{}}}}}</span>",
            escape_attr(expr),
            escape_text(expr)
        ));
        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;")
}

/// `{{ a.b }}` → `a.b`; values without braces are returned trimmed.
pub fn strip_braces(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|v| v.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 6: CONDITIONALS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rename a directive attribute in place, unwrapping its `{{ }}`.
fn move_directive(tag: &mut OpenTag, from: &str, to: &str) -> bool {
    let Some(expr) = tag.get(from).map(|v| strip_braces(v).to_string()) else {
        return false;
    };
    tag.rename(from, to);
    tag.set(to, &expr);
    true
}

pub fn rewrite_conditionals(markup: &str) -> Result<String, ConvertError> {
    rewrite_open_tags(markup, |tag| {
        let mut conditional = move_directive(tag, "wx:if", "data-wx-if");
        conditional |= move_directive(tag, "wx:elif", "data-wx-elif");
        conditional |= move_directive(tag, "wx:else", "data-wx-else");

        let dynamic_hidden = tag
            .get("hidden")
            .map(|v| v.contains("{{"))
            .unwrap_or(false);
        if dynamic_hidden {
            move_directive(tag, "hidden", "data-wx-hidden");
        }

        if conditional {
            tag.merge_style(DEFAULT_HIDDEN);
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 7: LISTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn rewrite_loops(markup: &str) -> Result<String, ConvertError> {
    rewrite_open_tags(markup, |tag| {
        let is_list = move_directive(tag, "wx:for", "data-wx-for")
            || move_directive(tag, "wx:for-items", "data-wx-for");
        if !is_list {
            return;
        }
        move_directive(tag, "wx:for-item", "data-wx-for-item");
        move_directive(tag, "wx:for-index", "data-wx-for-index");
        move_directive(tag, "wx:key", "data-wx-key");
        tag.merge_style(DEFAULT_HIDDEN);
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 8: TEMPLATES AND IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn rewrite_templates(markup: &str) -> Result<String, ConvertError> {
    rewrite_markup(
        markup,
        |mut tag| {
            let name = tag.name.clone();
            match name.as_str() {
                "template" => {
                    let name = tag.remove("name");
                    let is = tag.remove("is");
                    let data = tag.remove("data");
                    tag.name = "div".to_string();
                    if let Some(name) = name {
                        tag.set("data-wx-template", name.value.as_deref().unwrap_or(""));
                        tag.merge_style(DEFAULT_HIDDEN);
                    } else if let Some(is) = is {
                        tag.set(
                            "data-wx-template-is",
                            strip_braces(is.value.as_deref().unwrap_or("")),
                        );
                        if let Some(data) = data {
                            tag.set(
                                "data-wx-template-data",
                                strip_braces(data.value.as_deref().unwrap_or("")),
                            );
                        }
                    }
                    Ok(tag.render())
                }
                "import" | "include" => {
                    let src = tag.get("src").unwrap_or("");
                    Ok(format!("<!-- wx:{} {} -->", name, src))
                }
                _ => Ok(tag.render()),
            }
        },
        |name| match name {
            "template" => "</div>".to_string(),
            "import" | "include" => String::new(),
            other => format!("</{}>", other),
        },
        |text| Ok(text.to_string()),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 9: CUSTOM COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn rewrite_components(markup: &str) -> Result<String, ConvertError> {
    rewrite_markup(
        markup,
        |mut tag| {
            if is_custom_component_tag(&tag.name) {
                let component = std::mem::replace(&mut tag.name, "div".to_string());
                tag.merge_class("wx-component");
                // the runtime re-applies this template to `class`
                if let Some(template) = tag.get("data-bind-class").map(str::to_string) {
                    tag.set("data-bind-class", &format!("wx-component {}", template.trim()));
                }
                tag.set("data-component", &component);
            }
            Ok(tag.render())
        },
        |name| {
            if is_custom_component_tag(name) {
                "</div>".to_string()
            } else {
                format!("</{}>", name)
            }
        },
        |text| Ok(text.to_string()),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 10: NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn normalize_markup(markup: &str) -> Result<String, ConvertError> {
    let corrected = rewrite_markup(
        markup,
        |mut tag| {
            if !tag.self_closing {
                return Ok(tag.render());
            }
            if is_void_element(&tag.name) {
                tag.self_closing = false;
                Ok(tag.render())
            } else {
                tag.self_closing = false;
                Ok(format!("{}</{}>", tag.render(), tag.name))
            }
        },
        |name| {
            if is_void_element(name) {
                String::new()
            } else {
                format!("</{}>", name)
            }
        },
        |text| Ok(text.to_string()),
    )?;

    let collapsed = BLANK_LINES_RE.replace_all(&corrected, "\n");
    Ok(collapsed.trim().to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_wrappers() {
        let out = strip_wrappers(
            "<?xml version=\"1.0\"?><!-- note --><view><![CDATA[a < b]]></view>",
        )
        .unwrap();
        assert_eq!(out, "<view>a < b</view>");
    }

    #[test]
    fn test_wxs_block_becomes_marker() {
        let out = strip_wrappers(
            "<wxs module=\"fmt\">module.exports = { a: 1 < 2 };</wxs><view/>",
        )
        .unwrap();
        assert_eq!(out, "<!-- wx:wxs fmt --><view/>");
    }

    #[test]
    fn test_rewrite_tags_adds_marker_class() {
        let out = rewrite_tags(r#"<scroll-view class="list"><text>a</text></scroll-view>"#).unwrap();
        assert_eq!(
            out,
            r#"<div class="wx-scroll-view list"><span>a</span></div>"#
        );
    }

    #[test]
    fn test_rewrite_tags_leaves_custom_components() {
        let out = rewrite_tags("<member-card></member-card>").unwrap();
        assert_eq!(out, "<member-card></member-card>");
    }

    #[test]
    fn test_event_attributes() {
        let out = rewrite_attributes(
            r#"<div bindtap="onTap" catch:longpress="onHold" data-id="3"></div>"#,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<div data-id="3" onclick="wxDispatch(event, 'tap', 'onTap', false)" oncontextmenu="wxDispatch(event, 'longpress', 'onHold', true)"></div>"#
        );
    }

    #[test]
    fn test_navigator_url_becomes_href() {
        let out = rewrite_attributes(r#"<a url="/pages/home/index" open-type="switchTab"></a>"#)
            .unwrap();
        assert_eq!(
            out,
            r#"<a href="/pages/home/index" data-open-type="switchTab"></a>"#
        );
    }

    #[test]
    fn test_image_mode_becomes_object_fit() {
        let out =
            rewrite_attribute_values(r#"<img src="a.png" mode="aspectFill" style="width: 10px">"#)
                .unwrap();
        assert_eq!(
            out,
            r#"<img src="a.png" style="object-fit: cover; width: 10px">"#
        );
    }

    #[test]
    fn test_button_type_becomes_class() {
        let out =
            rewrite_attribute_values(r#"<button type="primary" class="wide" size="mini">"#).unwrap();
        assert_eq!(
            out,
            r#"<button class="wx-button-mini wx-button-primary wide" type="button">"#
        );
    }

    #[test]
    fn test_password_input() {
        let out = rewrite_attribute_values(r#"<input password type="text" />"#).unwrap();
        assert_eq!(out, r#"<input type="password" />"#);
    }

    #[test]
    fn test_text_interpolation() {
        let out = interpolate_text("Hi {{ user.name }}!").unwrap();
        assert_eq!(
            out,
            r#"Hi <span data-expression="user.name">{{user.name}}</span>!"#
        );
    }

    #[test]
    fn test_attribute_interpolation_is_paired() {
        let out = rewrite_interpolations(r#"<img src="{{avatar}}" class="a {{cls}}">"#).unwrap();
        assert_eq!(
            out,
            r#"<img src="{{avatar}}" class="a {{cls}}" data-bind-src="{{avatar}}" data-bind-class="a {{cls}}">"#
        );
    }

    #[test]
    fn test_unterminated_interpolation_fails_open() {
        let source = "<view>{{ broken</view>";
        assert!(matches!(
            run_pipeline(source),
            Err(ConvertError::UnterminatedInterpolation { .. })
        ));
        assert_eq!(convert(source), source);
    }

    #[test]
    fn test_conditionals() {
        let out = rewrite_conditionals(
            r#"<div wx:if="{{ show }}" style="color: red">A</div><div wx:else>B</div><div hidden="{{off}}">C</div>"#,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<div data-wx-if="show" style="display: none; color: red">A</div><div data-wx-else="" style="display: none;">B</div><div data-wx-hidden="off">C</div>"#
        );
    }

    #[test]
    fn test_static_hidden_is_untouched() {
        let out = rewrite_conditionals("<div hidden>C</div>").unwrap();
        assert_eq!(out, "<div hidden>C</div>");
    }

    #[test]
    fn test_loops() {
        let out = rewrite_loops(
            r#"<div wx:for="{{list}}" wx:for-item="m" wx:for-index="i" wx:key="id"></div>"#,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<div data-wx-for="list" data-wx-for-item="m" data-wx-for-index="i" data-wx-key="id" style="display: none;"></div>"#
        );
    }

    #[test]
    fn test_conditional_list_is_hidden_once() {
        let out = convert(r#"<view wx:for="{{rows}}" wx:if="{{ready}}" style="color: red"></view>"#);
        assert_eq!(out.matches("display: none").count(), 1, "{}", out);
        assert!(out.contains(r#"style="display: none; color: red""#), "{}", out);
    }

    #[test]
    fn test_templates_and_imports() {
        let out = rewrite_templates(
            r#"<import src="../tpl/card.wxml"/><template name="card"><div>x</div></template><template is="card" data="{{...item}}"/>"#,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"<!-- wx:import ../tpl/card.wxml --><div data-wx-template="card" style="display: none;"><div>x</div></div><div data-wx-template-is="card" data-wx-template-data="...item" />"#
        );
    }

    #[test]
    fn test_components_merge_class() {
        let out = rewrite_components(r#"<member-card class="big" member="{{m}}"></member-card>"#)
            .unwrap();
        assert_eq!(
            out,
            r#"<div class="wx-component big" member="{{m}}" data-component="member-card"></div>"#
        );
    }

    #[test]
    fn test_normalize_self_closing() {
        let out = normalize_markup("\n\n<div />\n\n\n<img src=\"a\"></img><input />\n").unwrap();
        assert_eq!(out, "<div></div>\n<img src=\"a\"><input>");
    }

    #[test]
    fn test_strip_braces() {
        assert_eq!(strip_braces("{{ a.b }}"), "a.b");
        assert_eq!(strip_braces(" item "), "item");
        assert_eq!(strip_braces("{{a}} b"), "{{a}} b");
    }
}
