//! WXSS → CSS Converter
//!
//! Staged text rewrite of Mini Program stylesheets into standard CSS:
//!
//! 1. comments are stripped first, so later stages never see commented-out
//!    tokens,
//! 2. `rpx` lengths become `vw` against the 750-unit design width,
//! 3. component type selectors are rewritten to their HTML counterparts,
//! 4. `.wxss` imports point at the converted `.css` files,
//! 5. `display: flex`, `position: sticky` and `overflow: scroll` get their
//!    WebKit fallbacks,
//! 6. compatibility properties get `-webkit-` and `-moz-` copies,
//! 7. adjacent rules with the same selector are merged and empty rules are
//!    dropped,
//! 8. the baseline stylesheet is prepended.
//!
//! Running the converter twice on its own output is not supported.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::error::ConvertError;
use crate::tags::lookup_selector;

/// Width of the design canvas in `rpx`; `DESIGN_WIDTH rpx == 100vw`.
pub const DESIGN_WIDTH: f64 = 750.0;

/// Properties that are emitted with vendor-prefixed copies.
pub const PREFIXED_PROPERTIES: &[&str] = &[
    "transform",
    "transform-origin",
    "transition",
    "transition-property",
    "transition-duration",
    "transition-timing-function",
    "transition-delay",
    "animation",
    "animation-name",
    "animation-duration",
    "animation-timing-function",
    "animation-delay",
    "animation-iteration-count",
    "animation-direction",
    "animation-fill-mode",
    "flex",
    "flex-direction",
    "flex-wrap",
    "flex-flow",
    "flex-grow",
    "flex-shrink",
    "flex-basis",
    "justify-content",
    "align-items",
    "align-self",
    "align-content",
    "order",
    "box-shadow",
    "border-radius",
    "box-sizing",
    "user-select",
    "appearance",
    "backdrop-filter",
    "filter",
];

/// Prepended to every converted stylesheet so the output stands alone.
pub const BASE_STYLESHEET: &str = r#"/* wx-preview base styles */
body {
  margin: 0;
  font-family: -apple-system, BlinkMacSystemFont, "PingFang SC", "Helvetica Neue", sans-serif;
  font-size: 16px;
  line-height: 1.4;
  -webkit-tap-highlight-color: transparent;
}
div, span, img, input, textarea, button {
  box-sizing: border-box;
}
img {
  display: inline-block;
  max-width: 100%;
}
button {
  display: block;
  width: 100%;
  padding: 0 14px;
  border: 1px solid rgba(0, 0, 0, 0.2);
  border-radius: 5px;
  background: #f8f8f8;
  color: #000;
  font-size: 18px;
  line-height: 2.55;
}
button.wx-button-primary { background: #07c160; border-color: #07c160; color: #fff; }
button.wx-button-warn { background: #e64340; border-color: #e64340; color: #fff; }
button.wx-button-mini { display: inline-block; width: auto; font-size: 13px; line-height: 2.3; }
.wx-block { display: contents; }
.wx-scroll-view { overflow: auto; -webkit-overflow-scrolling: touch; }
.wx-swiper { position: relative; overflow: hidden; display: flex; }
.wx-swiper-item { flex: 0 0 100%; width: 100%; height: 100%; }
.wx-component { display: block; }
.wx-icon { display: inline-block; font-style: normal; }
.flex { display: -webkit-box; display: -webkit-flex; display: flex; }
.flex-row { -webkit-flex-direction: row; flex-direction: row; }
.flex-column { -webkit-flex-direction: column; flex-direction: column; }
.flex-1 { -webkit-flex: 1; flex: 1; }
.flex-wrap { -webkit-flex-wrap: wrap; flex-wrap: wrap; }
.items-center { -webkit-align-items: center; align-items: center; }
.justify-center { -webkit-justify-content: center; justify-content: center; }
.justify-between { -webkit-justify-content: space-between; justify-content: space-between; }
.wx-hidden { display: none !important; }
.wx-visible { display: block !important; }
@keyframes wx-fade-in { from { opacity: 0; } to { opacity: 1; } }
@keyframes wx-slide-up { from { transform: translateY(100%); } to { transform: translateY(0); } }
@keyframes wx-loading-spin { from { transform: rotate(0deg); } to { transform: rotate(360deg); } }
"#;

pub type Stage = fn(&str) -> Result<String, ConvertError>;

/// The stages in execution order. Comment stripping must stay first.
pub const STAGES: &[(&str, Stage)] = &[
    ("strip_comments", strip_comments),
    ("convert_rpx", convert_rpx),
    ("rewrite_selectors", rewrite_selectors),
    ("rewrite_imports", rewrite_imports),
    ("special_values", special_values),
    ("prefix_properties", prefix_properties),
    ("clean_rules", clean_rules),
    ("prepend_boilerplate", prepend_boilerplate),
];

lazy_static! {
    // the leading group keeps identifiers such as `.mt-20rpx` out
    static ref RPX_RE: Regex =
        Regex::new(r"(^|[^\w.-])(-?(?:\d+\.?\d*|\.\d+))rpx\b").unwrap();
    static ref PRELUDE_RE: Regex = Regex::new(r"([^{}]+)\{").unwrap();
    static ref BLOCK_RE: Regex = Regex::new(r"\{([^{}]*)\}").unwrap();
    static ref RULE_RE: Regex = Regex::new(r"([^{};]+)\{([^{}]*)\}").unwrap();
    static ref EMPTY_RULE_RE: Regex = Regex::new(r"(^|[{};])[^{};]*\{\s*\}").unwrap();
    static ref IMPORT_RE: Regex =
        Regex::new(r#"@import\s+(url\()?(["']?)([^"')\s;]+)\.wxss(["']?)(\))?"#).unwrap();
}

/// Convert a WXSS stylesheet. Never fails: on an internal error the input is
/// returned unchanged.
pub fn convert(source: &str) -> String {
    match run_stages(source) {
        Ok(css) => css,
        Err(e) => {
            log::warn!("wxss conversion failed, passing source through: {}", e);
            source.to_string()
        }
    }
}

pub fn run_stages(source: &str) -> Result<String, ConvertError> {
    let mut current = source.to_string();
    for (name, stage) in STAGES {
        current = stage(&current)?;
        log::trace!("wxss stage {} -> {} bytes", name, current.len());
    }
    Ok(current)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn strip_comments(css: &str) -> Result<String, ConvertError> {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    let mut offset = 0;

    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("*/")
            .ok_or(ConvertError::UnterminatedComment {
                offset: offset + start,
            })?;
        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// `100rpx` → `13.3333vw`.
pub fn convert_rpx(css: &str) -> Result<String, ConvertError> {
    Ok(RPX_RE
        .replace_all(css, |caps: &Captures| match caps[2].parse::<f64>() {
            Ok(value) => format!("{}{}vw", &caps[1], rpx_to_vw(value)),
            Err(_) => caps[0].to_string(),
        })
        .into_owned())
}

/// Rescale an rpx length to vw, rounded to 4 decimal places.
pub fn rpx_to_vw(rpx: f64) -> String {
    let vw = rpx * 100.0 / DESIGN_WIDTH;
    let rounded = (vw * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

pub fn rewrite_selectors(css: &str) -> Result<String, ConvertError> {
    check_balanced(css)?;
    Ok(PRELUDE_RE
        .replace_all(css, |caps: &Captures| {
            // statements such as `@import ...;` can precede the selector
            let prelude = &caps[1];
            let split = prelude.rfind(';').map(|p| p + 1).unwrap_or(0);
            let (head, selector) = prelude.split_at(split);
            if selector.trim_start().starts_with('@') {
                caps[0].to_string()
            } else {
                format!("{}{}{{", head, rewrite_selector_list(selector))
            }
        })
        .into_owned())
}

/// Replace whole type-selector tokens. Class, id, pseudo and attribute
/// contexts as well as longer hyphenated identifiers are left alone.
fn rewrite_selector_list(prelude: &str) -> String {
    let chars: Vec<char> = prelude.chars().collect();
    let mut out = String::with_capacity(prelude.len() + 8);
    let mut bracket_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ => {}
        }

        if bracket_depth == 0 && is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            let prev = if start == 0 { None } else { Some(chars[start - 1]) };
            let in_type_position = !matches!(prev, Some('.') | Some('#') | Some(':') | Some('-'))
                && !prev.map(is_ident_char).unwrap_or(false);

            match lookup_selector(&ident) {
                Some(replacement) if in_type_position => out.push_str(replacement),
                _ => out.push_str(&ident),
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn check_balanced(css: &str) -> Result<(), ConvertError> {
    let mut depth: i64 = 0;
    for c in css.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ConvertError::UnbalancedBraces);
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(ConvertError::UnbalancedBraces)
    }
}

pub fn rewrite_imports(css: &str) -> Result<String, ConvertError> {
    Ok(IMPORT_RE
        .replace_all(css, |caps: &Captures| {
            let open = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let close = caps.get(5).map(|m| m.as_str()).unwrap_or("");
            format!(
                "@import {}{}{}.css{}{}",
                open, &caps[2], &caps[3], &caps[4], close
            )
        })
        .into_owned())
}

/// Values the preview browsers need a fallback for, keyed by
/// `(property, value)`.
const SPECIAL_VALUES: &[(&str, &str, &[&str])] = &[
    ("display", "flex", &["display: -webkit-flex", "display: flex"]),
    ("position", "sticky", &["position: -webkit-sticky", "position: sticky"]),
    (
        "overflow",
        "scroll",
        &["overflow: auto", "-webkit-overflow-scrolling: touch"],
    ),
];

pub fn special_values(css: &str) -> Result<String, ConvertError> {
    Ok(map_declarations(css, |decl| {
        let (property, value) = decl.split_once(':')?;
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim().to_ascii_lowercase();
        let (_, _, replacement) = SPECIAL_VALUES
            .iter()
            .find(|(p, v, _)| *p == property && *v == value)?;
        let indent = &decl[..decl.len() - decl.trim_start().len()];
        Some(
            replacement
                .iter()
                .map(|r| format!("{}{}", indent, r))
                .collect::<Vec<_>>()
                .join(";"),
        )
    }))
}

/// Rewrite every declaration of every innermost block; `None` keeps the
/// declaration as written.
fn map_declarations(css: &str, rewrite: impl Fn(&str) -> Option<String>) -> String {
    BLOCK_RE
        .replace_all(css, |caps: &Captures| {
            let block = split_declarations(&caps[1])
                .into_iter()
                .map(|decl| rewrite(decl).unwrap_or_else(|| decl.to_string()))
                .collect::<Vec<_>>()
                .join(";");
            format!("{{{}}}", block)
        })
        .into_owned()
}

pub fn prefix_properties(css: &str) -> Result<String, ConvertError> {
    Ok(map_declarations(css, |decl| {
        let colon = decl.find(':')?;
        let property = decl[..colon].trim().to_ascii_lowercase();
        if !PREFIXED_PROPERTIES.contains(&property.as_str()) {
            return None;
        }
        let indent = &decl[..decl.len() - decl.trim_start().len()];
        let value = decl[colon + 1..].trim();
        Some(format!(
            "{indent}-webkit-{p}: {v};{indent}-moz-{p}: {v};{indent}{p}: {v}",
            indent = indent,
            p = property,
            v = value
        ))
    }))
}

/// Merge back-to-back rules that share a selector, then drop rules left
/// with an empty body (repeated, so an `@media` emptied this way goes too).
pub fn clean_rules(css: &str) -> Result<String, ConvertError> {
    let mut current = merge_adjacent_rules(css);
    loop {
        let next = EMPTY_RULE_RE.replace_all(&current, "$1").into_owned();
        if next == current {
            return Ok(current);
        }
        current = next;
    }
}

fn merge_adjacent_rules(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut cursor = 0;
    let mut pending: Option<(String, String)> = None;

    for caps in RULE_RE.captures_iter(css) {
        let (Some(whole), Some(selector), Some(body)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let gap = &css[cursor..whole.start()];

        if let Some((open_selector, open_body)) = pending.as_mut() {
            if gap.trim().is_empty() && open_selector.trim() == selector.as_str().trim() {
                let head = open_body.trim_end();
                let separator = if head.is_empty() || head.ends_with(';') { "" } else { ";" };
                *open_body = format!("{}{}{}", head, separator, body.as_str());
                cursor = whole.end();
                continue;
            }
        }
        if let Some((open_selector, open_body)) = pending.take() {
            out.push_str(&format!("{}{{{}}}", open_selector, open_body));
        }
        out.push_str(gap);
        pending = Some((selector.as_str().to_string(), body.as_str().to_string()));
        cursor = whole.end();
    }

    if let Some((open_selector, open_body)) = pending {
        out.push_str(&format!("{}{{{}}}", open_selector, open_body));
    }
    out.push_str(&css[cursor..]);
    out
}

/// Split a declaration block on `;`, ignoring separators inside parentheses
/// and strings (`url(data:...;base64,...)`).
fn split_declarations(block: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in block.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                parts.push(&block[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&block[start..]);
    parts
}

pub fn prepend_boilerplate(css: &str) -> Result<String, ConvertError> {
    let mut out = String::with_capacity(BASE_STYLESHEET.len() + css.len() + 1);
    out.push_str(BASE_STYLESHEET);
    out.push('\n');
    out.push_str(css);
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(css: &str) -> &str {
        css.strip_prefix(BASE_STYLESHEET)
            .map(|rest| rest.trim_start_matches('\n'))
            .expect("converted css starts with the base stylesheet")
    }

    #[test]
    fn test_box_width_scenario() {
        let css = convert(".box { width: 100rpx; }");
        assert!(css.starts_with(BASE_STYLESHEET));
        assert!(body(&css).contains("width: 13.3333vw;"));
    }

    #[test]
    fn test_rpx_values() {
        assert_eq!(rpx_to_vw(750.0), "100");
        assert_eq!(rpx_to_vw(375.0), "50");
        assert_eq!(rpx_to_vw(1.0), "0.1333");
        assert_eq!(rpx_to_vw(0.0), "0");
        assert_eq!(rpx_to_vw(-30.0), "-4");
        assert_eq!(
            convert_rpx("margin: 0 20rpx .5rpx -15rpx;").unwrap(),
            "margin: 0 2.6667vw 0.0667vw -2vw;"
        );
    }

    #[test]
    fn test_rpx_law() {
        for l in [1.0, 7.5, 24.0, 99.0, 100.0, 333.0, 640.0, 1500.0] {
            let out = convert_rpx(&format!("{}rpx", l)).unwrap();
            let n: f64 = out.trim_end_matches("vw").parse().unwrap();
            assert!((n - l / 750.0 * 100.0).abs() <= 0.0001, "{} -> {}", l, out);
        }
    }

    #[test]
    fn test_rpx_inside_identifiers_is_kept() {
        assert_eq!(
            convert_rpx(".mt-20rpx, .p10rpx { margin-top: 20rpx; }").unwrap(),
            ".mt-20rpx, .p10rpx { margin-top: 2.6667vw; }"
        );
    }

    #[test]
    fn test_special_values() {
        let css = convert(".a { display: flex; position: sticky; }");
        assert_eq!(
            body(&css),
            ".a { display: -webkit-flex; display: flex; position: -webkit-sticky; position: sticky; }"
        );
        assert_eq!(
            special_values(".s { overflow: scroll; overflow-x: scroll; }").unwrap(),
            ".s { overflow: auto; -webkit-overflow-scrolling: touch; overflow-x: scroll; }"
        );
    }

    #[test]
    fn test_clean_rules() {
        assert_eq!(
            clean_rules(".a { color: red; }\n.a { margin: 0; }\n.b { }\n.c { top: 0 }").unwrap(),
            ".a { color: red; margin: 0; }\n.c { top: 0 }"
        );
        assert_eq!(
            clean_rules("@media (max-width: 1px) { .x { } } .y { left: 0; }").unwrap(),
            " .y { left: 0; }"
        );
        assert_eq!(
            clean_rules(".a { color: red; } .b { top: 0; } .a { margin: 0; }").unwrap(),
            ".a { color: red; } .b { top: 0; } .a { margin: 0; }"
        );
    }

    #[test]
    fn test_utility_classes_in_base() {
        assert!(BASE_STYLESHEET.contains(".wx-hidden { display: none !important; }"));
        assert!(BASE_STYLESHEET.contains(".wx-visible { display: block !important; }"));
    }

    #[test]
    fn test_comments_stripped_before_rewrites() {
        let css = run_stages("/* view { width: 10rpx } */ .a { color: red; }").unwrap();
        let rest = body(&css);
        assert!(!rest.contains("div"));
        assert!(!rest.contains("vw"));
        assert!(rest.contains(".a { color: red; }"));
    }

    #[test]
    fn test_unterminated_comment_passes_through() {
        let source = ".a { color: red; } /* oops";
        assert_eq!(convert(source), source);
    }

    #[test]
    fn test_selectors_whole_token() {
        let out = rewrite_selectors(
            "view, .view, #text, text-box, scroll-view > image:active { text-align: center; }",
        )
        .unwrap();
        assert_eq!(
            out,
            "div, .view, #text, text-box, .wx-scroll-view > img:active { text-align: center; }"
        );
    }

    #[test]
    fn test_selectors_inside_media_and_keyframes() {
        let out = rewrite_selectors(
            "@media (max-width: 400px) { view { color: red; } } @keyframes spin { from { opacity: 0; } }",
        )
        .unwrap();
        assert!(out.contains("@media (max-width: 400px) { div {"));
        assert!(out.contains("from { opacity: 0; }"));
    }

    #[test]
    fn test_page_selector() {
        let out = rewrite_selectors("page { background: #f5f5f5; }").unwrap();
        assert_eq!(out, "body { background: #f5f5f5; }");
    }

    #[test]
    fn test_prefix_expansion_preserves_order() {
        let out = prefix_properties(".a { color: red; transform: scale(2); width: 1px; }").unwrap();
        assert_eq!(
            out,
            ".a { color: red; -webkit-transform: scale(2); -moz-transform: scale(2); transform: scale(2); width: 1px; }"
        );
    }

    #[test]
    fn test_prefix_ignores_already_prefixed_and_semicolons_in_urls() {
        let out = prefix_properties(
            ".a { -webkit-transform: none; background: url(data:image/png;base64,AA); }",
        )
        .unwrap();
        assert_eq!(
            out,
            ".a { -webkit-transform: none; background: url(data:image/png;base64,AA); }"
        );
    }

    #[test]
    fn test_imports_point_at_css() {
        let out = rewrite_imports("@import \"../../app.wxss\";\n@import url('a.wxss');").unwrap();
        assert_eq!(out, "@import \"../../app.css\";\n@import url('a.css');");
    }

    #[test]
    fn test_not_idempotent() {
        let once = convert(".a { flex: 1; }");
        let twice = convert(&once);
        assert!(twice.len() > once.len());
        assert_eq!(twice.matches("@keyframes wx-fade-in").count(), 2);
    }
}
