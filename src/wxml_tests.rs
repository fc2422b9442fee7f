//! Whole-pipeline markup conversion checks over the tag table, custom
//! component tags and representative page snippets.

#[cfg(test)]
mod tests {
    use crate::tags::TAG_TABLE;
    use crate::wxml::convert;
    use pretty_assertions::assert_eq;
    use regex::Regex;

    fn tag_token(name: &str) -> Regex {
        Regex::new(&format!(r"</?{}[\s/>]", regex::escape(name))).unwrap()
    }

    #[test]
    fn test_every_table_tag_is_mapped() {
        for mapping in TAG_TABLE {
            let out = convert(&format!("<{}/>", mapping.wx));
            assert!(
                tag_token(mapping.html).is_match(&out),
                "<{}/> -> {}",
                mapping.wx,
                out
            );
            if mapping.wx != mapping.html {
                assert!(
                    !tag_token(mapping.wx).is_match(&out),
                    "<{}/> still present in {}",
                    mapping.wx,
                    out
                );
            }
            if let Some(class) = mapping.class {
                assert!(out.contains(class), "<{}/> lost class {}", mapping.wx, class);
            }
        }
    }

    #[test]
    fn test_custom_tags_become_component_hosts() {
        for name in ["member-card", "user-avatar-2", "x-list", "match-result-panel"] {
            let out = convert(&format!("<{0}></{0}>", name));
            assert_eq!(
                out,
                format!(
                    r#"<div class="wx-component" data-component="{}"></div>"#,
                    name
                )
            );
        }
    }

    #[test]
    fn test_if_else_pair() {
        assert_eq!(
            convert(r#"<view wx:if="{{show}}">A</view><view wx:else>B</view>"#),
            r#"<div data-wx-if="show" style="display: none;">A</div><div data-wx-else="" style="display: none;">B</div>"#
        );
    }

    #[test]
    fn test_list_item_snippet() {
        let out = convert(
            r#"<view class="list">
  <view wx:for="{{items}}" wx:key="id" class="row" bindtap="onPick" data-id="{{item.id}}">
    <image src="{{item.avatar}}" mode="aspectFill"/>
    <text>{{item.name}}</text>
  </view>
</view>"#,
        );
        assert!(out.contains(r#"data-wx-for="items""#), "{}", out);
        assert!(out.contains(r#"data-wx-key="id""#), "{}", out);
        assert!(out.contains(r#"data-bind-data-id="{{item.id}}""#), "{}", out);
        assert!(out.contains("onclick=\"wxDispatch(event, 'tap', 'onPick', false)\""), "{}", out);
        assert!(out.contains(r#"data-bind-src="{{item.avatar}}""#), "{}", out);
        assert!(out.contains("object-fit: cover"), "{}", out);
        assert!(
            out.contains(r#"<span><span data-expression="item.name">{{item.name}}</span></span>"#),
            "{}",
            out
        );
        assert!(!out.contains("<view"), "{}", out);
        assert!(!out.contains("</image>"), "{}", out);
    }

    #[test]
    fn test_form_snippet() {
        let out = convert(
            r#"<form bindsubmit="onSubmit"><input password placeholder-class="ph" bindinput="onInput"/><button form-type="submit" type="primary">Go</button></form>"#,
        );
        assert!(out.contains(r#"type="password""#), "{}", out);
        assert!(out.contains(r#"data-placeholder-class="ph""#), "{}", out);
        assert!(out.contains(r#"type="submit""#), "{}", out);
        assert!(out.contains("wx-button-primary"), "{}", out);
        assert!(out.contains("onsubmit=\"wxDispatch(event, 'submit', 'onSubmit', false)\""), "{}", out);
    }

    #[test]
    fn test_wrappers_and_templates() {
        let out = convert(
            r#"<?xml version="1.0"?>
<import src="/tpl/card.wxml"/>
<wxs module="fmt">module.exports = {};</wxs>
<template name="card"><text>{{title}}</text></template>
<template is="card" data="{{title: heading}}"/>"#,
        );
        assert!(!out.contains("<?xml"), "{}", out);
        assert!(out.contains("<!-- wx:import /tpl/card.wxml -->"), "{}", out);
        assert!(out.contains("<!-- wx:wxs fmt -->"), "{}", out);
        assert!(out.contains(r#"data-wx-template="card""#), "{}", out);
        assert!(out.contains(r#"data-wx-template-is="card""#), "{}", out);
        assert!(out.contains(r#"data-wx-template-data="title: heading""#), "{}", out);
        assert!(!out.contains("<template"), "{}", out);
    }

    #[test]
    fn test_malformed_markup_passes_through() {
        for source in ["<view class=\"a\"", "<view><!-- open", "<text>{{ a </text>"] {
            assert_eq!(convert(source), source);
        }
    }
}
