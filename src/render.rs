//! Markup rendering of built results.
//!
//! Groups are concatenated in primary-then-secondary encounter order,
//! entries within a bin in ascending offset order. A condition key other
//! than `none` (the secondary for js, the primary for css) wraps its
//! whole group's markup in a single conditional-comment envelope.

use crate::kind::AssetKind;
use crate::registry::{BuiltResult, TypeRegistry};

/// Render one kind's built registry, optionally restricted to a single
/// primary and/or secondary key.
pub(crate) fn render(
    kind: AssetKind,
    registry: &TypeRegistry,
    all_offset: i64,
    cache_dir: &str,
    primary: Option<&str>,
    secondary: Option<&str>,
) -> String {
    let mut out = String::new();
    for (primary_key, secondaries) in &registry.groups {
        if primary.is_some_and(|want| want != primary_key) {
            continue;
        }
        let mut group = String::new();
        for (secondary_key, bin) in secondaries {
            if secondary.is_some_and(|want| want != secondary_key) {
                continue;
            }
            let mut fragments = String::new();
            for result in bin.visible(all_offset) {
                fragments.push_str(&fragment(kind, result, cache_dir, secondary_key));
            }
            if fragments.is_empty() {
                continue;
            }
            if kind == AssetKind::Js && secondary_key != "none" {
                group.push_str(&conditional(secondary_key, &fragments));
            } else {
                group.push_str(&fragments);
            }
        }
        if group.is_empty() {
            continue;
        }
        if kind == AssetKind::Css && primary_key != "none" {
            out.push_str(&conditional(primary_key, &group));
        } else {
            out.push_str(&group);
        }
    }
    out
}

/// One result as markup: embedded fragment, raw remote reference, or a
/// cache-addressed reference tag.
fn fragment(kind: AssetKind, result: &BuiltResult, cache_dir: &str, media: &str) -> String {
    match kind {
        AssetKind::Js => {
            if result.inline {
                format!(
                    "<script type=\"text/javascript\">{}</script>",
                    result.content
                )
            } else {
                let src = if result.remote {
                    result.hash.clone()
                } else {
                    format!("/{cache_dir}/js/{}.js", result.hash)
                };
                format!("<script type=\"text/javascript\" src=\"{src}\"></script>")
            }
        }
        AssetKind::Css => {
            if result.inline {
                format!("<style type=\"text/css\">{}</style>", result.content)
            } else {
                let href = if result.remote {
                    result.hash.clone()
                } else {
                    format!("/{cache_dir}/css/{}.css", result.hash)
                };
                format!(
                    "<link href=\"{href}\" media=\"{media}\" rel=\"stylesheet\" type=\"text/css\" />"
                )
            }
        }
    }
}

fn conditional(condition: &str, inner: &str) -> String {
    format!("<!--[if {condition}]>{inner}<![endif]-->")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AssetEntry, Registry};

    fn built(tag: &str, remote: bool, inline: bool) -> AssetEntry {
        AssetEntry {
            source: String::new(),
            content: tag.to_string(),
            inline,
            remote,
            render_inline: inline,
            compress: None,
            merge: None,
            scss: false,
            scss_options: None,
            result: Some(BuiltResult {
                hash: tag.to_string(),
                content: tag.to_string(),
                remote,
                inline,
                merge: false,
            }),
        }
    }

    fn insert(reg: &mut Registry, kind: AssetKind, primary: &str, secondary: &str, e: AssetEntry) {
        reg.insert(kind, primary.into(), secondary.into(), None, -1000, e)
            .unwrap();
    }

    #[test]
    fn test_inline_style_renders_verbatim() {
        let mut reg = Registry::default();
        insert(
            &mut reg,
            AssetKind::Css,
            "none",
            "all",
            built("body{color:red}", false, true),
        );
        let out = render(AssetKind::Css, reg.get(AssetKind::Css), -1000, "assetmix", None, None);
        assert_eq!(out, "<style type=\"text/css\">body{color:red}</style>");
    }

    #[test]
    fn test_css_reference_tag_carries_media() {
        let mut reg = Registry::default();
        insert(&mut reg, AssetKind::Css, "none", "print", built("abc123", false, false));
        let out = render(AssetKind::Css, reg.get(AssetKind::Css), -1000, "assetmix", None, None);
        assert_eq!(
            out,
            "<link href=\"/assetmix/css/abc123.css\" media=\"print\" rel=\"stylesheet\" type=\"text/css\" />"
        );
    }

    #[test]
    fn test_remote_script_uses_raw_url() {
        let mut reg = Registry::default();
        insert(
            &mut reg,
            AssetKind::Js,
            "body",
            "none",
            built("//cdn.example.com/lib.js", true, false),
        );
        let out = render(AssetKind::Js, reg.get(AssetKind::Js), -1000, "assetmix", None, None);
        assert_eq!(
            out,
            "<script type=\"text/javascript\" src=\"//cdn.example.com/lib.js\"></script>"
        );
    }

    #[test]
    fn test_condition_group_wraps_once() {
        let mut reg = Registry::default();
        insert(&mut reg, AssetKind::Css, "ie", "all", built("one", false, false));
        insert(&mut reg, AssetKind::Css, "ie", "all", built("two", false, false));
        let out = render(AssetKind::Css, reg.get(AssetKind::Css), -1000, "assetmix", None, None);
        assert!(out.starts_with("<!--[if ie]>"));
        assert!(out.ends_with("<![endif]-->"));
        assert_eq!(out.matches("<!--[if").count(), 1);
        assert!(out.contains("one.css"));
        assert!(out.contains("two.css"));
    }

    #[test]
    fn test_js_condition_is_the_secondary_key() {
        let mut reg = Registry::default();
        insert(&mut reg, AssetKind::Js, "head", "lt ie 9", built("shim", false, false));
        let out = render(AssetKind::Js, reg.get(AssetKind::Js), -1000, "assetmix", None, None);
        assert_eq!(
            out,
            "<!--[if lt ie 9]><script type=\"text/javascript\" src=\"/assetmix/js/shim.js\"></script><![endif]-->"
        );
    }

    #[test]
    fn test_groups_concatenate_in_encounter_order() {
        let mut reg = Registry::default();
        insert(&mut reg, AssetKind::Js, "footer", "none", built("f", false, false));
        insert(&mut reg, AssetKind::Js, "head", "none", built("h", false, false));
        let out = render(AssetKind::Js, reg.get(AssetKind::Js), -1000, "assetmix", None, None);
        let footer = out.find("f.js").unwrap();
        let head = out.find("h.js").unwrap();
        assert!(footer < head);
    }

    #[test]
    fn test_filter_restricts_to_matching_group() {
        let mut reg = Registry::default();
        insert(&mut reg, AssetKind::Js, "head", "none", built("h", false, false));
        insert(&mut reg, AssetKind::Js, "body", "none", built("b", false, false));
        let out = render(
            AssetKind::Js,
            reg.get(AssetKind::Js),
            -1000,
            "assetmix",
            Some("head"),
            None,
        );
        assert!(out.contains("h.js"));
        assert!(!out.contains("b.js"));
    }

    #[test]
    fn test_unbuilt_entries_render_nothing() {
        let mut reg = Registry::default();
        let mut e = built("x", false, false);
        e.result = None;
        insert(&mut reg, AssetKind::Js, "body", "none", e);
        let out = render(AssetKind::Js, reg.get(AssetKind::Js), -1000, "assetmix", None, None);
        assert!(out.is_empty());
    }
}
