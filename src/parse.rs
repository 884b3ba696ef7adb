//! Best-effort markup scanner.
//!
//! Extracts `<script>`, inline `<style>` and `<link rel=stylesheet>`
//! tags, plus conditional-comment wrappers, and turns each into a
//! pending registration. Tags found inside `<head>` register js with
//! `place = head`, everything else with `place = body`. Per-tag
//! `data-assetmix-*` attributes override inferred options. This is a
//! scanner, not an HTML parser; malformed markup degrades to fewer
//! matches, never to an error.

use crate::config::ScssSettings;
use crate::kind::AssetKind;
use crate::registry::AssetOptions;
use regex::Regex;
use std::sync::LazyLock;

static HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<head>(.*?)</head>").unwrap());

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?si)<!--.*?\[.*?if([^\]]*)\].*?>(.*?)<!.*?\[.*?endif.*?\].*?-->").unwrap()
});

static SCRIPT_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)<script[^>]*?src\s*=\s*("|'|)([^"' >]*).*?>.*?</script\s*>"#).unwrap()
});

static SCRIPT_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<script[^>]*>(.*?)</script\s*>").unwrap());

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)<link[^>]*?rel\s*=\s*("|'|)stylesheet("|'|\s|>|/)[^>]*>"#).unwrap()
});

static MEDIA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?si)media\s*=\s*("|'|)([^"' >/]*)"#).unwrap());

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?si)href\s*=\s*("|'|)([^"' >]*)"#).unwrap());

static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<style[^>]*>(.*?)</style\s*>").unwrap());

static DATA_OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)\sdata-assetmix-([a-z0-9_-]+)\s*=\s*("|'|)([^"' >]*)"#).unwrap()
});

/// One tag lifted out of the markup, ready to re-register.
#[derive(Debug, Clone)]
pub(crate) struct Extracted {
    pub kind: AssetKind,
    /// Path/URL, or literal content when `options.inline` is set.
    pub source: String,
    pub options: AssetOptions,
}

/// Scan markup for registerable tags. Unconditional tags come first,
/// conditional ones after, each group in document order.
pub(crate) fn scan(html: &str) -> Vec<Extracted> {
    let mut head = String::new();
    let mut body = html.to_string();
    for caps in HEAD_RE.captures_iter(html) {
        head.push_str(&caps[1]);
        body = body.replace(&caps[0], "");
    }

    let mut plain = Vec::new();
    let mut conditional = Vec::new();

    for (fragment, place) in [(&mut head, "head"), (&mut body, "body")] {
        for caps in CONDITION_RE.captures_iter(&fragment.clone()) {
            let condition = caps[1].trim().to_string();
            let inner = &caps[2];
            scan_js(inner, place, Some(&condition), &mut conditional);
            scan_css(inner, Some(&condition), &mut conditional);
            *fragment = fragment.replace(&caps[0], "");
        }
    }

    scan_js(&head, "head", None, &mut plain);
    scan_js(&body, "body", None, &mut plain);
    scan_css(&head, None, &mut plain);
    scan_css(&body, None, &mut plain);

    plain.extend(conditional);
    plain
}

/// Overlay caller options on top of scanned ones: every field the caller
/// set wins.
pub(crate) fn overlay(mut scanned: AssetOptions, base: &AssetOptions) -> AssetOptions {
    if base.place.is_some() {
        scanned.place = base.place.clone();
    }
    if base.condition.is_some() {
        scanned.condition = base.condition.clone();
    }
    if base.media.is_some() {
        scanned.media = base.media.clone();
    }
    if base.remote {
        scanned.remote = true;
    }
    if base.render_inline.is_some() {
        scanned.render_inline = base.render_inline;
    }
    if base.compress.is_some() {
        scanned.compress = base.compress;
    }
    if base.merge.is_some() {
        scanned.merge = base.merge;
    }
    if base.scss.is_some() {
        scanned.scss = base.scss;
    }
    if base.scss_options.is_some() {
        scanned.scss_options = base.scss_options.clone();
    }
    if base.remote_hash.is_some() {
        scanned.remote_hash = base.remote_hash.clone();
    }
    scanned
}

fn scan_js(html: &str, place: &str, condition: Option<&str>, out: &mut Vec<Extracted>) {
    let mut remainder = html.to_string();
    for caps in SCRIPT_SRC_RE.captures_iter(html) {
        let src = caps[2].trim().to_string();
        if src.is_empty() {
            continue;
        }
        let mut options = AssetOptions::new().place(place);
        if let Some(condition) = condition {
            options = options.condition(condition);
        }
        out.push(Extracted {
            kind: AssetKind::Js,
            source: src,
            options: apply_data_options(options, &caps[0]),
        });
        remainder = remainder.replace(&caps[0], "");
    }
    for caps in SCRIPT_INLINE_RE.captures_iter(&remainder) {
        let content = caps[1].to_string();
        let mut options = AssetOptions::new().place(place).inline();
        if let Some(condition) = condition {
            options = options.condition(condition);
        }
        out.push(Extracted {
            kind: AssetKind::Js,
            source: content,
            options: apply_data_options(options, &caps[0]),
        });
    }
}

fn scan_css(html: &str, condition: Option<&str>, out: &mut Vec<Extracted>) {
    for caps in LINK_RE.captures_iter(html) {
        let tag = &caps[0];
        let Some(href) = HREF_RE
            .captures(tag)
            .map(|h| h[2].trim().to_string())
            .filter(|h| !h.is_empty())
        else {
            continue;
        };
        let media = MEDIA_RE
            .captures(tag)
            .map(|m| m[2].trim().to_string())
            .unwrap_or_else(|| "all".to_string());
        let mut options = AssetOptions::new().media(media);
        if let Some(condition) = condition {
            options = options.condition(condition);
        }
        out.push(Extracted {
            kind: AssetKind::Css,
            source: href,
            options: apply_data_options(options, tag),
        });
    }
    for caps in STYLE_RE.captures_iter(html) {
        let mut options = AssetOptions::new().media("all").inline();
        if let Some(condition) = condition {
            options = options.condition(condition);
        }
        out.push(Extracted {
            kind: AssetKind::Css,
            source: caps[1].to_string(),
            options: apply_data_options(options, &caps[0]),
        });
    }
}

/// Fold `data-assetmix-*` attributes of one tag into its options.
fn apply_data_options(mut options: AssetOptions, tag: &str) -> AssetOptions {
    for caps in DATA_OPTION_RE.captures_iter(tag) {
        let key = caps[1].trim().to_lowercase();
        let value = caps[3].trim().to_string();
        match key.as_str() {
            "place" => options.place = Some(value),
            "condition" => options.condition = Some(value),
            "media" => options.media = Some(value),
            "inline" => options.inline = truthy(&value),
            "remote" => options.remote = truthy(&value),
            "render_inline" => options.render_inline = Some(truthy(&value)),
            "compress" => options.compress = Some(truthy(&value)),
            "merge" => options.merge = Some(truthy(&value)),
            "scss" => options.scss = Some(truthy(&value)),
            "remote_hash" => options.remote_hash = Some(value),
            "scss-images_dir" => {
                options.scss_options = Some(ScssSettings { images_dir: value });
            }
            other => {
                crate::debug!("parse"; "ignoring unknown data option `{}`", other);
            }
        }
    }
    options
}

fn truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "on")
}
