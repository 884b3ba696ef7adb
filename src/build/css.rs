//! CSS preprocessing: rewriting relative asset references.
//!
//! Cached-file output is served from the cache directory, so `url()` and
//! `src=` references that were relative to the stylesheet's own directory
//! must be rewritten to root-relative paths. Absolute and remote
//! references are left untouched.

use crate::remote::is_remote_url;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)url\((['"]?)([^)]*?)(['"]?)\)"#).unwrap());

static SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)src=(['"]?)([^)]*?)(['"]|,|\))"#).unwrap());

/// Directory of a source path, without leading `./` noise. Empty for
/// sources at the path root.
pub(crate) fn dirname(source: &str) -> String {
    Path::new(source)
        .parent()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default()
        .trim_start_matches(['.', '/'])
        .to_string()
}

/// Rewrite relative `url()` and `src=` references against the source's
/// directory.
pub fn rewrite_relative(content: &str, source: &str) -> String {
    let dir = dirname(source);
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("/{dir}")
    };

    let rewritten = URL_RE.replace_all(content, |caps: &Captures| {
        let target = &caps[2];
        if target.starts_with('/') || is_remote_url(target) {
            caps[0].to_string()
        } else {
            format!("url({}{}/{}{})", &caps[1], prefix, target, &caps[3])
        }
    });

    SRC_RE
        .replace_all(&rewritten, |caps: &Captures| {
            let target = &caps[2];
            if target.starts_with('/') || is_remote_url(target) {
                caps[0].to_string()
            } else {
                format!("src={}{}/{}{}", &caps[1], prefix, target, &caps[3])
            }
        })
        .into_owned()
}
