//! SCSS expansion and remote compilation.
//!
//! `@import "name";` statements are inlined locally (partials first,
//! missing imports dropped, cycles broken by an exclusion set); the
//! expanded source plus every image under the configured images
//! directory crosses the remote transform as one bundle. Generated
//! images come back as named blobs and are persisted under the
//! stylesheet's own cache namespace.

use crate::config::ScssSettings;
use crate::error::{Error, Result};
use crate::remote::{NamedBlob, ScssBundle};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use super::BuildContext;
use super::css::dirname;

/// Placeholder the remote transform embeds in generated CSS for image
/// paths; replaced with the real cache namespace after compilation.
const CACHE_DIR_PLACEHOLDER: &str = "__cache_dir__";

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)@import.*?"(.*?)";"#).unwrap());

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "gif", "jpg", "jpeg", "svg"];

/// Expand SCSS content and compile it remotely.
pub(crate) fn preprocess(
    ctx: &mut BuildContext<'_>,
    content: &str,
    source: &str,
    overrides: Option<&ScssSettings>,
) -> Result<String> {
    let options = overrides
        .cloned()
        .unwrap_or_else(|| ctx.settings.scss().clone());
    let root = ctx.settings.path_root().to_path_buf();

    let style = expand_imports(&root, content, source, &mut Vec::new())?;

    let file = Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());

    let images_root = images_root(source, &options.images_dir);
    let mut images = Vec::new();
    for name in collect_image_names(&root, &images_root) {
        let path = root.join(&images_root).join(&name);
        let bytes = fs::read(&path).map_err(|source| Error::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        images.push(NamedBlob { name, bytes });
    }

    // Generated images from a previous compile are stale now.
    let namespace = format!("images/{file}");
    ctx.cache.purge(&namespace);

    let auth = ctx
        .credentials
        .ensure(ctx.remote, ctx.settings.site_host())?;
    let bundle = ScssBundle {
        file,
        style,
        images,
    };
    let request = ScssSettings {
        images_dir: CACHE_DIR_PLACEHOLDER.into(),
    };
    let output = ctx.remote.scss_compile(&auth, &bundle, &request)?;

    let mut compiled = output.content;
    if !output.images.is_empty() {
        for blob in &output.images {
            ctx.cache.save(&namespace, &blob.name, &blob.bytes)?;
        }
        let served = format!("/{}/{namespace}", ctx.settings.cache_dir());
        compiled = compiled.replace(CACHE_DIR_PLACEHOLDER, &served);
    }
    Ok(compiled)
}

/// Inline `@import` statements recursively.
///
/// Import resolution relative to `source`'s directory: `_name.scss`
/// partial first, then `name.scss`; unresolvable imports are dropped.
/// `seen` holds already-inlined paths and breaks cycles.
fn expand_imports(
    root: &Path,
    content: &str,
    source: &str,
    seen: &mut Vec<String>,
) -> Result<String> {
    let imports: Vec<(String, String)> = IMPORT_RE
        .captures_iter(content)
        .map(|caps| (caps[0].to_string(), caps[1].to_string()))
        .collect();
    if imports.is_empty() {
        return Ok(content.to_string());
    }

    let dir = dirname(source);
    let dir_prefix = if dir.is_empty() {
        "/".to_string()
    } else {
        format!("/{dir}/")
    };

    let mut out = content.to_string();
    for (statement, name) in imports {
        let mut file_name = name.clone();
        if !file_name.to_lowercase().ends_with(".scss") {
            file_name.push_str(".scss");
        }

        let partial = format!("_{file_name}");
        let resolved = if root.join(relative(&dir_prefix, &partial)).exists() {
            partial
        } else if root.join(relative(&dir_prefix, &file_name)).exists() {
            file_name
        } else {
            out = out.replace(&statement, "");
            continue;
        };

        let rel_path = format!("{dir_prefix}{resolved}");
        if seen.contains(&rel_path) {
            out = out.replace(&statement, "");
            continue;
        }
        seen.push(rel_path.clone());

        let path = root.join(rel_path.trim_start_matches('/'));
        let inner = fs::read_to_string(&path)
            .map_err(|source| Error::FileRead {
                path: path.display().to_string(),
                source,
            })?
            .trim()
            .to_string();
        let inner = if inner.is_empty() {
            inner
        } else {
            format!("\n{inner}\n")
        };
        let expanded = expand_imports(root, &inner, &rel_path, seen)?;
        out = out.replace(&statement, &expanded);
    }
    Ok(out)
}

fn relative(dir_prefix: &str, name: &str) -> String {
    format!("{dir_prefix}{name}")
        .trim_start_matches('/')
        .to_string()
}

/// Images directory of a stylesheet, relative to the path root.
fn images_root(source: &str, images_dir: &str) -> String {
    let dir = Path::new(source)
        .parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .unwrap_or_default();
    let images_dir = images_dir.trim_end_matches(['.', '/']);
    format!("{dir}/{images_dir}")
        .trim_matches('/')
        .to_string()
}

/// Collect image names under `images_root`, recursing with an explicit
/// worklist. Names are relative to `images_root` and sorted; unreadable
/// directories are skipped.
fn collect_image_names(root: &Path, images_root: &str) -> Vec<String> {
    let base = root.join(images_root);
    let mut names = Vec::new();
    let mut pending = vec![String::new()];
    while let Some(rel) = pending.pop() {
        let dir = if rel.is_empty() {
            base.clone()
        } else {
            base.join(&rel)
        };
        let Ok(listing) = fs::read_dir(&dir) else {
            continue;
        };
        let mut items: Vec<_> = listing.flatten().collect();
        items.sort_by_key(|item| item.file_name());
        for item in items {
            let name = item.file_name().to_string_lossy().into_owned();
            let rel_name = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };
            if item.path().is_dir() {
                pending.push(rel_name);
            } else if is_image(&name) {
                names.push(rel_name);
            }
        }
    }
    names.sort();
    names
}

fn is_image(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
