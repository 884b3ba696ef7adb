//! Dirty-gated build pass.
//!
//! Resolves every registered entry to transformed content under a
//! content-addressed cache key, then decides per-bin merging. Only
//! intra-bin offset order matters here; bins are visited in whatever
//! order the grouping maps yield. A kind is rebuilt only while its
//! dirty flag is set, and the flag clears once all its bins are done.

pub(crate) mod css;
pub(crate) mod minify;
pub(crate) mod scss;

use crate::cache::ContentCache;
use crate::config::Settings;
use crate::error::Result;
use crate::hash;
use crate::kind::{AssetKind, PerKind};
use crate::registry::{AssetEntry, Bin, BuiltResult, Registry};
use crate::remote::{Credentials, RemoteTransform};

/// Everything a build pass needs besides the registry itself.
pub(crate) struct BuildContext<'a> {
    pub settings: &'a Settings,
    pub cache: &'a ContentCache,
    pub remote: &'a dyn RemoteTransform,
    pub credentials: &'a mut Credentials,
}

/// Run a build pass over every dirty kind, or over `only` when given.
/// Kinds with an empty registry are skipped without touching their flag.
pub(crate) fn run(
    ctx: &mut BuildContext<'_>,
    registry: &mut Registry,
    dirty: &mut PerKind<bool>,
    only: Option<AssetKind>,
) -> Result<()> {
    for kind in AssetKind::ALL {
        if only.is_some_and(|requested| requested != kind) {
            continue;
        }
        if !*dirty.get(kind) || registry.get(kind).is_empty() {
            continue;
        }
        crate::debug!("build"; "building {} assets", kind);
        for secondaries in registry.get_mut(kind).groups.values_mut() {
            for bin in secondaries.values_mut() {
                build_bin(ctx, kind, bin)?;
            }
        }
        *dirty.get_mut(kind) = false;
    }
    Ok(())
}

/// Resolve every entry of one bin and synthesize its merged asset.
///
/// Merging activates only when at least two non-remote entries with an
/// effective `merge = true` contributed content; with fewer, any stale
/// merged asset is discarded and the lone contributor's `result.merge`
/// is forced false.
fn build_bin(ctx: &mut BuildContext<'_>, kind: AssetKind, bin: &mut Bin) -> Result<()> {
    let merge_default = ctx.settings.merge(kind);
    let compress_default = ctx.settings.compress(kind).enable;

    let mut merged_keys = String::new();
    let mut merged_parts: Vec<String> = Vec::new();

    for (&offset, entry) in bin.entries.iter_mut() {
        if entry.remote {
            // Bare reference: never fetched, never merged; the URL
            // itself stands in for the cache key.
            entry.result = Some(BuiltResult {
                hash: entry.source.clone(),
                content: String::new(),
                remote: true,
                inline: false,
                merge: false,
            });
            continue;
        }

        let compress = entry.compress.unwrap_or(compress_default);
        let merge = !entry.render_inline && entry.merge.unwrap_or(merge_default);

        let (key, content) = resolve(ctx, kind, entry, compress)?;
        if merge {
            merged_keys.push_str(&format!("{key}{offset}"));
            merged_parts.push(content.clone());
        }
        entry.result = Some(BuiltResult {
            hash: key,
            content,
            remote: false,
            inline: entry.render_inline,
            merge,
        });
    }

    if merged_parts.len() > 1 {
        let combined = merged_parts.join(kind.merge_glue());
        let key = hash::fingerprint(&merged_keys);
        let name = format!("{key}.{kind}");
        if !ctx.cache.exists(kind.as_str(), &name) {
            ctx.cache.save(kind.as_str(), &name, combined.as_bytes())?;
        }
        bin.merged = Some(BuiltResult {
            hash: key,
            content: combined,
            remote: false,
            inline: false,
            merge: false,
        });
    } else {
        bin.merged = None;
        for entry in bin.entries.values_mut() {
            if let Some(result) = entry.result.as_mut() {
                result.merge = false;
            }
        }
    }
    Ok(())
}

/// Resolve one entry: cache hit on its content key, or preprocess,
/// compress and persist.
fn resolve(
    ctx: &mut BuildContext<'_>,
    kind: AssetKind,
    entry: &AssetEntry,
    compress: bool,
) -> Result<(String, String)> {
    let sig = scss_sig(entry);
    let key = hash::content_key(&[
        entry.content.as_bytes(),
        &[compress as u8],
        sig.as_bytes(),
    ]);
    let namespace = kind.as_str();
    let name = format!("{key}.{kind}");
    if ctx.cache.exists(namespace, &name) {
        crate::debug!("build"; "cache hit {}/{}", namespace, name);
        return Ok((key, ctx.cache.load_utf8(namespace, &name)?));
    }

    let mut content = entry.content.clone();
    if kind == AssetKind::Css {
        content = preprocess_css(ctx, entry, content)?;
    }
    if compress {
        content = compress_content(ctx, kind, content)?;
    }
    ctx.cache.save(namespace, &name, content.as_bytes())?;
    Ok((key, content))
}

/// CSS-only preprocessing: reference rewriting for file-backed entries
/// and SCSS compilation. Output is cached on its own key so repeated
/// builds with changed compression flags skip the remote compile.
fn preprocess_css(
    ctx: &mut BuildContext<'_>,
    entry: &AssetEntry,
    content: String,
) -> Result<String> {
    let sig = scss_sig(entry);
    let name = format!(
        "css_pre_{}.css",
        hash::content_key(&[
            content.as_bytes(),
            entry.source.as_bytes(),
            sig.as_bytes(),
        ])
    );
    if ctx.cache.exists("css", &name) {
        return ctx.cache.load_utf8("css", &name);
    }

    let mut out = content;
    // Relative references only make sense for file-backed entries; bodies
    // fetched from a URL keep theirs untouched.
    if !entry.inline
        && !entry.source.is_empty()
        && !crate::remote::is_remote_url(&entry.source)
    {
        out = css::rewrite_relative(&out, &entry.source);
    }
    if entry.scss {
        out = scss::preprocess(ctx, &out, &entry.source, entry.scss_options.as_ref())?;
    }
    ctx.cache.save("css", &name, out.as_bytes())?;
    Ok(out)
}

/// Compress content: local attempt first when the policy allows, remote
/// transform otherwise or when the local attempt reports no success.
fn compress_content(
    ctx: &mut BuildContext<'_>,
    kind: AssetKind,
    content: String,
) -> Result<String> {
    if ctx.settings.compress(kind).local {
        if let Some(minified) = minify::attempt(kind, &content) {
            return Ok(minified);
        }
        crate::debug!("build"; "local {} compressor reported no success", kind);
    }
    let auth = ctx
        .credentials
        .ensure(ctx.remote, ctx.settings.site_host())?;
    ctx.remote
        .compress(&auth, kind, &content, ctx.settings.compressors(kind))
}

/// SCSS parameters as a cache-key component: the flag plus any
/// per-entry option override.
fn scss_sig(entry: &AssetEntry) -> String {
    if !entry.scss {
        return "0".into();
    }
    match &entry.scss_options {
        None => "1".into(),
        Some(options) => format!("1:{}", options.images_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScssSettings;
    use crate::remote::{Auth, ScssBundle, ScssOutput, TokenGrant};
    use std::cell::Cell;
    use tempfile::TempDir;

    struct Mock {
        compress_calls: Cell<usize>,
    }

    impl Mock {
        fn new() -> Self {
            Self {
                compress_calls: Cell::new(0),
            }
        }
    }

    impl RemoteTransform for Mock {
        fn token(&self, _host: &str) -> Result<TokenGrant> {
            Ok(TokenGrant {
                token: Some("t".into()),
                token_secret: Some("s".into()),
            })
        }

        fn compress(
            &self,
            _auth: &Auth,
            _kind: AssetKind,
            content: &str,
            _compressors: &str,
        ) -> Result<String> {
            self.compress_calls.set(self.compress_calls.get() + 1);
            Ok(content.replace(' ', ""))
        }

        fn scss_compile(
            &self,
            _auth: &Auth,
            bundle: &ScssBundle,
            _options: &ScssSettings,
        ) -> Result<ScssOutput> {
            Ok(ScssOutput {
                content: bundle.style.replace("$red", "#f00"),
                images: Vec::new(),
            })
        }
    }

    fn inline_entry(content: &str) -> AssetEntry {
        AssetEntry {
            source: String::new(),
            content: content.to_string(),
            inline: true,
            remote: false,
            render_inline: false,
            compress: Some(false),
            merge: None,
            scss: false,
            scss_options: None,
            result: None,
        }
    }

    fn build(
        settings: &Settings,
        cache: &ContentCache,
        remote: &dyn RemoteTransform,
        registry: &mut Registry,
    ) -> Result<()> {
        let mut credentials = Credentials::default();
        let mut ctx = BuildContext {
            settings,
            cache,
            remote,
            credentials: &mut credentials,
        };
        let mut dirty = PerKind::splat(true);
        run(&mut ctx, registry, &mut dirty, None)
    }

    fn fixture(dir: &TempDir) -> (Settings, ContentCache) {
        let settings = Settings::default();
        let cache = ContentCache::new(dir.path().join("cache"), true, 0o777);
        (settings, cache)
    }

    #[test]
    fn test_two_entries_merge_with_type_glue() {
        let dir = TempDir::new().unwrap();
        let (settings, cache) = fixture(&dir);
        let mut registry = Registry::default();
        for content in ["a{}", "b{}"] {
            registry
                .insert(
                    AssetKind::Css,
                    "none".into(),
                    "all".into(),
                    None,
                    -1000,
                    inline_entry(content),
                )
                .unwrap();
        }

        build(&settings, &cache, &Mock::new(), &mut registry).unwrap();

        let bin = registry.get(AssetKind::Css).bin("none", "all").unwrap();
        let merged = bin.merged().expect("merged asset");
        assert_eq!(merged.content, "a{}\nb{}");
        assert!(!merged.merge);
        assert!(bin.entries().values().all(|e| e.result.as_ref().unwrap().merge));
        assert!(cache.exists("css", &format!("{}.css", merged.hash)));
    }

    #[test]
    fn test_js_merge_uses_semicolon_glue() {
        let dir = TempDir::new().unwrap();
        let (settings, cache) = fixture(&dir);
        let mut registry = Registry::default();
        for content in ["var a=1", "var b=2"] {
            registry
                .insert(
                    AssetKind::Js,
                    "body".into(),
                    "none".into(),
                    None,
                    -1000,
                    inline_entry(content),
                )
                .unwrap();
        }

        build(&settings, &cache, &Mock::new(), &mut registry).unwrap();

        let bin = registry.get(AssetKind::Js).bin("body", "none").unwrap();
        assert_eq!(bin.merged().unwrap().content, "var a=1;\nvar b=2");
    }

    #[test]
    fn test_single_eligible_entry_never_merges() {
        let dir = TempDir::new().unwrap();
        let (settings, cache) = fixture(&dir);
        let mut registry = Registry::default();
        registry
            .insert(
                AssetKind::Css,
                "none".into(),
                "all".into(),
                None,
                -1000,
                inline_entry("a{}"),
            )
            .unwrap();

        build(&settings, &cache, &Mock::new(), &mut registry).unwrap();

        let bin = registry.get(AssetKind::Css).bin("none", "all").unwrap();
        assert!(bin.merged().is_none());
        let result = bin.entries()[&0].result.as_ref().unwrap();
        assert!(!result.merge);
        assert_eq!(result.content, "a{}");
    }

    #[test]
    fn test_remote_reference_excluded_from_merge() {
        let dir = TempDir::new().unwrap();
        let (settings, cache) = fixture(&dir);
        let mut registry = Registry::default();
        let mut remote_ref = inline_entry("");
        remote_ref.inline = false;
        remote_ref.remote = true;
        remote_ref.source = "//cdn.example.com/lib.js".into();
        registry
            .insert(
                AssetKind::Js,
                "body".into(),
                "none".into(),
                None,
                -1000,
                remote_ref,
            )
            .unwrap();
        registry
            .insert(
                AssetKind::Js,
                "body".into(),
                "none".into(),
                None,
                -1000,
                inline_entry("var a=1"),
            )
            .unwrap();

        build(&settings, &cache, &Mock::new(), &mut registry).unwrap();

        let bin = registry.get(AssetKind::Js).bin("body", "none").unwrap();
        assert!(bin.merged().is_none());
        let reference = bin.entries()[&0].result.as_ref().unwrap();
        assert!(reference.remote);
        assert_eq!(reference.hash, "//cdn.example.com/lib.js");
        assert!(reference.content.is_empty());
    }

    #[test]
    fn test_render_inline_entry_opts_out_of_merge() {
        let dir = TempDir::new().unwrap();
        let (settings, cache) = fixture(&dir);
        let mut registry = Registry::default();
        let mut embedded = inline_entry("em{}");
        embedded.render_inline = true;
        registry
            .insert(
                AssetKind::Css,
                "none".into(),
                "all".into(),
                None,
                -1000,
                embedded,
            )
            .unwrap();
        for content in ["a{}", "b{}"] {
            registry
                .insert(
                    AssetKind::Css,
                    "none".into(),
                    "all".into(),
                    None,
                    -1000,
                    inline_entry(content),
                )
                .unwrap();
        }

        build(&settings, &cache, &Mock::new(), &mut registry).unwrap();

        let bin = registry.get(AssetKind::Css).bin("none", "all").unwrap();
        assert_eq!(bin.merged().unwrap().content, "a{}\nb{}");
        let embedded = bin.entries()[&0].result.as_ref().unwrap();
        assert!(embedded.inline);
        assert!(!embedded.merge);
    }

    #[test]
    fn test_second_build_is_a_cache_hit() {
        let dir = TempDir::new().unwrap();
        let (mut settings, cache) = fixture(&dir);
        // Disable the local attempt so every compression counts a remote
        // call.
        settings.set_compress_all(crate::config::CompressPolicy {
            enable: true,
            local: false,
        });
        let mock = Mock::new();

        let mut registry = Registry::default();
        let mut entry = inline_entry("var a = 1");
        entry.compress = None;
        registry
            .insert(
                AssetKind::Js,
                "body".into(),
                "none".into(),
                None,
                -1000,
                entry.clone(),
            )
            .unwrap();
        build(&settings, &cache, &mock, &mut registry).unwrap();
        assert_eq!(mock.compress_calls.get(), 1);
        let first = registry.get(AssetKind::Js).bin("body", "none").unwrap().entries()[&0]
            .result
            .clone()
            .unwrap();
        assert_eq!(first.content, "vara=1");

        // Same content registered into a fresh registry: resolved from
        // cache, remote untouched.
        let mut registry = Registry::default();
        registry
            .insert(
                AssetKind::Js,
                "body".into(),
                "none".into(),
                None,
                -1000,
                entry,
            )
            .unwrap();
        build(&settings, &cache, &mock, &mut registry).unwrap();
        assert_eq!(mock.compress_calls.get(), 1);
        let second = registry.get(AssetKind::Js).bin("body", "none").unwrap().entries()[&0]
            .result
            .clone()
            .unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_clean_kind_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let (settings, cache) = fixture(&dir);
        let mut registry = Registry::default();
        registry
            .insert(
                AssetKind::Css,
                "none".into(),
                "all".into(),
                None,
                -1000,
                inline_entry("a{}"),
            )
            .unwrap();

        let mut credentials = Credentials::default();
        let mock = Mock::new();
        let mut ctx = BuildContext {
            settings: &settings,
            cache: &cache,
            remote: &mock,
            credentials: &mut credentials,
        };
        let mut dirty = PerKind::new(true, false);
        run(&mut ctx, &mut registry, &mut dirty, None).unwrap();

        let bin = registry.get(AssetKind::Css).bin("none", "all").unwrap();
        assert!(bin.entries()[&0].result.is_none());
    }

    #[test]
    fn test_scss_entry_compiles_through_remote() {
        let dir = TempDir::new().unwrap();
        let settings = {
            let mut s = Settings::default();
            s.set_path_root(dir.path()).unwrap();
            s
        };
        let cache = ContentCache::new(dir.path().join("cache"), true, 0o777);
        let mut registry = Registry::default();
        let mut entry = inline_entry("b{color:$red}");
        entry.scss = true;
        registry
            .insert(
                AssetKind::Css,
                "none".into(),
                "all".into(),
                None,
                -1000,
                entry,
            )
            .unwrap();

        build(&settings, &cache, &Mock::new(), &mut registry).unwrap();

        let bin = registry.get(AssetKind::Css).bin("none", "all").unwrap();
        let result = bin.entries()[&0].result.as_ref().unwrap();
        assert_eq!(result.content, "b{color:#f00}");
    }
}
