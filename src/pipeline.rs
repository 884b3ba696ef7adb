//! Pipeline facade.
//!
//! One instance per logical build: registration mutates the registry and
//! marks the owning kind dirty; render and result trigger a build pass
//! for dirty kinds; queries read the built state back out. Instances are
//! single-threaded and request-scoped; only the content cache is shared
//! across instances, and only through idempotent content-addressed
//! writes.

use crate::build::{self, BuildContext};
use crate::cache::ContentCache;
use crate::config::{ScssSettings, Settings};
use crate::error::{Error, Result};
use crate::hash;
use crate::kind::{AssetKind, PerKind};
use crate::parse;
use crate::query::{self, ResultSet};
use crate::registry::{normalize_key, AssetEntry, AssetOptions, Registry};
use crate::remote::{self, Credentials, HttpTransform, RemoteTransform};
use crate::render;
use std::collections::BTreeMap;
use std::fs;

pub struct Pipeline {
    settings: Settings,
    registry: Registry,
    dirty: PerKind<bool>,
    credentials: Credentials,
    remote: Box<dyn RemoteTransform>,
}

impl Pipeline {
    /// Pipeline against the hosted transform service named in the
    /// settings.
    pub fn new(settings: Settings) -> Self {
        let transform = HttpTransform::new(settings.service_host());
        Self::with_transform(settings, Box::new(transform))
    }

    /// Pipeline with a caller-supplied transform implementation.
    pub fn with_transform(settings: Settings, remote: Box<dyn RemoteTransform>) -> Self {
        Self {
            settings,
            registry: Registry::default(),
            dirty: PerKind::splat(false),
            credentials: Credentials::default(),
            remote,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register an asset after every existing entry of its bin.
    pub fn append(
        &mut self,
        kind: AssetKind,
        source: &str,
        options: AssetOptions,
    ) -> Result<i64> {
        self.register(kind, None, source, options)
    }

    /// [`Self::append`] with the source treated as literal content.
    pub fn append_inline(
        &mut self,
        kind: AssetKind,
        content: &str,
        mut options: AssetOptions,
    ) -> Result<i64> {
        options.inline = true;
        self.register(kind, None, content, options)
    }

    /// Register an asset before every existing entry of its bin.
    pub fn prepend(
        &mut self,
        kind: AssetKind,
        source: &str,
        options: AssetOptions,
    ) -> Result<i64> {
        self.register(kind, Some(-1), source, options)
    }

    /// [`Self::prepend`] with the source treated as literal content.
    pub fn prepend_inline(
        &mut self,
        kind: AssetKind,
        content: &str,
        mut options: AssetOptions,
    ) -> Result<i64> {
        options.inline = true;
        self.register(kind, Some(-1), content, options)
    }

    /// Register an asset at an explicit offset, replacing any entry
    /// already there.
    pub fn set(
        &mut self,
        kind: AssetKind,
        offset: i64,
        source: &str,
        options: AssetOptions,
    ) -> Result<i64> {
        self.register(kind, Some(offset), source, options)
    }

    /// [`Self::set`] with the source treated as literal content.
    pub fn set_inline(
        &mut self,
        kind: AssetKind,
        offset: i64,
        content: &str,
        mut options: AssetOptions,
    ) -> Result<i64> {
        options.inline = true;
        self.register(kind, Some(offset), content, options)
    }

    /// Remove the entry at `offset` within the bin the options resolve to.
    pub fn remove(
        &mut self,
        kind: AssetKind,
        offset: i64,
        options: &AssetOptions,
    ) -> Result<AssetEntry> {
        let (primary, secondary) = placement(kind, options);
        let removed = self.registry.remove(
            kind,
            &primary,
            &secondary,
            offset,
            self.settings.all_offset(),
        )?;
        *self.dirty.get_mut(kind) = true;
        Ok(removed)
    }

    /// Discard every registered entry of one kind.
    pub fn clear(&mut self, kind: AssetKind) {
        self.registry.clear(kind);
        *self.dirty.get_mut(kind) = true;
    }

    fn register(
        &mut self,
        kind: AssetKind,
        offset: Option<i64>,
        source: &str,
        options: AssetOptions,
    ) -> Result<i64> {
        let (primary, secondary) = placement(kind, &options);

        // Literal content wins over the remote flag, and a bare remote
        // reference needs an actual URL; anything else loads eagerly.
        let inline = options.inline;
        let remote = !inline && options.remote && remote::is_remote_url(source);

        let mut entry_source = String::new();
        let content = if inline {
            source.trim().to_string()
        } else if remote {
            entry_source = source.to_string();
            String::new()
        } else if remote::is_remote_url(source) {
            entry_source = source.to_string();
            self.load_remote(source, options.remote_hash.as_deref())?
        } else {
            entry_source = source.to_string();
            // Root-relative sources still resolve under the path root.
            let path = self
                .settings
                .path_root()
                .join(source.trim_start_matches('/'));
            if !path.exists() {
                return Err(Error::FileNotFound(path.display().to_string()));
            }
            let body = fs::read_to_string(&path).map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                source: e,
            })?;
            body.trim().to_string()
        };

        let scss = kind == AssetKind::Css
            && options
                .scss
                .unwrap_or_else(|| entry_source.to_lowercase().ends_with(".scss"));

        let entry = AssetEntry {
            source: entry_source,
            content,
            inline,
            remote,
            render_inline: options.render_inline.unwrap_or(inline),
            compress: options.compress,
            merge: options.merge,
            scss,
            scss_options: options.scss_options,
            result: None,
        };
        let at = self.registry.insert(
            kind,
            primary,
            secondary,
            offset,
            self.settings.all_offset(),
            entry,
        )?;
        *self.dirty.get_mut(kind) = true;
        crate::debug!("registry"; "registered {} asset at offset {}", kind, at);
        Ok(at)
    }

    /// Fetch a remote body, caching it keyed by URL and salt. An empty
    /// salt disables caching.
    fn load_remote(&self, url: &str, salt_override: Option<&str>) -> Result<String> {
        let salt = salt_override.unwrap_or(self.settings.remote_hash());
        if salt.is_empty() {
            return remote::fetch_url(url);
        }
        let cache = self.cache();
        let name = format!(
            "{}.remote",
            hash::content_key(&[url.as_bytes(), salt.as_bytes()])
        );
        if cache.exists("remote", &name) {
            return cache.load_utf8("remote", &name);
        }
        crate::log!("remote"; "fetching {}", url);
        let body = remote::fetch_url(url)?;
        cache.save("remote", &name, body.as_bytes())?;
        Ok(body)
    }

    // ------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------

    /// Run a build pass for every dirty kind, or only for `kind` when
    /// given. Clean or empty kinds are untouched.
    pub fn run(&mut self, kind: Option<AssetKind>) -> Result<()> {
        self.sync_credentials();
        let cache = self.cache();
        let mut ctx = BuildContext {
            settings: &self.settings,
            cache: &cache,
            remote: self.remote.as_ref(),
            credentials: &mut self.credentials,
        };
        build::run(&mut ctx, &mut self.registry, &mut self.dirty, kind)
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Render one kind as markup, optionally restricted to a primary
    /// and/or secondary key. Triggers a build pass when dirty.
    pub fn render(
        &mut self,
        kind: AssetKind,
        primary: Option<&str>,
        secondary: Option<&str>,
    ) -> Result<String> {
        let (primary, secondary) = validate_filter(kind, primary, secondary)?;
        self.run(Some(kind))?;
        Ok(render::render(
            kind,
            self.registry.get(kind),
            self.settings.all_offset(),
            self.settings.cache_dir(),
            primary.as_deref(),
            secondary.as_deref(),
        ))
    }

    /// Built results as structured data, same grouping and filters as
    /// [`Self::render`]. Triggers a build pass when dirty.
    pub fn result(
        &mut self,
        kind: AssetKind,
        primary: Option<&str>,
        secondary: Option<&str>,
    ) -> Result<ResultSet> {
        let (primary, secondary) = validate_filter(kind, primary, secondary)?;
        self.run(Some(kind))?;
        Ok(query::collect(
            self.registry.get(kind),
            self.settings.all_offset(),
            primary.as_deref(),
            secondary.as_deref(),
        ))
    }

    /// Raw offset → entry map of one fully-qualified bin. Does not
    /// trigger a build; unset keys fall back to the kind defaults.
    pub fn get(
        &self,
        kind: AssetKind,
        primary: Option<&str>,
        secondary: Option<&str>,
    ) -> Result<&BTreeMap<i64, AssetEntry>> {
        let primary = normalize_key(primary, kind.default_primary());
        let secondary = normalize_key(secondary, kind.default_secondary());
        query::bin(self.registry.get(kind), &primary, &secondary)
    }

    // ------------------------------------------------------------------
    // Markup intake
    // ------------------------------------------------------------------

    /// Scan markup and register every extracted tag, with `base` options
    /// overriding whatever the scan inferred. Returns the number of tags
    /// registered.
    pub fn parse(&mut self, html: &str, base: &AssetOptions) -> Result<usize> {
        let extracted = parse::scan(html);
        let count = extracted.len();
        for item in extracted {
            let options = parse::overlay(item.options, base);
            self.register(item.kind, None, &item.source, options)?;
        }
        crate::debug!("parse"; "registered {} scanned tags", count);
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Remote passthrough and cache maintenance
    // ------------------------------------------------------------------

    /// Bootstrap credentials from the remote service, keeping any that
    /// are already set.
    pub fn token(&mut self) -> Result<()> {
        self.sync_credentials();
        let grant = self.remote.token(self.settings.site_host())?;
        if self.credentials.token.is_none() {
            self.credentials.token = grant.token;
        }
        if self.credentials.token_secret.is_none() {
            self.credentials.token_secret = grant.token_secret;
        }
        Ok(())
    }

    /// One-off compression of arbitrary content through the configured
    /// compressor chain, bypassing the registry.
    pub fn compress(&mut self, kind: AssetKind, content: &str) -> Result<String> {
        self.sync_credentials();
        let auth = self
            .credentials
            .ensure(self.remote.as_ref(), self.settings.site_host())?;
        self.remote
            .compress(&auth, kind, content, self.settings.compressors(kind))
    }

    /// One-off SCSS compilation, bypassing the registry. `source` names
    /// the stylesheet path for import resolution and image namespacing.
    pub fn scss_compile(
        &mut self,
        content: &str,
        source: &str,
        options: Option<&ScssSettings>,
    ) -> Result<String> {
        self.sync_credentials();
        let cache = self.cache();
        let mut ctx = BuildContext {
            settings: &self.settings,
            cache: &cache,
            remote: self.remote.as_ref(),
            credentials: &mut self.credentials,
        };
        build::scss::preprocess(&mut ctx, content, source, options)
    }

    /// Delete every cached file under a namespace.
    pub fn purge_cache(&self, namespace: &str) {
        self.cache().purge(namespace);
    }

    fn cache(&self) -> ContentCache {
        ContentCache::new(
            self.settings.path_root().join(self.settings.cache_dir()),
            self.settings.cache_dir_create(),
            self.settings.cache_dir_mode(),
        )
    }

    fn sync_credentials(&mut self) {
        if self.credentials.token.is_none() {
            self.credentials.token = self.settings.token().map(str::to_string);
        }
        if self.credentials.token_secret.is_none() {
            self.credentials.token_secret = self.settings.token_secret().map(str::to_string);
        }
    }
}

/// Resolve the two placement keys for a kind from registration options.
fn placement(kind: AssetKind, options: &AssetOptions) -> (String, String) {
    match kind {
        AssetKind::Js => (
            normalize_key(options.place.as_deref(), kind.default_primary()),
            normalize_key(options.condition.as_deref(), kind.default_secondary()),
        ),
        AssetKind::Css => (
            normalize_key(options.condition.as_deref(), kind.default_primary()),
            normalize_key(options.media.as_deref(), kind.default_secondary()),
        ),
    }
}

/// Normalize filter keys and reject a secondary filter without its
/// primary.
fn validate_filter(
    kind: AssetKind,
    primary: Option<&str>,
    secondary: Option<&str>,
) -> Result<(Option<String>, Option<String>)> {
    let primary = primary
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty());
    let secondary = secondary
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    if secondary.is_some() && primary.is_none() {
        return Err(match kind {
            AssetKind::Js => Error::PlaceNotSet,
            AssetKind::Css => Error::ConditionNotSet,
        });
    }
    Ok((primary, secondary))
}
