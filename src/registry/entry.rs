//! Registered asset entries, registration options and build results.

use crate::config::ScssSettings;

/// Options accepted by the registration calls.
///
/// Unset placement keys fall back to the kind defaults (`body`/`none` for
/// js, `none`/`all` for css); unset `compress`/`merge` inherit the
/// type-level policy at build time.
#[derive(Debug, Clone, Default)]
pub struct AssetOptions {
    /// js grouping: `head` or `body`.
    pub place: Option<String>,
    /// Browser condition (`ie`, `lt ie 9`, ...); `none` means unconditional.
    pub condition: Option<String>,
    /// css media query.
    pub media: Option<String>,
    /// Treat the source argument as literal content.
    pub inline: bool,
    /// Reference an external URL without ever fetching its bytes.
    pub remote: bool,
    /// Emit an embedded fragment instead of a cached-file reference.
    /// Defaults to `inline`; forces `merge = false` when set.
    pub render_inline: Option<bool>,
    /// Override the type-level compression default.
    pub compress: Option<bool>,
    /// Override the type-level merge default.
    pub merge: Option<bool>,
    /// css only: treat content as SCSS. Inferred from a `.scss` suffix
    /// when unset.
    pub scss: Option<bool>,
    /// Per-entry SCSS options override.
    pub scss_options: Option<ScssSettings>,
    /// Cache salt override for fetched remote bodies.
    pub remote_hash: Option<String>,
}

impl AssetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn remote(mut self) -> Self {
        self.remote = true;
        self
    }

    pub fn render_inline(mut self, render_inline: bool) -> Self {
        self.render_inline = Some(render_inline);
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn merge(mut self, merge: bool) -> Self {
        self.merge = Some(merge);
        self
    }

    pub fn scss(mut self, scss: bool) -> Self {
        self.scss = Some(scss);
        self
    }

    pub fn scss_options(mut self, options: ScssSettings) -> Self {
        self.scss_options = Some(options);
        self
    }

    pub fn remote_hash(mut self, salt: impl Into<String>) -> Self {
        self.remote_hash = Some(salt.into());
        self
    }
}

/// A registered asset, before and after a build pass.
#[derive(Debug, Clone)]
pub struct AssetEntry {
    /// Path or URL; empty when the entry is inline.
    pub source: String,
    /// Raw content before build processing. Empty for bare remote
    /// references.
    pub content: String,
    pub inline: bool,
    pub remote: bool,
    pub render_inline: bool,
    pub compress: Option<bool>,
    pub merge: Option<bool>,
    /// css only.
    pub scss: bool,
    pub scss_options: Option<ScssSettings>,
    /// Populated by a build pass; `None` until then.
    pub result: Option<BuiltResult>,
}

/// Resolved output for one entry, or for a bin's synthesized merged asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltResult {
    /// Cache key, or the raw URL for bare remote references.
    pub hash: String,
    /// Processed content.
    pub content: String,
    pub remote: bool,
    /// Render as an embedded fragment.
    pub inline: bool,
    /// Entry was folded into the bin's merged asset and is not rendered
    /// individually.
    pub merge: bool,
}
