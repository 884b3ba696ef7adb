//! Pipeline settings.
//!
//! All recognized options live on [`Settings`] as explicit fields with
//! validated setters; loading from TOML rejects unknown keys. Defaults
//! mirror a fresh pipeline: merge on, compression on with a local attempt
//! first, cache under `<path_root>/assetmix`.

use crate::error::{Error, Result};
use crate::kind::{AssetKind, PerKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Reserved offset for the synthesized merged asset of a bin.
pub const DEFAULT_ALL_OFFSET: i64 = -1000;

/// Compression policy for one asset kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressPolicy {
    /// Compress entries that carry no explicit flag.
    pub enable: bool,
    /// Try the local minifier before the remote transform.
    pub local: bool,
}

impl Default for CompressPolicy {
    fn default() -> Self {
        Self {
            enable: true,
            local: true,
        }
    }
}

/// SCSS compile options forwarded to the remote transform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScssSettings {
    /// Image directory, relative to the stylesheet being compiled.
    pub images_dir: String,
}

impl Default for ScssSettings {
    fn default() -> Self {
        Self {
            images_dir: "../images".into(),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    path_root: PathBuf,
    cache_dir: String,
    cache_dir_create: bool,
    cache_dir_mode: u32,
    remote_hash: String,
    all_offset: i64,
    service_host: String,
    site_host: String,
    token: Option<String>,
    token_secret: Option<String>,
    merge: PerKind<bool>,
    compress: PerKind<CompressPolicy>,
    compressors: PerKind<String>,
    scss: ScssSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path_root: PathBuf::from("."),
            cache_dir: "assetmix".into(),
            cache_dir_create: true,
            cache_dir_mode: 0o777,
            remote_hash: "default".into(),
            all_offset: DEFAULT_ALL_OFFSET,
            service_host: "api.assetmix.io".into(),
            site_host: String::new(),
            token: None,
            token_secret: None,
            merge: PerKind::splat(true),
            compress: PerKind::default(),
            compressors: PerKind::splat("default".into()),
            scss: ScssSettings::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a TOML document. Unknown keys are rejected.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(input).map_err(|e| Error::InvalidSettings(e.message().to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants that setters enforce, for deserialized settings.
    pub fn validate(&self) -> Result<()> {
        if self.path_root.as_os_str().is_empty() {
            return Err(Error::PathRootNotSet);
        }
        if !self.path_root.exists() {
            return Err(Error::PathRootMissing(self.path_root.clone()));
        }
        if self.cache_dir.is_empty() {
            return Err(Error::CacheDirNotSet);
        }
        for kind in AssetKind::ALL {
            if self.compressors.get(kind).is_empty() {
                return Err(Error::NoCompressors);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn path_root(&self) -> &Path {
        &self.path_root
    }

    pub fn cache_dir(&self) -> &str {
        &self.cache_dir
    }

    pub fn cache_dir_create(&self) -> bool {
        self.cache_dir_create
    }

    pub fn cache_dir_mode(&self) -> u32 {
        self.cache_dir_mode
    }

    pub fn remote_hash(&self) -> &str {
        &self.remote_hash
    }

    pub fn all_offset(&self) -> i64 {
        self.all_offset
    }

    pub fn service_host(&self) -> &str {
        &self.service_host
    }

    pub fn site_host(&self) -> &str {
        &self.site_host
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn token_secret(&self) -> Option<&str> {
        self.token_secret.as_deref()
    }

    pub fn merge(&self, kind: AssetKind) -> bool {
        *self.merge.get(kind)
    }

    pub fn compress(&self, kind: AssetKind) -> &CompressPolicy {
        self.compress.get(kind)
    }

    pub fn compressors(&self, kind: AssetKind) -> &str {
        self.compressors.get(kind)
    }

    pub fn scss(&self) -> &ScssSettings {
        &self.scss
    }

    // ------------------------------------------------------------------
    // Validated setters
    // ------------------------------------------------------------------

    pub fn set_path_root(&mut self, root: impl Into<PathBuf>) -> Result<&mut Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(Error::PathRootNotSet);
        }
        if !root.exists() {
            return Err(Error::PathRootMissing(root));
        }
        self.path_root = root;
        Ok(self)
    }

    pub fn set_cache_dir(&mut self, dir: impl Into<String>) -> Result<&mut Self> {
        let dir = dir.into();
        if dir.is_empty() {
            return Err(Error::CacheDirNotSet);
        }
        self.cache_dir = dir;
        Ok(self)
    }

    pub fn set_cache_dir_create(&mut self, create: bool) -> &mut Self {
        self.cache_dir_create = create;
        self
    }

    pub fn set_cache_dir_mode(&mut self, mode: u32) -> &mut Self {
        self.cache_dir_mode = mode;
        self
    }

    /// Cache salt for fetched remote bodies. Empty disables caching of
    /// remote fetches.
    pub fn set_remote_hash(&mut self, salt: impl Into<String>) -> &mut Self {
        self.remote_hash = salt.into();
        self
    }

    /// Reassign the merge-sentinel offset. Only non-negative values are
    /// accepted; the default stays at [`DEFAULT_ALL_OFFSET`].
    pub fn set_all_offset(&mut self, offset: i64) -> Result<&mut Self> {
        if offset < 0 {
            return Err(Error::InvalidSentinelIndex(offset));
        }
        self.all_offset = offset;
        Ok(self)
    }

    pub fn set_service_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.service_host = host.into();
        self
    }

    /// Caller identity host forwarded with remote operations.
    pub fn set_site_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.site_host = host.into();
        self
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> Result<&mut Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        self.token = Some(token);
        Ok(self)
    }

    pub fn set_token_secret(&mut self, secret: impl Into<String>) -> Result<&mut Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::EmptyTokenSecret);
        }
        self.token_secret = Some(secret);
        Ok(self)
    }

    pub fn set_merge(&mut self, kind: AssetKind, merge: bool) -> &mut Self {
        *self.merge.get_mut(kind) = merge;
        self
    }

    pub fn set_merge_all(&mut self, merge: bool) -> &mut Self {
        self.merge.set_all(merge);
        self
    }

    pub fn set_compress(&mut self, kind: AssetKind, policy: CompressPolicy) -> &mut Self {
        *self.compress.get_mut(kind) = policy;
        self
    }

    pub fn set_compress_all(&mut self, policy: CompressPolicy) -> &mut Self {
        self.compress.set_all(policy);
        self
    }

    pub fn set_compressors(&mut self, kind: AssetKind, spec: impl Into<String>) -> Result<&mut Self> {
        let spec = spec.into();
        if spec.is_empty() {
            return Err(Error::NoCompressors);
        }
        *self.compressors.get_mut(kind) = spec;
        Ok(self)
    }

    pub fn set_scss(&mut self, scss: ScssSettings) -> &mut Self {
        self.scss = scss;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.all_offset(), DEFAULT_ALL_OFFSET);
        assert!(s.merge(AssetKind::Js));
        assert!(s.compress(AssetKind::Css).enable);
        assert!(s.compress(AssetKind::Css).local);
        assert_eq!(s.compressors(AssetKind::Js), "default");
        assert_eq!(s.scss().images_dir, "../images");
    }

    #[test]
    fn test_from_toml() {
        let s = Settings::from_toml_str(
            r#"
            cache_dir = "static/cache"
            remote_hash = "v3"

            [merge]
            js = false

            [compress.css]
            local = false

            [scss]
            images_dir = "../img"
            "#,
        )
        .unwrap();
        assert_eq!(s.cache_dir(), "static/cache");
        assert_eq!(s.remote_hash(), "v3");
        assert!(!s.merge(AssetKind::Js));
        assert!(s.merge(AssetKind::Css));
        assert!(!s.compress(AssetKind::Css).local);
        assert_eq!(s.scss().images_dir, "../img");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Settings::from_toml_str("no_such_option = 1").unwrap_err();
        assert_eq!(err.code(), 31);
    }

    #[test]
    fn test_sentinel_reassignment_must_be_non_negative() {
        let mut s = Settings::default();
        assert_eq!(s.set_all_offset(-5).unwrap_err().code(), 49);
        s.set_all_offset(0).unwrap();
        assert_eq!(s.all_offset(), 0);
    }

    #[test]
    fn test_empty_values_rejected() {
        let mut s = Settings::default();
        assert_eq!(s.set_token("").unwrap_err().code(), 34);
        assert_eq!(s.set_token_secret("").unwrap_err().code(), 35);
        assert_eq!(s.set_cache_dir("").unwrap_err().code(), 41);
        assert_eq!(s.set_path_root("").unwrap_err().code(), 52);
        assert_eq!(
            s.set_path_root("/definitely/not/here").unwrap_err().code(),
            51
        );
        assert_eq!(
            s.set_compressors(AssetKind::Js, "").unwrap_err().code(),
            38
        );
    }
}
