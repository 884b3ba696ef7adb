//! Asset type definitions.

use serde::Deserialize;
use std::fmt;

/// Kind of pipeline asset. Each kind owns its registry, dirty flag and
/// type-level merge/compression defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Js,
    Css,
}

impl AssetKind {
    /// Build order: css first, then js.
    pub const ALL: [AssetKind; 2] = [AssetKind::Css, AssetKind::Js];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Js => "js",
            AssetKind::Css => "css",
        }
    }

    /// Join separator for merged entries of this kind.
    pub fn merge_glue(self) -> &'static str {
        match self {
            AssetKind::Js => ";\n",
            AssetKind::Css => "\n",
        }
    }

    /// Default primary grouping key: js groups by place, css by condition.
    pub fn default_primary(self) -> &'static str {
        match self {
            AssetKind::Js => "body",
            AssetKind::Css => "none",
        }
    }

    /// Default secondary grouping key: js groups by condition, css by media.
    pub fn default_secondary(self) -> &'static str {
        match self {
            AssetKind::Js => "none",
            AssetKind::Css => "all",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value held once per asset kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerKind<T> {
    pub js: T,
    pub css: T,
}

impl<T> PerKind<T> {
    pub fn new(js: T, css: T) -> Self {
        Self { js, css }
    }

    pub fn get(&self, kind: AssetKind) -> &T {
        match kind {
            AssetKind::Js => &self.js,
            AssetKind::Css => &self.css,
        }
    }

    pub fn get_mut(&mut self, kind: AssetKind) -> &mut T {
        match kind {
            AssetKind::Js => &mut self.js,
            AssetKind::Css => &mut self.css,
        }
    }

    /// Assign the same value to both kinds.
    pub fn set_all(&mut self, value: T)
    where
        T: Clone,
    {
        self.js = value.clone();
        self.css = value;
    }
}

impl<T: Clone> PerKind<T> {
    pub fn splat(value: T) -> Self {
        Self {
            js: value.clone(),
            css: value,
        }
    }
}
