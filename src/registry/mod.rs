//! Offset-ordered asset registry.
//!
//! Two-level grouping per asset kind: `primary key → secondary key → Bin`.
//! Group maps preserve encounter order (rendering concatenates groups in
//! registration order); each bin keys its entries by signed integer offset
//! and iterates them in ascending numeric order. The synthesized merged
//! asset lives in a dedicated slot on the bin, positioned at the reserved
//! `all_offset` rank when iterated.

mod entry;

pub use entry::{AssetEntry, AssetOptions, BuiltResult};

use crate::error::{Error, Result};
use crate::kind::AssetKind;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Normalize a placement key: trimmed, lower-cased, defaulted when empty.
pub(crate) fn normalize_key(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.to_lowercase(),
        None => default.to_string(),
    }
}

/// The ordered collection of entries sharing one `(primary, secondary)`
/// key pair.
#[derive(Debug, Clone, Default)]
pub struct Bin {
    /// Offset → entry, ascending.
    pub(crate) entries: BTreeMap<i64, AssetEntry>,
    /// Synthesized merged asset, present only after a build pass merged
    /// two or more entries.
    pub(crate) merged: Option<BuiltResult>,
}

impl Bin {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<i64, AssetEntry> {
        &self.entries
    }

    pub fn merged(&self) -> Option<&BuiltResult> {
        self.merged.as_ref()
    }

    /// Append: next position after existing entries. For bins whose
    /// highest offset is negative the next append lands at 0.
    fn append(&mut self, entry: AssetEntry) -> i64 {
        let at = self
            .entries
            .keys()
            .next_back()
            .map(|max| (max + 1).max(0))
            .unwrap_or(0);
        self.entries.insert(at, entry);
        at
    }

    /// Prepend: one below the lowest existing offset, `-1` for an empty bin.
    fn prepend(&mut self, entry: AssetEntry) -> i64 {
        let at = self.entries.keys().next().map(|min| min - 1).unwrap_or(-1);
        self.entries.insert(at, entry);
        at
    }

    /// Built results in output order: entries ascending by offset with
    /// the merged asset spliced in at the sentinel's numeric rank, and
    /// entries folded into it skipped. Unbuilt entries are skipped too.
    pub fn visible(&self, all_offset: i64) -> Vec<&BuiltResult> {
        let mut out = Vec::new();
        let mut merged = self.merged.as_ref();
        for (&offset, entry) in &self.entries {
            if let Some(combined) = merged {
                if all_offset < offset {
                    out.push(combined);
                    merged = None;
                }
            }
            let Some(result) = entry.result.as_ref() else {
                continue;
            };
            if !result.merge {
                out.push(result);
            }
        }
        if let Some(combined) = merged {
            out.push(combined);
        }
        out
    }
}

/// One asset kind's two-level grouping of bins.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    pub(crate) groups: IndexMap<String, IndexMap<String, Bin>>,
}

impl TypeRegistry {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn bin(&self, primary: &str, secondary: &str) -> Option<&Bin> {
        self.groups.get(primary)?.get(secondary)
    }

    fn ensure_bin(&mut self, primary: String, secondary: String) -> &mut Bin {
        self.groups
            .entry(primary)
            .or_default()
            .entry(secondary)
            .or_default()
    }
}

/// Both asset kinds' registries.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    js: TypeRegistry,
    css: TypeRegistry,
}

impl Registry {
    pub fn get(&self, kind: AssetKind) -> &TypeRegistry {
        match kind {
            AssetKind::Js => &self.js,
            AssetKind::Css => &self.css,
        }
    }

    pub fn get_mut(&mut self, kind: AssetKind) -> &mut TypeRegistry {
        match kind {
            AssetKind::Js => &mut self.js,
            AssetKind::Css => &mut self.css,
        }
    }

    /// Insert an entry.
    ///
    /// `offset` semantics: `None` appends, `-1` prepends, any other value
    /// replaces in place when occupied or lands at that exact offset.
    /// Offsets at or below `all_offset` are rejected.
    pub fn insert(
        &mut self,
        kind: AssetKind,
        primary: String,
        secondary: String,
        offset: Option<i64>,
        all_offset: i64,
        entry: AssetEntry,
    ) -> Result<i64> {
        if let Some(at) = offset {
            if at < all_offset {
                return Err(Error::OffsetTooSmall {
                    min: all_offset,
                    given: at,
                });
            }
            if at == all_offset {
                return Err(Error::ReservedOffset(at));
            }
        }
        let bin = self.get_mut(kind).ensure_bin(primary, secondary);
        let at = match offset {
            None => bin.append(entry),
            Some(-1) => bin.prepend(entry),
            Some(at) => {
                bin.entries.insert(at, entry);
                at
            }
        };
        Ok(at)
    }

    /// Remove the entry at `offset` within the resolved bin.
    pub fn remove(
        &mut self,
        kind: AssetKind,
        primary: &str,
        secondary: &str,
        offset: i64,
        all_offset: i64,
    ) -> Result<AssetEntry> {
        if offset == all_offset {
            return Err(Error::ReservedOffset(offset));
        }
        self.get_mut(kind)
            .groups
            .get_mut(primary)
            .and_then(|secondaries| secondaries.get_mut(secondary))
            .and_then(|bin| bin.entries.remove(&offset))
            .ok_or(Error::OffsetNotFound(offset))
    }

    /// Discard the entire per-kind registry.
    pub fn clear(&mut self, kind: AssetKind) {
        *self.get_mut(kind) = TypeRegistry::default();
    }
}
