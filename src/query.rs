//! Read-only projections over the registry.
//!
//! The same two-level grouping the renderer walks, returned as
//! structured data instead of markup.

use crate::error::{Error, Result};
use crate::registry::{AssetEntry, BuiltResult, TypeRegistry};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Built results grouped `primary → secondary`, in encounter order,
/// each bin's results in output order.
pub type ResultSet = IndexMap<String, IndexMap<String, Vec<BuiltResult>>>;

/// Collect built results, optionally restricted to one primary and/or
/// secondary key. Empty bins and bins with no built results are left out.
pub(crate) fn collect(
    registry: &TypeRegistry,
    all_offset: i64,
    primary: Option<&str>,
    secondary: Option<&str>,
) -> ResultSet {
    let mut out = ResultSet::default();
    for (primary_key, secondaries) in &registry.groups {
        if primary.is_some_and(|want| want != primary_key) {
            continue;
        }
        for (secondary_key, bin) in secondaries {
            if secondary.is_some_and(|want| want != secondary_key) {
                continue;
            }
            let results: Vec<BuiltResult> =
                bin.visible(all_offset).into_iter().cloned().collect();
            if results.is_empty() {
                continue;
            }
            out.entry(primary_key.clone())
                .or_default()
                .insert(secondary_key.clone(), results);
        }
    }
    out
}

/// Resolve a fully-qualified bin's raw offset → entry map.
pub(crate) fn bin<'a>(
    registry: &'a TypeRegistry,
    primary: &str,
    secondary: &str,
) -> Result<&'a BTreeMap<i64, AssetEntry>> {
    registry
        .bin(primary, secondary)
        .map(|bin| bin.entries())
        .ok_or_else(|| Error::NoSuchBin {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
        })
}
