//! CSS/JS asset-pipeline core.
//!
//! Assets register under a two-level placement taxonomy (js: place then
//! condition; css: condition then media) into offset-ordered bins. A
//! dirty-tracked build pass resolves each entry to transformed content
//! under a content-addressed cache key and merges eligible entries per
//! bin; rendering emits grouped markup with conditional-comment
//! envelopes. Minification runs locally where possible and falls back
//! to a remote transform service.
//!
//! Entry point: [`Pipeline`], one instance per logical build.

mod build;
pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod kind;
pub mod logger;
mod parse;
pub mod pipeline;
mod query;
pub mod registry;
pub mod remote;
mod render;

pub use config::{CompressPolicy, DEFAULT_ALL_OFFSET, ScssSettings, Settings};
pub use error::{Error, Result};
pub use kind::AssetKind;
pub use pipeline::Pipeline;
pub use query::ResultSet;
pub use registry::{AssetEntry, AssetOptions, BuiltResult};
