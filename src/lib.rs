//! # wx-preview native
//!
//! Browser previews for Mini Program projects.
//!
//! ## Converters
//!
//! 1. **Markup** (`wxml`): WXML → HTML through ten ordered text passes. Tags
//!    are mapped through a single table (`tags::TAG_TABLE`), directives become
//!    `data-wx-*` metadata attributes, interpolations become
//!    `data-expression` / `data-bind-*` bindings and custom component tags
//!    become `div` hosts carrying `data-component`.
//!
//! 2. **Style** (`wxss`): WXSS → CSS. `rpx` lengths are rescaled against a
//!    750 px design width, element selectors follow the same tag table and
//!    a base stylesheet is prepended.
//!
//! Both converters are fail-open: an internal error is logged and the input
//! is returned unchanged.
//!
//! ## Runtime simulator
//!
//! `runtime::Simulator` mounts converted markup and drives it with the Mini
//! Program object model: page and component lifecycles, `setData` with
//! synchronous re-rendering (`render`), event dispatch and a deferred task
//! queue. The simulator is single-threaded and holds no global state.
//!
//! ## Sync tool
//!
//! `sync::SyncTool` converts a project tree into preview files, skipping
//! sources whose content hash is unchanged (`cache`), and `sync::watch`
//! re-syncs after edits settle.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod cache;
pub mod config;
pub mod discovery;
pub mod dom;
pub mod error;
pub mod expression;
pub mod host;
pub mod render;
pub mod runtime;
pub mod sync;
pub mod tags;
pub mod wxml;
pub mod wxss;

#[cfg(test)]
mod runtime_tests;
#[cfg(test)]
mod wxml_tests;

pub use config::{SimulatorConfig, SyncConfig};
pub use error::{ConvertError, HostError, RuntimeError, SyncError};
pub use runtime::{
    AppDefinition, ComponentDefinition, ComponentInstance, Event, PageDefinition, PageInstance,
    PageState, Simulator,
};

#[cfg(feature = "napi")]
#[napi]
pub fn convert_wxml_native(source: String) -> String {
    wxml::convert(&source)
}

#[cfg(feature = "napi")]
#[napi]
pub fn convert_wxss_native(source: String) -> String {
    wxss::convert(&source)
}

#[cfg(feature = "napi")]
#[napi]
pub fn discover_sources_native(root: String) -> napi::Result<serde_json::Value> {
    let sources = discovery::discover_sources(std::path::Path::new(&root));
    serde_json::to_value(sources).map_err(|e| napi::Error::from_reason(e.to_string()))
}
