//! `[polyfills]` section configuration.
//!
//! Opt-in compatibility shims for browser features the served pages rely on.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// Import attribute kinds that can be polyfilled for browsers without
/// native support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAttribute {
    /// `import sheet from "./styles.css" with { type: "css" }`
    Css,
    /// `import data from "./data.json" with { type: "json" }`
    Json,
}

/// `[polyfills]` section in loam.toml - browser compatibility settings.
///
/// # Example
/// ```toml
/// [polyfills]
/// import_attributes = ["css", "json"]
/// import_maps = true
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct PolyfillsConfig {
    /// Import attribute kinds to polyfill. Empty disables the shim.
    #[serde(default = "defaults::polyfills::import_attributes")]
    #[educe(Default = defaults::polyfills::import_attributes())]
    pub import_attributes: Vec<ImportAttribute>,

    /// Emit an import map shim for bare module specifiers.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub import_maps: bool,
}
