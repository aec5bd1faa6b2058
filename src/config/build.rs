//! `[build]` section configuration.
//!
//! Controls how the site is produced: the optimization mode applied to
//! pipeline output, pre-rendering of server routes, and the base path the
//! site is mounted under.

use super::{defaults, error::ConfigError};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Enums
// ============================================================================

/// Optimization mode applied by optimize-stage plugins at build time.
///
/// The mode is advisory: plugins read it from the configuration and decide
/// what to do with matching responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Optimization {
    /// Ship resources untouched.
    None,

    /// Minify build output (the standard treatment).
    #[default]
    Default,

    /// Minify, and prefer inlining small resources into the page.
    Inline,

    /// Minify, and strip page scripts for fully static delivery.
    Static,
}

impl FromStr for Optimization {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "default" => Ok(Self::Default),
            "inline" => Ok(Self::Inline),
            "static" => Ok(Self::Static),
            other => Err(ConfigError::Validation(format!(
                "unknown optimization mode `{other}` (expected none, default, inline, or static)"
            ))),
        }
    }
}

// ============================================================================
// Main BuildConfig
// ============================================================================

/// `[build]` section in loam.toml - build behavior settings.
///
/// # Example
/// ```toml
/// [build]
/// base_path = "/docs"       # Site is mounted under /docs
/// optimization = "inline"
/// prerender = true          # Render server routes to static HTML
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Path prefix the site is mounted under.
    /// Empty (default) for the domain root, otherwise `/prefix` form.
    #[serde(default = "defaults::build::base_path")]
    #[educe(Default = defaults::build::base_path())]
    pub base_path: String,

    /// Optimization mode for build output.
    #[serde(default = "defaults::build::optimization")]
    #[educe(Default = defaults::build::optimization())]
    pub optimization: Optimization,

    /// Render server-routed pages into static HTML during the build.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub prerender: bool,

    /// Emit client-side route data for soft navigation.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub static_router: bool,

    /// Expose content-as-data endpoints to client code.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub active_content: bool,

    /// Render each page in an isolated context.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub isolation: bool,
}
