//! `[markdown]` section configuration.
//!
//! Controls which files are treated as markdown pages and which processor
//! plugins renderer plugins should apply to them.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[markdown]` section in loam.toml - markdown handling settings.
///
/// # Example
/// ```toml
/// [markdown]
/// plugins = ["remark-github"]   # Processor names for renderer plugins
/// extensions = ["md", "markdown"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownConfig {
    /// Processor plugin names, consumed by renderer plugins in order.
    #[serde(default = "defaults::markdown::plugins")]
    #[educe(Default = defaults::markdown::plugins())]
    pub plugins: Vec<String>,

    /// File extensions (without the dot) treated as markdown pages.
    #[serde(default = "defaults::markdown::extensions")]
    #[educe(Default = defaults::markdown::extensions())]
    pub extensions: Vec<String>,
}
