//! `[workspace]` section configuration.
//!
//! Declares where project sources live and where build artifacts go,
//! all relative to the project root.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[workspace]` section in loam.toml - project directory layout.
///
/// # Example
/// ```toml
/// [workspace]
/// path = "www"        # Source workspace instead of "src"
/// pages = "pages"     # Page sources, relative to the workspace
/// output = "dist"     # Build output, relative to the project root
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Project root directory. Normally supplied by the CLI, not the file.
    #[serde(default = "defaults::workspace::root")]
    #[educe(Default = defaults::workspace::root())]
    pub root: Option<PathBuf>,

    /// Source workspace directory, relative to the project root.
    #[serde(default = "defaults::workspace::path")]
    #[educe(Default = defaults::workspace::path())]
    pub path: PathBuf,

    /// Page sources, relative to the workspace.
    #[serde(default = "defaults::workspace::pages")]
    #[educe(Default = defaults::workspace::pages())]
    pub pages: PathBuf,

    /// API route sources, relative to the workspace.
    #[serde(default = "defaults::workspace::apis")]
    #[educe(Default = defaults::workspace::apis())]
    pub apis: PathBuf,

    /// Layout sources, relative to the workspace.
    #[serde(default = "defaults::workspace::layouts")]
    #[educe(Default = defaults::workspace::layouts())]
    pub layouts: PathBuf,

    /// Build output directory, relative to the project root.
    #[serde(default = "defaults::workspace::output")]
    #[educe(Default = defaults::workspace::output())]
    pub output: PathBuf,

    /// Intermediate artifact directory, relative to the project root.
    #[serde(default = "defaults::workspace::scratch")]
    #[educe(Default = defaults::workspace::scratch())]
    pub scratch: PathBuf,
}
