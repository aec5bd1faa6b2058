//! Shared compilation state.
//!
//! Everything a driver or plugin needs to know about the current run lives
//! here: the resolved directory layout (`CompilationContext`), the loaded
//! configuration, and the page graph. Drivers share one `Arc<Compilation>`
//! and treat it as immutable for the whole run.
//!
//! ```text
//! project root
//! ├── loam.toml
//! ├── src/            <- user_workspace
//! │   ├── pages/      <- pages_dir
//! │   ├── api/        <- apis_dir
//! │   └── layouts/    <- user_layouts_dir
//! ├── .loam/          <- scratch_dir (data_dir, layouts_dir below it)
//! └── public/         <- output_dir
//! ```

use crate::config::{ConfigError, SiteConfig};
use crate::graph::Page;
use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Workspace directory copied verbatim into the output, exempt from
/// bundling.
pub const ASSETS_DIR_NAME: &str = "assets";

/// Files ignored during directory traversal.
pub const IGNORED_FILES: &[&str] = &[".DS_Store"];

// ============================================================================
// Context
// ============================================================================

/// Resolved directory layout for one run. All paths are absolute.
#[derive(Debug, Clone)]
pub struct CompilationContext {
    /// Project root directory
    pub project_directory: PathBuf,
    /// Source workspace the site is authored in
    pub user_workspace: PathBuf,
    /// Page sources under the workspace
    pub pages_dir: PathBuf,
    /// API route sources under the workspace
    pub apis_dir: PathBuf,
    /// Layouts authored by the user
    pub user_layouts_dir: PathBuf,
    /// Layouts staged for the run (plugin-contributed layouts land here)
    pub layouts_dir: PathBuf,
    /// Build output directory
    pub output_dir: PathBuf,
    /// Intermediate artifact directory
    pub scratch_dir: PathBuf,
    /// Serialized run data (graph, manifest) under the scratch directory
    pub data_dir: PathBuf,
}

impl CompilationContext {
    /// Derive the directory layout from the configuration.
    ///
    /// The workspace must exist; everything else is created on demand by
    /// the drivers.
    pub fn resolve(config: &SiteConfig) -> Result<Self> {
        let root = SiteConfig::normalize_path(config.get_root());

        let user_workspace = SiteConfig::normalize_path(&root.join(&config.workspace.path));
        if !user_workspace.is_dir() {
            bail!(ConfigError::Validation(format!(
                "workspace directory not found: `{}`",
                user_workspace.display()
            )));
        }

        let scratch_dir = SiteConfig::normalize_path(&root.join(&config.workspace.scratch));

        Ok(Self {
            pages_dir: user_workspace.join(&config.workspace.pages),
            apis_dir: user_workspace.join(&config.workspace.apis),
            user_layouts_dir: user_workspace.join(&config.workspace.layouts),
            layouts_dir: scratch_dir.join("layouts"),
            output_dir: SiteConfig::normalize_path(&root.join(&config.workspace.output)),
            data_dir: scratch_dir.join("data"),
            scratch_dir,
            user_workspace,
            project_directory: root,
        })
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Immutable state for one run: context, configuration, and page graph.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub context: CompilationContext,
    pub config: SiteConfig,
    pub graph: Vec<Page>,
}

impl Compilation {
    /// A compilation with an empty graph, used while the graph itself is
    /// being constructed.
    pub fn seed(context: CompilationContext, config: SiteConfig) -> Self {
        Self {
            context,
            config,
            graph: Vec::new(),
        }
    }

    /// The same context and configuration with the finished graph.
    pub fn with_graph(&self, graph: Vec<Page>) -> Self {
        Self {
            context: self.context.clone(),
            config: self.config.clone(),
            graph,
        }
    }

    /// Find the page whose route matches a root-relative request path.
    ///
    /// `/about`, `/about/`, and `/about/index.html` all address the same
    /// page.
    pub fn page_for_path(&self, request_path: &str) -> Option<&Page> {
        let path = request_path
            .strip_suffix("index.html")
            .unwrap_or(request_path);
        let wanted = normalize_route(path);
        self.graph.iter().find(|page| page.route == wanted)
    }

    /// Map a root-relative request path to the URL the pipeline resolves.
    ///
    /// Paths matching a page route point at the page source; everything
    /// else points into the user workspace.
    pub fn url_for_path(&self, request_path: &str) -> Result<Url> {
        if let Some(page) = self.page_for_path(request_path) {
            return file_url(&page.path);
        }
        let relative = request_path.trim_start_matches('/');
        file_url(&self.context.user_workspace.join(relative))
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// What the build leaves behind for deployment adapters: the non-static
/// surface of the site.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    /// API routes by route path, pointing at their copied entry file under
    /// the output directory.
    pub apis: BTreeMap<String, PathBuf>,
    /// Routes of pages that stay server-rendered (not pre-rendered into
    /// static output).
    pub ssr_pages: Vec<String>,
}

// ============================================================================
// Path and URL helpers
// ============================================================================

/// Express an absolute filesystem path as a `file:` URL.
pub fn file_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|()| anyhow!("cannot express `{}` as a file URL", path.display()))
}

/// Normalize a path into canonical route form: leading and trailing slash,
/// `/` for the root.
pub fn normalize_route(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Map a route to its static output file under the output directory.
///
/// `/` becomes `index.html`, `/blog/first/` becomes `blog/first/index.html`.
pub fn route_output_path(output_dir: &Path, route: &str) -> PathBuf {
    let relative = route.trim_matches('/');
    if relative.is_empty() {
        output_dir.join("index.html")
    } else {
        output_dir.join(relative).join("index.html")
    }
}

// ============================================================================
// Tests
// ============================================================================
