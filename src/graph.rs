//! Page graph construction.
//!
//! The graph is the ordered list of every page the site serves. It is built
//! once per run: filesystem discovery under the pages directory first, then
//! source plugins append their pages in declaration order.
//!
//! ```text
//! src/pages/index.md        -> route /
//! src/pages/about.md        -> route /about/
//! src/pages/blog/index.md   -> route /blog/
//! src/pages/blog/first.md   -> route /blog/first/
//! src/pages/search.js       -> route /search/   (server-rendered)
//! ```

use crate::compilation::{Compilation, CompilationContext, IGNORED_FILES};
use crate::config::SiteConfig;
use crate::log;
use crate::plugins::{PluginProvider, PluginSet, flatten};
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use walkdir::WalkDir;

/// Page extensions that stay server-rendered instead of being served as
/// static markup.
const SSR_EXTENSIONS: &[&str] = &["js", "mjs"];

/// Front matter fence for markdown pages, TOML between `+++` lines.
const FRONT_MATTER_FENCE: &str = "+++";

// ============================================================================
// Page
// ============================================================================

/// One addressable page of the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Unique identity within the graph
    pub id: String,
    /// Document title, if the page declares one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    /// Human-readable name for navigation
    pub label: String,
    /// Canonical route, `/` or `/segment/.../` form
    pub route: String,
    /// Source file the page is generated from
    pub path: PathBuf,
    /// Whether the page is rendered per request instead of ahead of time
    #[serde(default)]
    pub is_ssr: bool,
    /// Page front matter and plugin-attached data
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Graph Construction
// ============================================================================

/// Build the page graph: filesystem discovery, then source plugins in
/// declaration order. Pages are unique by id; later duplicates are dropped.
pub fn build_graph(sets: &[PluginSet], seed: &Arc<Compilation>) -> Result<Vec<Page>> {
    let mut graph = discover_pages(&seed.context, &seed.config)?;

    for declaration in flatten(sets) {
        let PluginProvider::Source(provider) = &declaration.provider else {
            continue;
        };
        let pages = provider(seed)
            .with_context(|| format!("source plugin `{}` failed", declaration.name))?;
        graph.extend(pages);
    }

    dedupe_by_id(&mut graph);
    Ok(graph)
}

/// Discover pages under the pages directory. A missing directory yields an
/// empty graph, not an error.
pub fn discover_pages(context: &CompilationContext, config: &SiteConfig) -> Result<Vec<Page>> {
    if !context.pages_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut pages = Vec::new();
    for path in collect_page_files(&context.pages_dir) {
        if let Some(page) = page_from_file(&context.pages_dir, config, &path)? {
            pages.push(page);
        }
    }
    Ok(pages)
}

/// Collect all files from a directory recursively, in a deterministic
/// order.
fn collect_page_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_str().unwrap_or_default();
            !IGNORED_FILES.contains(&name)
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Turn one source file into a page, or `None` for extensions that are not
/// pages.
fn page_from_file(pages_dir: &Path, config: &SiteConfig, path: &Path) -> Result<Option<Page>> {
    let relative = path
        .strip_prefix(pages_dir)
        .with_context(|| format!("page outside pages directory: `{}`", path.display()))?;
    let extension = path.extension().and_then(OsStr::to_str).unwrap_or_default();

    let is_markdown = config.markdown.extensions.iter().any(|e| e == extension);
    let is_ssr = SSR_EXTENSIONS.contains(&extension);
    let is_extra = config.dev_server.extensions.iter().any(|e| e == extension);
    if !is_markdown && !is_ssr && !is_extra && extension != "html" {
        return Ok(None);
    }

    let stem = relative
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    let route = route_for_relative(relative);

    let mut title = None;
    let mut label = humanize_stem(stem);
    let mut data = BTreeMap::new();

    if is_markdown {
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read page `{}`", path.display()))?;
        if let Some((raw, _body)) = split_front_matter(&content) {
            let table: toml::Table = toml::from_str(raw)
                .with_context(|| format!("invalid front matter in `{}`", path.display()))?;
            for (key, value) in table {
                match key.as_str() {
                    "title" => title = value.as_str().map(str::to_string),
                    "label" => {
                        if let Some(text) = value.as_str() {
                            label = text.to_string();
                        }
                    }
                    _ => {}
                }
                data.insert(key, serde_json::to_value(value)?);
            }
        }
    }

    Ok(Some(Page {
        id: id_for_route(&route),
        title,
        label,
        route,
        path: path.to_path_buf(),
        is_ssr,
        data,
    }))
}

/// Drop pages whose id already appeared earlier in the graph.
fn dedupe_by_id(graph: &mut Vec<Page>) {
    let mut seen = FxHashSet::default();
    graph.retain(|page| {
        if seen.insert(page.id.clone()) {
            true
        } else {
            log!("graph"; "duplicate page id `{}` dropped", page.id);
            false
        }
    });
}

// ============================================================================
// Front Matter
// ============================================================================

/// Split content into raw front matter and body.
///
/// Front matter is TOML between `+++` fences starting on the first line.
/// Content without an opening fence, or with an unterminated one, is
/// treated as all body.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix(FRONT_MATTER_FENCE)?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let end = rest.find(&format!("\n{FRONT_MATTER_FENCE}"))?;
    let raw = &rest[..end];
    let body = &rest[end + 1 + FRONT_MATTER_FENCE.len()..];
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    Some((raw, body))
}

// ============================================================================
// Naming Helpers
// ============================================================================

/// Derive the route for a page file relative to the pages directory.
/// `index` stems collapse into their directory route.
fn route_for_relative(relative: &Path) -> String {
    let stem = relative
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    let parent = relative.parent().unwrap_or(Path::new(""));

    let mut route = String::from("/");
    for component in parent.components() {
        if let Component::Normal(part) = component
            && let Some(part) = part.to_str()
        {
            route.push_str(part);
            route.push('/');
        }
    }
    if stem != "index" {
        route.push_str(stem);
        route.push('/');
    }
    route
}

/// Graph identity for a route: `/` becomes `index`, other routes join
/// their segments with dashes.
fn id_for_route(route: &str) -> String {
    let trimmed = route.trim_matches('/');
    if trimmed.is_empty() {
        "index".to_string()
    } else {
        trimmed.replace('/', "-")
    }
}

/// Default navigation label from a file stem: `first-post` becomes
/// `First Post`.
fn humanize_stem(stem: &str) -> String {
    stem.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
