//! Bundler collaborator: asset staging for builds.
//!
//! A deliberately thin stand-in for a full module bundler. It walks the
//! workspace for scripts and styles, runs the registered transforms over
//! their text, and stages the results under the scratch directory:
//!
//! ```text
//! src/styles/site.css   -> .loam/styles/site.css   -> public/styles/site.css
//! src/scripts/nav.js    -> .loam/scripts/nav.js    -> public/scripts/nav.js
//! ```
//!
//! The build driver pushes each staged asset through the resource pipeline
//! like any other URL. Pages, API routes, layouts, and the verbatim-copied
//! `assets/` directory are exempt from staging.

use crate::compilation::{ASSETS_DIR_NAME, Compilation, IGNORED_FILES, file_url};
use crate::log;
use crate::plugins::BundleTransform;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions the bundler stages.
const BUNDLED_EXTENSIONS: &[&str] = &["js", "mjs", "css"];

/// One staged asset: where it will live under the site root, and the
/// staged file the pipeline reads it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Root-relative URL path, `/styles/site.css` form
    pub url_path: String,
    /// Staged file under the scratch directory
    pub location: PathBuf,
}

/// Every asset the build must write, in deterministic walk order.
#[derive(Debug, Clone, Default)]
pub struct BundleManifest {
    pub assets: Vec<AssetEntry>,
}

/// Walk the workspace, transform and stage every script and style, and
/// return the manifest of staged assets.
pub fn stage_assets(
    compilation: &Compilation,
    transforms: &[BundleTransform],
) -> Result<BundleManifest> {
    let context = &compilation.context;
    let mut manifest = BundleManifest::default();

    for path in collect_asset_files(compilation) {
        let relative = path
            .strip_prefix(&context.user_workspace)
            .with_context(|| format!("asset `{}` escapes the workspace", path.display()))?;
        let Some(url_path) = url_path_for(relative) else {
            log!("bundle"; "skipping asset with non-unicode name: {}", path.display());
            continue;
        };

        let staged = context.scratch_dir.join(relative);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating staging directory {}", parent.display()))?;
        }

        match fs::read_to_string(&path) {
            Ok(content) => {
                let url = file_url(&path)?;
                let content = apply_transforms(content, &url, transforms)?;
                fs::write(&staged, content)
                    .with_context(|| format!("staging asset {}", staged.display()))?;
            }
            // Not text; stage the bytes untouched
            Err(_) => {
                fs::copy(&path, &staged)
                    .with_context(|| format!("staging asset {}", staged.display()))?;
            }
        }

        manifest.assets.push(AssetEntry {
            url_path,
            location: staged,
        });
    }

    log!("bundle"; "staged {} assets", manifest.assets.len());
    Ok(manifest)
}

/// Run every transform over the content in registration order. A transform
/// returning `None` leaves the content as the previous one produced it.
fn apply_transforms(
    mut content: String,
    url: &url::Url,
    transforms: &[BundleTransform],
) -> Result<String> {
    for transform in transforms {
        if let Some(rewritten) = (transform.rewrite)(&content, url)
            .with_context(|| format!("transform `{}` failed for {url}", transform.name))?
        {
            content = rewritten;
        }
    }
    Ok(content)
}

/// Workspace files eligible for staging, in deterministic order.
fn collect_asset_files(compilation: &Compilation) -> Vec<PathBuf> {
    let context = &compilation.context;
    let exempt = [
        context.pages_dir.clone(),
        context.apis_dir.clone(),
        context.user_layouts_dir.clone(),
        context.user_workspace.join(ASSETS_DIR_NAME),
        context.scratch_dir.clone(),
    ];

    WalkDir::new(&context.user_workspace)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| !exempt.iter().any(|dir| e.path() == dir))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_str().unwrap_or_default();
            !IGNORED_FILES.contains(&name)
        })
        .filter(|e| has_bundled_extension(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn has_bundled_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|extension| BUNDLED_EXTENSIONS.contains(&extension))
}

/// Root-relative URL path for a workspace-relative file path, or `None`
/// when the path is not valid unicode.
fn url_path_for(relative: &Path) -> Option<String> {
    let joined = relative.to_str()?;
    if std::path::MAIN_SEPARATOR == '/' {
        Some(format!("/{joined}"))
    } else {
        Some(format!("/{}", joined.replace(std::path::MAIN_SEPARATOR, "/")))
    }
}

// ============================================================================
// Tests
// ============================================================================
