//! Static build orchestration.
//!
//! Serializes the same resolution the dev server performs per request,
//! with the optimize stage enabled:
//!
//! ```text
//! build_site()
//!     │
//!     ├── stage_assets()      bundler transforms + stages scripts/styles
//!     │
//!     ├── write targets       every page route and staged asset through
//!     │   (rayon fan-out)     the pipeline, bodies written under output
//!     │
//!     ├── copy plugins        verbatim file/directory copies
//!     │
//!     ├── manifest + data     API routes, server routes, graph.json
//!     │
//!     └── run_adapters()      deployment hand-off, output already final
//! ```
//!
//! Output paths are disjoint and each is written exactly once; any
//! resolution error fails the whole build.

use crate::{
    adapt,
    bundler::{self, BundleManifest},
    compilation::{Compilation, CompilationContext, IGNORED_FILES, Manifest, file_url,
        route_output_path},
    log,
    logger::ProgressBars,
    pipeline::ResourcePipeline,
    plugins::registry::PluginRegistry,
};
use anyhow::{Context, Result, anyhow, bail, ensure};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use url::Url;
use walkdir::WalkDir;

/// One unit of pipeline output: the URL to resolve and the file its body
/// lands in.
struct WriteTarget {
    url: Url,
    output_path: PathBuf,
}

/// Build the entire site.
///
/// This function:
/// 1. Prepares the output directory (clearing it first when `clean` is set)
/// 2. Stages workspace assets through the bundler transforms
/// 3. Resolves every page route and staged asset through the pipeline,
///    in parallel, and writes the bodies under the output directory
/// 4. Runs copy plugins, collects the deployment manifest, and serializes
///    the run data
/// 5. Hands off to deployment adapters
pub fn build_site(
    compilation: &Arc<Compilation>,
    registry: &Arc<PluginRegistry>,
    clean: bool,
) -> Result<()> {
    let context = &compilation.context;
    let prerender = compilation.config.build.prerender;

    prepare_output(&context.output_dir, clean)?;

    let bundle = bundler::stage_assets(compilation, registry.transforms())?;

    let mut page_targets = static_page_targets(compilation)?;
    if prerender {
        page_targets.extend(prerender_targets(compilation, registry)?);
    }
    let asset_targets = asset_targets(context, &bundle)?;

    // Claim output paths up front, in graph order, so duplicate routes
    // resolve deterministically regardless of write scheduling
    let mut claimed = FxHashSet::default();
    let page_targets = dedupe_targets(page_targets, &mut claimed);
    let asset_targets = dedupe_targets(asset_targets, &mut claimed);

    log!("build"; "writing {} pages, {} assets", page_targets.len(), asset_targets.len());
    let progress = ProgressBars::new_filtered(&[
        ("pages", page_targets.len()),
        ("assets", asset_targets.len()),
    ]);
    let inc = |name: &str| {
        if let Some(progress) = &progress {
            progress.inc(name);
        }
    };

    let has_error = AtomicBool::new(false);
    let pipeline = ResourcePipeline::new(Arc::clone(registry));

    let (pages_result, assets_result) = rayon::join(
        || write_targets(&page_targets, &pipeline, &has_error, || inc("pages")),
        || write_targets(&asset_targets, &pipeline, &has_error, || inc("assets")),
    );

    if let Some(progress) = &progress {
        progress.finish();
    }
    pages_result?;
    assets_result?;

    run_copy_plugins(compilation, registry)?;

    let manifest = collect_manifest(compilation, prerender)?;
    copy_api_entries(compilation, &manifest)?;
    write_run_data(compilation, &manifest)?;

    adapt::run_adapters(registry, compilation, &manifest)?;

    log_build_result(&context.output_dir)
}

/// Ensure the output directory exists. When `clean` is set, existing
/// content is removed first.
fn prepare_output(output: &Path, clean: bool) -> Result<()> {
    if clean && output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clear output directory: {}", output.display()))?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))
}

// ============================================================================
// Target Enumeration
// ============================================================================

/// Pipeline targets for the statically served pages, in graph order.
fn static_page_targets(compilation: &Compilation) -> Result<Vec<WriteTarget>> {
    compilation
        .graph
        .iter()
        .filter(|page| !page.is_ssr)
        .map(|page| {
            Ok(WriteTarget {
                url: file_url(&page.path)?,
                output_path: route_output_path(&compilation.context.output_dir, &page.route),
            })
        })
        .collect()
}

/// Render server routes ahead of time and stage the markup, so the staged
/// files run through the pipeline like any other page.
fn prerender_targets(
    compilation: &Compilation,
    registry: &PluginRegistry,
) -> Result<Vec<WriteTarget>> {
    let server_pages: Vec<_> = compilation.graph.iter().filter(|p| p.is_ssr).collect();
    if server_pages.is_empty() {
        return Ok(Vec::new());
    }

    let Some(renderer) = registry.renderers().first() else {
        bail!(
            "prerender is enabled but no renderer plugin is registered for {} server route(s)",
            server_pages.len()
        );
    };

    let staging = compilation.context.scratch_dir.join("prerender");
    fs::create_dir_all(&staging)
        .with_context(|| format!("creating prerender directory {}", staging.display()))?;

    let mut targets = Vec::new();
    for page in server_pages {
        let html = (renderer.capability.render)(page)
            .with_context(|| format!("renderer `{}` failed for `{}`", renderer.name, page.route))?;
        let staged = staging.join(format!("{}.html", page.id));
        fs::write(&staged, html)
            .with_context(|| format!("staging prerendered page {}", staged.display()))?;
        targets.push(WriteTarget {
            url: file_url(&staged)?,
            output_path: route_output_path(&compilation.context.output_dir, &page.route),
        });
    }
    Ok(targets)
}

/// Pipeline targets for the staged bundler assets.
fn asset_targets(
    context: &CompilationContext,
    bundle: &BundleManifest,
) -> Result<Vec<WriteTarget>> {
    bundle
        .assets
        .iter()
        .map(|asset| {
            Ok(WriteTarget {
                url: file_url(&asset.location)?,
                output_path: context
                    .output_dir
                    .join(asset.url_path.trim_start_matches('/')),
            })
        })
        .collect()
}

// ============================================================================
// Pipeline Writes
// ============================================================================

/// Drop targets whose output path is already claimed, keeping the first.
fn dedupe_targets(
    targets: Vec<WriteTarget>,
    claimed: &mut FxHashSet<PathBuf>,
) -> Vec<WriteTarget> {
    targets
        .into_iter()
        .filter(|target| {
            if claimed.insert(target.output_path.clone()) {
                return true;
            }
            log!("build"; "skipping duplicate output {}", target.output_path.display());
            false
        })
        .collect()
}

/// Resolve and write a batch of targets, failing fast across the whole
/// build once any target errors.
fn write_targets(
    targets: &[WriteTarget],
    pipeline: &ResourcePipeline,
    has_error: &AtomicBool,
    inc: impl Fn() + Sync,
) -> Result<()> {
    targets.par_iter().try_for_each(|target| {
        if has_error.load(Ordering::Relaxed) {
            return Err(anyhow!("Aborted"));
        }
        if let Err(e) = write_target(target, pipeline) {
            if !has_error.swap(true, Ordering::Relaxed) {
                log!("error"; "{}: {:#}", target.url, e);
            }
            return Err(anyhow!("Build failed"));
        }
        inc();
        Ok(())
    })
}

/// Resolve one target with optimization enabled and write its body.
fn write_target(target: &WriteTarget, pipeline: &ResourcePipeline) -> Result<()> {
    let response = pipeline.resolve_resource(&target.url, None, true)?;
    ensure!(
        response.status().is_success(),
        "`{}` resolved to status {}",
        target.url,
        response.status()
    );

    if let Some(parent) = target.output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    fs::write(&target.output_path, response.body())
        .with_context(|| format!("writing {}", target.output_path.display()))
}

// ============================================================================
// Copy Phase
// ============================================================================

/// Instantiate copy plugins and perform their copies, in declaration order.
fn run_copy_plugins(compilation: &Arc<Compilation>, registry: &PluginRegistry) -> Result<()> {
    for entry in registry.copies() {
        let copies = (entry.capability)(compilation)
            .with_context(|| format!("copy plugin `{}` failed", entry.name))?;
        for copy in copies {
            copy_path(&copy.from, &copy.to).with_context(|| {
                format!(
                    "copy plugin `{}`: {} -> {}",
                    entry.name,
                    copy.from.display(),
                    copy.to.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Copy a file, or a directory tree recursively.
fn copy_path(from: &Path, to: &Path) -> Result<()> {
    if from.is_file() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if IGNORED_FILES.contains(&name) {
            continue;
        }
        let destination = to.join(entry.path().strip_prefix(from)?);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &destination)?;
    }
    Ok(())
}

// ============================================================================
// Manifest and Run Data
// ============================================================================

/// Collect the deployment manifest: API routes found under the apis
/// directory, plus the routes that stay server-rendered.
fn collect_manifest(compilation: &Compilation, prerender: bool) -> Result<Manifest> {
    let mut manifest = Manifest::default();

    for page in &compilation.graph {
        if page.is_ssr && !prerender {
            manifest.ssr_pages.push(page.route.clone());
        }
    }

    let apis_dir = &compilation.context.apis_dir;
    if !apis_dir.is_dir() {
        return Ok(manifest);
    }
    for entry in WalkDir::new(apis_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_str().unwrap_or_default();
        if IGNORED_FILES.contains(&name) {
            continue;
        }
        let relative = entry.path().strip_prefix(apis_dir)?;
        let Some(route) = api_route_for(relative) else {
            log!("build"; "skipping API entry with non-unicode name: {}", entry.path().display());
            continue;
        };
        manifest.apis.insert(route, Path::new("api").join(relative));
    }
    Ok(manifest)
}

/// API route for an entry file path relative to the apis directory:
/// `search.js` becomes `/api/search`.
fn api_route_for(relative: &Path) -> Option<String> {
    let stem = relative.with_extension("");
    let joined = stem.to_str()?.replace(std::path::MAIN_SEPARATOR, "/");
    Some(format!("/api/{joined}"))
}

/// Copy each API entry file to its manifest location under the output
/// directory.
fn copy_api_entries(compilation: &Compilation, manifest: &Manifest) -> Result<()> {
    for destination in manifest.apis.values() {
        let relative = destination.strip_prefix("api")?;
        let from = compilation.context.apis_dir.join(relative);
        let to = compilation.context.output_dir.join(destination);
        copy_path(&from, &to)
            .with_context(|| format!("copying API entry {}", from.display()))?;
    }
    Ok(())
}

/// Serialize the graph and manifest for external tools.
fn write_run_data(compilation: &Compilation, manifest: &Manifest) -> Result<()> {
    let data_dir = &compilation.context.data_dir;
    fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    fs::write(
        data_dir.join("graph.json"),
        serde_json::to_vec_pretty(&compilation.graph)?,
    )?;
    fs::write(
        data_dir.join("manifest.json"),
        serde_json::to_vec_pretty(manifest)?,
    )?;
    Ok(())
}

/// Log build result based on output directory contents
fn log_build_result(output: &Path) -> Result<()> {
    let file_count = fs::read_dir(output)?.filter_map(Result::ok).count();

    if file_count == 0 {
        log!("warn"; "output is empty, check the pages directory");
    } else {
        log!("build"; "done");
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
