//! Built-in plugins registered ahead of user declarations.
//!
//! Three plugins ship with every run:
//!
//! | name                   | kind     | what it does                         |
//! |------------------------|----------|--------------------------------------|
//! | `standard-font`        | resource | font files with real font MIME types |
//! | `standard-optimize`    | resource | minifies HTML output during builds   |
//! | `standard-copy-assets` | copy     | copies `assets/` verbatim at build   |

use crate::compilation::ASSETS_DIR_NAME;
use crate::config::Optimization;
use crate::plugins::{
    CopyEntry, PluginDeclaration, PluginSet, ResourceCapability, Response, build_response,
    with_body,
};
use anyhow::Context;
use http::{StatusCode, header};
use std::{fs, sync::Arc};
use url::Url;

/// Extensions the font plugin claims, in no particular order.
const FONT_EXTENSIONS: [&str; 4] = ["woff2", "woff", "ttf", "eot"];

/// The standard plugin set, in registration order.
pub fn standard_plugins() -> Vec<PluginSet> {
    vec![
        PluginSet::One(PluginDeclaration::resource("standard-font", |_| {
            ResourceCapability::new().serving(
                |url| Ok(claims_font(url)),
                |url| {
                    let path = url
                        .to_file_path()
                        .ok()
                        .context("font URL has no filesystem path")?;
                    let body = fs::read(&path)
                        .with_context(|| format!("reading font file {}", path.display()))?;
                    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                    Ok(build_response(
                        StatusCode::OK,
                        font_content_type(extension),
                        body,
                    ))
                },
            )
        })),
        PluginSet::One(PluginDeclaration::resource("standard-optimize", |compilation| {
            let compilation = Arc::clone(compilation);
            ResourceCapability::new().optimizing(
                move |_, response| {
                    if compilation.config.build.optimization == Optimization::None {
                        return Ok(false);
                    }
                    Ok(is_html(response))
                },
                |_, response| {
                    let mut cfg = minify_html::Cfg::new();
                    cfg.keep_closing_tags = true;
                    cfg.keep_html_and_head_opening_tags = true;
                    cfg.keep_comments = false;
                    cfg.minify_css = true;
                    cfg.minify_js = true;
                    cfg.remove_bangs = true;
                    cfg.remove_processing_instructions = true;
                    let minified = minify_html::minify(response.body(), &cfg);
                    Ok(with_body(response, minified))
                },
            )
        })),
        PluginSet::One(PluginDeclaration::copy("standard-copy-assets", |compilation| {
            let assets = compilation.context.user_workspace.join(ASSETS_DIR_NAME);
            if !assets.is_dir() {
                return Ok(Vec::new());
            }
            Ok(vec![CopyEntry {
                from: assets,
                to: compilation.context.output_dir.join(ASSETS_DIR_NAME),
            }])
        })),
    ]
}

/// A `file:` URL whose extension is a known font format and whose file
/// exists. Missing fonts fall through to the shared 404 path.
fn claims_font(url: &Url) -> bool {
    if url.scheme() != "file" {
        return false;
    }
    let Ok(path) = url.to_file_path() else {
        return false;
    };
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    FONT_EXTENSIONS.contains(&extension) && path.is_file()
}

fn font_content_type(extension: &str) -> &'static str {
    match extension {
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}

// ============================================================================
// Tests
// ============================================================================
