//! The resource interception pipeline.
//!
//! One URL in, one response out. Dispatch walks five ordered stages, each a
//! predicate/action pair a resource plugin may opt into:
//!
//! ```text
//! Resolve ──▶ Serve ──▶ Pre-intercept ──▶ Intercept ──▶ Optimize
//! (Request)  (Response)  (first match)    (cumulative)  (build only)
//! ```
//!
//! Every stage except Intercept is first-match-wins in registration order;
//! Intercept chains every matching plugin over the current response. A
//! stage nobody claims passes its input through unchanged, and an
//! unclaimed Serve falls back to a direct filesystem fetch for `file:`
//! URLs.
//!
//! The pipeline holds no per-request state and never branches on which
//! driver is calling; build mode differs only by the explicit `optimize`
//! parameter. That keeps dev responses and build output byte-identical for
//! resources without build-only treatment, and makes invocations safe to
//! run concurrently.

use crate::plugins::registry::PluginRegistry;
use crate::plugins::{Request, Response, build_response};
use http::{Method, StatusCode};
use std::{fmt, fs, path::Path, sync::Arc};
use thiserror::Error;
use url::Url;

// ============================================================================
// Stages and Errors
// ============================================================================

/// Pipeline stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Serve,
    PreIntercept,
    Intercept,
    Optimize,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Serve => "serve",
            Self::PreIntercept => "pre-intercept",
            Self::Intercept => "intercept",
            Self::Optimize => "optimize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by pipeline dispatch, attributed to the plugin and
/// stage that produced them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A predicate or action failed while handling a URL.
    #[error("plugin `{plugin}` failed during {stage}")]
    Resolution {
        plugin: String,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// A predicate matched, but the paired action slot is empty.
    #[error("plugin `{plugin}` matched {stage} but declares no action for it")]
    ContractViolation { plugin: String, stage: Stage },

    /// The default filesystem fetch failed on an existing file.
    #[error("cannot fetch `{url}`")]
    Fetch {
        url: Url,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    fn contract(plugin: &str, stage: Stage) -> Self {
        Self::ContractViolation {
            plugin: plugin.to_string(),
            stage,
        }
    }
}

/// Attribute a plugin callback result to its plugin and stage.
fn attribute<T>(
    result: anyhow::Result<T>,
    plugin: &str,
    stage: Stage,
) -> Result<T, PipelineError> {
    result.map_err(|source| PipelineError::Resolution {
        plugin: plugin.to_string(),
        stage,
        source,
    })
}

// ============================================================================
// Pipeline
// ============================================================================

/// Stage dispatcher over the registered resource plugins.
pub struct ResourcePipeline {
    registry: Arc<PluginRegistry>,
}

impl ResourcePipeline {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Run one URL through the pipeline.
    ///
    /// `request` is the inbound request when a live socket is driving the
    /// pipeline; resolve-stage plugins may still replace it. `optimize`
    /// enables the optimize stage and is set only by the build driver.
    pub fn resolve_resource(
        &self,
        url: &Url,
        request: Option<Request>,
        optimize: bool,
    ) -> Result<Response, PipelineError> {
        let request = self.resolve_stage(url, request)?;
        let response = self.serve_stage(url)?;
        let response = self.pre_intercept_stage(url, &request, response)?;
        let response = self.intercept_stage(url, &request, response)?;
        if optimize {
            self.optimize_stage(url, response)
        } else {
            Ok(response)
        }
    }

    fn resolve_stage(
        &self,
        url: &Url,
        incoming: Option<Request>,
    ) -> Result<Request, PipelineError> {
        for entry in self.registry.resources() {
            let Some(predicate) = &entry.capability.should_resolve else {
                continue;
            };
            if !attribute(predicate(url), &entry.name, Stage::Resolve)? {
                continue;
            }
            let Some(action) = &entry.capability.resolve else {
                return Err(PipelineError::contract(&entry.name, Stage::Resolve));
            };
            return attribute(action(url), &entry.name, Stage::Resolve);
        }
        Ok(incoming.unwrap_or_else(|| default_request(url)))
    }

    fn serve_stage(&self, url: &Url) -> Result<Response, PipelineError> {
        for entry in self.registry.resources() {
            let Some(predicate) = &entry.capability.should_serve else {
                continue;
            };
            if !attribute(predicate(url), &entry.name, Stage::Serve)? {
                continue;
            }
            let Some(action) = &entry.capability.serve else {
                return Err(PipelineError::contract(&entry.name, Stage::Serve));
            };
            return attribute(action(url), &entry.name, Stage::Serve);
        }
        default_serve(url)
    }

    fn pre_intercept_stage(
        &self,
        url: &Url,
        request: &Request,
        response: Response,
    ) -> Result<Response, PipelineError> {
        for entry in self.registry.resources() {
            let Some(predicate) = &entry.capability.should_pre_intercept else {
                continue;
            };
            if !attribute(predicate(url, request, &response), &entry.name, Stage::PreIntercept)? {
                continue;
            }
            let Some(action) = &entry.capability.pre_intercept else {
                return Err(PipelineError::contract(&entry.name, Stage::PreIntercept));
            };
            return attribute(action(url, request, response), &entry.name, Stage::PreIntercept);
        }
        Ok(response)
    }

    fn intercept_stage(
        &self,
        url: &Url,
        request: &Request,
        mut response: Response,
    ) -> Result<Response, PipelineError> {
        for entry in self.registry.resources() {
            let Some(predicate) = &entry.capability.should_intercept else {
                continue;
            };
            if !attribute(predicate(url, request, &response), &entry.name, Stage::Intercept)? {
                continue;
            }
            let Some(action) = &entry.capability.intercept else {
                return Err(PipelineError::contract(&entry.name, Stage::Intercept));
            };
            response = attribute(action(url, request, response), &entry.name, Stage::Intercept)?;
        }
        Ok(response)
    }

    fn optimize_stage(&self, url: &Url, response: Response) -> Result<Response, PipelineError> {
        for entry in self.registry.resources() {
            let Some(predicate) = &entry.capability.should_optimize else {
                continue;
            };
            if !attribute(predicate(url, &response), &entry.name, Stage::Optimize)? {
                continue;
            }
            let Some(action) = &entry.capability.optimize else {
                return Err(PipelineError::contract(&entry.name, Stage::Optimize));
            };
            return attribute(action(url, response), &entry.name, Stage::Optimize);
        }
        Ok(response)
    }
}

// ============================================================================
// Stage Defaults
// ============================================================================

/// Request used when no resolve plugin claims the URL and no inbound
/// request exists (build mode, or internal resolution).
fn default_request(url: &Url) -> Request {
    http::Request::builder()
        .method(Method::GET)
        .uri(url.path())
        .body(Vec::new())
        .unwrap_or_else(|_| Request::new(Vec::new()))
}

/// Direct filesystem fetch: the serve-stage fallback.
///
/// Existing files are read whole with a content type guessed from the
/// extension; everything else is a plain 404 response, not an error.
fn default_serve(url: &Url) -> Result<Response, PipelineError> {
    if url.scheme() == "file"
        && let Ok(path) = url.to_file_path()
        && path.is_file()
    {
        let body = fs::read(&path).map_err(|source| PipelineError::Fetch {
            url: url.clone(),
            source,
        })?;
        return Ok(build_response(
            StatusCode::OK,
            content_type_for(&path),
            body,
        ));
    }

    Ok(build_response(
        StatusCode::NOT_FOUND,
        "text/plain",
        b"404 Not Found".to_vec(),
    ))
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::{Compilation, CompilationContext, file_url};
    use crate::config::SiteConfig;
    use crate::plugins::{
        PluginDeclaration, PluginSet, ResourceCapability, build_response, with_body,
    };
    use http::header;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn test_compilation(tmp: &TempDir) -> Arc<Compilation> {
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        let mut config = SiteConfig::default();
        config.set_root(tmp.path());
        let context = CompilationContext::resolve(&config).unwrap();
        Arc::new(Compilation::seed(context, config))
    }

    fn pipeline_with(tmp: &TempDir, sets: Vec<PluginSet>) -> ResourcePipeline {
        let compilation = test_compilation(tmp);
        let registry = PluginRegistry::new(sets, &compilation).unwrap();
        ResourcePipeline::new(Arc::new(registry))
    }

    fn resource(name: &str, capability_for: impl Fn() -> ResourceCapability + Send + Sync + 'static) -> PluginSet {
        PluginSet::One(PluginDeclaration::resource(name.to_string(), move |_| {
            capability_for()
        }))
    }

    fn html_response(body: &str) -> Response {
        build_response(StatusCode::OK, "text/html", body.as_bytes().to_vec())
    }

    fn body_text(response: &Response) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    fn test_url() -> Url {
        Url::parse("file:///site/src/pages/index.html").unwrap()
    }

    #[test]
    fn test_serve_is_first_match_wins() {
        let tmp = TempDir::new().unwrap();
        let second_consulted = Arc::new(AtomicBool::new(false));
        let consulted = Arc::clone(&second_consulted);

        let pipeline = pipeline_with(
            &tmp,
            vec![
                resource("first", || {
                    ResourceCapability::new()
                        .serving(|_| Ok(true), |_| Ok(html_response("from first")))
                }),
                PluginSet::One(PluginDeclaration::resource("second", move |_| {
                    let consulted = Arc::clone(&consulted);
                    ResourceCapability::new().serving(
                        move |_| {
                            consulted.store(true, Ordering::SeqCst);
                            Ok(true)
                        },
                        |_| Ok(html_response("from second")),
                    )
                })),
            ],
        );

        let response = pipeline
            .resolve_resource(&test_url(), None, false)
            .unwrap();
        assert_eq!(body_text(&response), "from first");
        assert!(!second_consulted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_intercept_is_cumulative_in_registration_order() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(
            &tmp,
            vec![
                resource("page", || {
                    ResourceCapability::new().serving(
                        |_| Ok(true),
                        |_| Ok(html_response("<html><head></head><body>Hello World</body></html>")),
                    )
                }),
                resource("banner", || {
                    ResourceCapability::new().intercepting(
                        |_, _, _| Ok(true),
                        |_, _, response| {
                            let body = body_text(&response)
                                .replace("<head>", "<head><meta name=\"BANNER\">");
                            Ok(with_body(response, body.into_bytes()))
                        },
                    )
                }),
                resource("lowercase", || {
                    ResourceCapability::new().intercepting(
                        |_, _, _| Ok(true),
                        |_, _, response| {
                            let body = body_text(&response).to_lowercase();
                            Ok(with_body(response, body.into_bytes()))
                        },
                    )
                }),
            ],
        );

        let response = pipeline
            .resolve_resource(&test_url(), None, false)
            .unwrap();
        let body = body_text(&response);
        // The banner was injected first, then lowercased by the later plugin
        assert!(body.contains("<meta name=\"banner\">"));
        assert!(!body.contains("BANNER"));
        assert!(body.contains("hello world"));
    }

    #[test]
    fn test_pre_intercept_is_first_match_only() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(
            &tmp,
            vec![
                resource("page", || {
                    ResourceCapability::new()
                        .serving(|_| Ok(true), |_| Ok(html_response("base")))
                }),
                resource("pre-a", || {
                    ResourceCapability::new().pre_intercepting(
                        |_, _, _| Ok(true),
                        |_, _, response| Ok(with_body(response, b"pre-a".to_vec())),
                    )
                }),
                resource("pre-b", || {
                    ResourceCapability::new().pre_intercepting(
                        |_, _, _| Ok(true),
                        |_, _, response| Ok(with_body(response, b"pre-b".to_vec())),
                    )
                }),
            ],
        );

        let response = pipeline
            .resolve_resource(&test_url(), None, false)
            .unwrap();
        assert_eq!(body_text(&response), "pre-a");
    }

    #[test]
    fn test_resolved_request_reaches_intercept() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(
            &tmp,
            vec![
                resource("virtual", || {
                    ResourceCapability::new().resolving(
                        |_| Ok(true),
                        |url| {
                            let request = http::Request::builder()
                                .method(Method::GET)
                                .uri(url.path())
                                .header("x-virtual", "1")
                                .body(Vec::new())?;
                            Ok(request)
                        },
                    )
                }),
                resource("page", || {
                    ResourceCapability::new()
                        .serving(|_| Ok(true), |_| Ok(html_response("base")))
                }),
                resource("marker", || {
                    ResourceCapability::new().intercepting(
                        |_, request, _| Ok(request.headers().contains_key("x-virtual")),
                        |_, _, response| Ok(with_body(response, b"virtual".to_vec())),
                    )
                }),
            ],
        );

        let response = pipeline
            .resolve_resource(&test_url(), None, false)
            .unwrap();
        assert_eq!(body_text(&response), "virtual");
    }

    #[test]
    fn test_inbound_request_passes_through_unclaimed_resolve() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(
            &tmp,
            vec![
                resource("page", || {
                    ResourceCapability::new()
                        .serving(|_| Ok(true), |_| Ok(html_response("base")))
                }),
                resource("marker", || {
                    ResourceCapability::new().intercepting(
                        |_, request, _| Ok(request.headers().contains_key("x-inbound")),
                        |_, _, response| Ok(with_body(response, b"inbound".to_vec())),
                    )
                }),
            ],
        );

        let inbound = http::Request::builder()
            .method(Method::GET)
            .uri("/")
            .header("x-inbound", "yes")
            .body(Vec::new())
            .unwrap();
        let response = pipeline
            .resolve_resource(&test_url(), Some(inbound), false)
            .unwrap();
        assert_eq!(body_text(&response), "inbound");
    }

    #[test]
    fn test_optimize_runs_only_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let make = || {
            ResourceCapability::new()
                .serving(|_| Ok(true), |_| Ok(html_response("payload")))
                .optimizing(
                    |_, _| Ok(true),
                    |_, response| Ok(with_body(response, b"PAYLOAD".to_vec())),
                )
        };
        let pipeline = pipeline_with(&tmp, vec![resource("opt", make)]);

        let dev = pipeline.resolve_resource(&test_url(), None, false).unwrap();
        assert_eq!(body_text(&dev), "payload");

        let build = pipeline.resolve_resource(&test_url(), None, true).unwrap();
        assert_eq!(body_text(&build), "PAYLOAD");
    }

    #[test]
    fn test_should_optimize_without_action_is_contract_violation() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(
            &tmp,
            vec![
                resource("page", || {
                    ResourceCapability::new()
                        .serving(|_| Ok(true), |_| Ok(html_response("base")))
                }),
                resource("half-baked", || {
                    let mut capability = ResourceCapability::new();
                    capability.should_optimize = Some(Box::new(|_, _| Ok(true)));
                    capability
                }),
            ],
        );

        // Dev mode never consults optimize slots, so the violation stays dormant
        assert!(pipeline.resolve_resource(&test_url(), None, false).is_ok());

        let err = pipeline
            .resolve_resource(&test_url(), None, true)
            .unwrap_err();
        match err {
            PipelineError::ContractViolation { plugin, stage } => {
                assert_eq!(plugin, "half-baked");
                assert_eq!(stage, Stage::Optimize);
            }
            other => panic!("expected contract violation, got {other}"),
        }
    }

    #[test]
    fn test_predicate_error_is_attributed() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(
            &tmp,
            vec![resource("flaky", || {
                ResourceCapability::new().serving(
                    |_| anyhow::bail!("predicate exploded"),
                    |_| Ok(html_response("unreached")),
                )
            })],
        );

        let err = pipeline
            .resolve_resource(&test_url(), None, false)
            .unwrap_err();
        match err {
            PipelineError::Resolution { plugin, stage, .. } => {
                assert_eq!(plugin, "flaky");
                assert_eq!(stage, Stage::Serve);
            }
            other => panic!("expected resolution error, got {other}"),
        }
    }

    #[test]
    fn test_action_error_is_attributed() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(
            &tmp,
            vec![resource("dies", || {
                ResourceCapability::new()
                    .serving(|_| Ok(true), |_| anyhow::bail!("disk on fire"))
            })],
        );

        let err = pipeline
            .resolve_resource(&test_url(), None, false)
            .unwrap_err();
        match err {
            PipelineError::Resolution { plugin, stage, source } => {
                assert_eq!(plugin, "dies");
                assert_eq!(stage, Stage::Serve);
                assert!(source.to_string().contains("disk on fire"));
            }
            other => panic!("expected resolution error, got {other}"),
        }
    }

    #[test]
    fn test_default_serve_reads_existing_file() {
        let tmp = TempDir::new().unwrap();
        let css = tmp.path().join("src/theme.css");
        fs::create_dir_all(css.parent().unwrap()).unwrap();
        fs::write(&css, "body { margin: 0 }").unwrap();

        let pipeline = pipeline_with(&tmp, Vec::new());
        let url = file_url(&css).unwrap();
        let response = pipeline.resolve_resource(&url, None, false).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/css; charset=utf-8"
        );
        assert_eq!(body_text(&response), "body { margin: 0 }");
    }

    #[test]
    fn test_default_serve_missing_file_is_404() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline_with(&tmp, Vec::new());

        let url = file_url(&tmp.path().join("src/missing.css")).unwrap();
        let response = pipeline.resolve_resource(&url, None, false).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_repeat_invocations_are_identical() {
        let tmp = TempDir::new().unwrap();
        let html = tmp.path().join("src/page.html");
        fs::create_dir_all(html.parent().unwrap()).unwrap();
        fs::write(&html, "<p>stable</p>").unwrap();

        let pipeline = pipeline_with(
            &tmp,
            vec![resource("stamp", || {
                ResourceCapability::new().intercepting(
                    |_, _, _| Ok(true),
                    |_, _, response| {
                        let body = format!("<!-- stamped -->{}", body_text(&response));
                        Ok(with_body(response, body.into_bytes()))
                    },
                )
            })],
        );

        let url = file_url(&html).unwrap();
        let first = pipeline.resolve_resource(&url, None, true).unwrap();
        let second = pipeline.resolve_resource(&url, None, true).unwrap();
        assert_eq!(first.body(), second.body());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(
            content_type_for(Path::new("a.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_for(Path::new("a.woff2")), "font/woff2");
        assert_eq!(content_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(
            content_type_for(Path::new("a.unknown")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(Path::new("no_extension")),
            "application/octet-stream"
        );
    }
}
