//! Plugin contract: kinds, capability shapes, and declarations.
//!
//! Plugins are declared as ordered `PluginSet`s and instantiated against the
//! shared compilation by the registry. Declaration order is the only
//! ordering the engine ever uses.
//!
//! | Kind       | Capability            | Instantiated                  |
//! |------------|-----------------------|-------------------------------|
//! | `source`   | extra graph pages     | during graph construction     |
//! | `resource` | pipeline stage slots  | at registry construction      |
//! | `renderer` | server route renderer | at registry construction      |
//! | `context`  | layout directories    | at registry construction      |
//! | `copy`     | copy entries          | during the build copy phase   |
//! | `rollup`   | bundle transforms     | at registry construction      |
//! | `server`   | start/stop hooks      | when the dev server starts    |
//! | `adapter`  | deployment step       | after the build has finished  |

use crate::compilation::{Compilation, Manifest};
use crate::graph::Page;
use anyhow::Result;
use http::{
    StatusCode,
    header::{self, HeaderValue},
};
use std::{fmt, path::PathBuf, sync::Arc};
use url::Url;

pub mod registry;
pub mod standard;

// ============================================================================
// Interchange Types
// ============================================================================

/// Request flowing through the resource pipeline. The body is raw bytes;
/// the resource identity travels separately as a URL.
pub type Request = http::Request<Vec<u8>>;

/// Response flowing through the resource pipeline.
pub type Response = http::Response<Vec<u8>>;

/// Build a response with a status and a content type header.
///
/// Invalid content type strings are skipped rather than rejected; plugins
/// only ever pass well-formed constants here.
pub fn build_response(status: StatusCode, content_type: &str, body: Vec<u8>) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

/// Replace a response body, keeping status and headers intact.
pub fn with_body(response: Response, body: Vec<u8>) -> Response {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, body)
}

// ============================================================================
// Resource Capability
// ============================================================================

/// Predicate over a resource URL.
pub type UrlPredicate = Box<dyn Fn(&Url) -> Result<bool> + Send + Sync>;

/// Produce the request for a URL (resolve stage).
pub type ResolveAction = Box<dyn Fn(&Url) -> Result<Request> + Send + Sync>;

/// Produce the response for a URL (serve stage).
pub type ServeAction = Box<dyn Fn(&Url) -> Result<Response> + Send + Sync>;

/// Predicate over an in-flight exchange (pre-intercept and intercept stages).
pub type InterceptPredicate = Box<dyn Fn(&Url, &Request, &Response) -> Result<bool> + Send + Sync>;

/// Transform a response, consuming it (pre-intercept and intercept stages).
pub type InterceptAction = Box<dyn Fn(&Url, &Request, Response) -> Result<Response> + Send + Sync>;

/// Predicate over a build-time response (optimize stage).
pub type OptimizePredicate = Box<dyn Fn(&Url, &Response) -> Result<bool> + Send + Sync>;

/// Transform a build-time response, consuming it (optimize stage).
pub type OptimizeAction = Box<dyn Fn(&Url, Response) -> Result<Response> + Send + Sync>;

/// What a resource plugin can do, one optional slot per pipeline hook.
///
/// A populated predicate promises the matching action is populated too;
/// the pipeline reports a contract violation the first time a predicate
/// matches with no action to run.
#[derive(Default)]
pub struct ResourceCapability {
    pub should_resolve: Option<UrlPredicate>,
    pub resolve: Option<ResolveAction>,
    pub should_serve: Option<UrlPredicate>,
    pub serve: Option<ServeAction>,
    pub should_pre_intercept: Option<InterceptPredicate>,
    pub pre_intercept: Option<InterceptAction>,
    pub should_intercept: Option<InterceptPredicate>,
    pub intercept: Option<InterceptAction>,
    pub should_optimize: Option<OptimizePredicate>,
    pub optimize: Option<OptimizeAction>,
}

impl ResourceCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the resolve slots.
    pub fn resolving(
        mut self,
        predicate: impl Fn(&Url) -> Result<bool> + Send + Sync + 'static,
        action: impl Fn(&Url) -> Result<Request> + Send + Sync + 'static,
    ) -> Self {
        self.should_resolve = Some(Box::new(predicate));
        self.resolve = Some(Box::new(action));
        self
    }

    /// Populate the serve slots.
    pub fn serving(
        mut self,
        predicate: impl Fn(&Url) -> Result<bool> + Send + Sync + 'static,
        action: impl Fn(&Url) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        self.should_serve = Some(Box::new(predicate));
        self.serve = Some(Box::new(action));
        self
    }

    /// Populate the pre-intercept slots.
    pub fn pre_intercepting(
        mut self,
        predicate: impl Fn(&Url, &Request, &Response) -> Result<bool> + Send + Sync + 'static,
        action: impl Fn(&Url, &Request, Response) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        self.should_pre_intercept = Some(Box::new(predicate));
        self.pre_intercept = Some(Box::new(action));
        self
    }

    /// Populate the intercept slots.
    pub fn intercepting(
        mut self,
        predicate: impl Fn(&Url, &Request, &Response) -> Result<bool> + Send + Sync + 'static,
        action: impl Fn(&Url, &Request, Response) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        self.should_intercept = Some(Box::new(predicate));
        self.intercept = Some(Box::new(action));
        self
    }

    /// Populate the optimize slots.
    pub fn optimizing(
        mut self,
        predicate: impl Fn(&Url, &Response) -> Result<bool> + Send + Sync + 'static,
        action: impl Fn(&Url, Response) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        self.should_optimize = Some(Box::new(predicate));
        self.optimize = Some(Box::new(action));
        self
    }
}

// ============================================================================
// Other Capabilities
// ============================================================================

/// Render a server-routed page to HTML.
pub type RenderFn = Box<dyn Fn(&Page) -> Result<String> + Send + Sync>;

/// What a renderer plugin provides: the renderer used to pre-render
/// server routes at build time.
pub struct RendererCapability {
    pub render: RenderFn,
}

/// Layout directories a context plugin contributes. Earlier directories
/// win when layout names collide.
pub struct ContextCapability {
    pub layouts: Vec<PathBuf>,
}

/// One filesystem copy the build performs after pipeline output is
/// written. Directories are copied recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEntry {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Rewrite the text content of a bundled asset. `None` leaves the
/// content unchanged.
pub type RewriteFn = Box<dyn Fn(&str, &Url) -> Result<Option<String>> + Send + Sync>;

/// A named content transform contributed by a rollup plugin, applied to
/// workspace scripts and styles during build staging.
pub struct BundleTransform {
    pub name: String,
    pub rewrite: RewriteFn,
}

/// Side-channel lifecycle hook.
pub type LifecycleFn = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// What a server plugin provides: hooks run around the dev server's
/// lifetime.
pub struct ServerHooks {
    pub start: LifecycleFn,
    pub stop: Option<LifecycleFn>,
}

/// A prepared deployment step, run once after the build.
pub type AdapterFn = Box<dyn FnOnce() -> Result<()> + Send>;

// ============================================================================
// Providers and Declarations
// ============================================================================

pub type SourceProvider = Box<dyn Fn(&Arc<Compilation>) -> Result<Vec<Page>> + Send + Sync>;
pub type ResourceProvider = Box<dyn Fn(&Arc<Compilation>) -> ResourceCapability + Send + Sync>;
pub type RendererProvider = Box<dyn Fn(&Arc<Compilation>) -> RendererCapability + Send + Sync>;
pub type ContextProvider = Box<dyn Fn(&Arc<Compilation>) -> ContextCapability + Send + Sync>;
pub type CopyProvider = Box<dyn Fn(&Arc<Compilation>) -> Result<Vec<CopyEntry>> + Send + Sync>;
pub type RollupProvider = Box<dyn Fn(&Arc<Compilation>) -> Vec<BundleTransform> + Send + Sync>;
pub type ServerProvider = Box<dyn Fn(&Arc<Compilation>) -> ServerHooks + Send + Sync>;
pub type AdapterProvider =
    Box<dyn Fn(&Arc<Compilation>, &Manifest) -> Result<AdapterFn> + Send + Sync>;

/// The closed set of plugin kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Source,
    Resource,
    Renderer,
    Context,
    Copy,
    Rollup,
    Server,
    Adapter,
}

impl PluginKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Resource => "resource",
            Self::Renderer => "renderer",
            Self::Context => "context",
            Self::Copy => "copy",
            Self::Rollup => "rollup",
            Self::Server => "server",
            Self::Adapter => "adapter",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider for one plugin kind. Invoked once per declaration per run, at
/// the point in the lifecycle the kind calls for.
pub enum PluginProvider {
    Source(SourceProvider),
    Resource(ResourceProvider),
    Renderer(RendererProvider),
    Context(ContextProvider),
    Copy(CopyProvider),
    Rollup(RollupProvider),
    Server(ServerProvider),
    Adapter(AdapterProvider),
}

impl PluginProvider {
    pub const fn kind(&self) -> PluginKind {
        match self {
            Self::Source(_) => PluginKind::Source,
            Self::Resource(_) => PluginKind::Resource,
            Self::Renderer(_) => PluginKind::Renderer,
            Self::Context(_) => PluginKind::Context,
            Self::Copy(_) => PluginKind::Copy,
            Self::Rollup(_) => PluginKind::Rollup,
            Self::Server(_) => PluginKind::Server,
            Self::Adapter(_) => PluginKind::Adapter,
        }
    }
}

/// A named plugin of one kind.
pub struct PluginDeclaration {
    pub name: String,
    pub provider: PluginProvider,
}

impl PluginDeclaration {
    pub fn source(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>) -> Result<Vec<Page>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Source(Box::new(provider)),
        }
    }

    pub fn resource(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>) -> ResourceCapability + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Resource(Box::new(provider)),
        }
    }

    pub fn renderer(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>) -> RendererCapability + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Renderer(Box::new(provider)),
        }
    }

    pub fn context(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>) -> ContextCapability + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Context(Box::new(provider)),
        }
    }

    pub fn copy(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>) -> Result<Vec<CopyEntry>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Copy(Box::new(provider)),
        }
    }

    pub fn rollup(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>) -> Vec<BundleTransform> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Rollup(Box::new(provider)),
        }
    }

    pub fn server(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>) -> ServerHooks + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Server(Box::new(provider)),
        }
    }

    pub fn adapter(
        name: impl Into<String>,
        provider: impl Fn(&Arc<Compilation>, &Manifest) -> Result<AdapterFn> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: PluginProvider::Adapter(Box::new(provider)),
        }
    }
}

/// One configured plugin slot: a single declaration, or a group that
/// expands in place.
pub enum PluginSet {
    One(PluginDeclaration),
    Many(Vec<PluginDeclaration>),
}

/// Iterate declarations in configuration order, expanding groups in place.
pub fn flatten(sets: &[PluginSet]) -> impl Iterator<Item = &PluginDeclaration> {
    sets.iter().flat_map(|set| match set {
        PluginSet::One(declaration) => std::slice::from_ref(declaration).iter(),
        PluginSet::Many(declarations) => declarations.iter(),
    })
}

// ============================================================================
// Tests
// ============================================================================
