//! Development server.
//!
//! A lightweight HTTP server built on `tiny_http` that answers every
//! request by running it through the resource pipeline, which is the same
//! resolution the static build serializes to disk:
//!
//! ```text
//! ┌──────────────────┐       ┌─────────────────────────┐
//! │  Worker Threads  │ ────▶ │   Resource Pipeline     │
//! │   (tiny_http)    │       │  resolve ... intercept  │
//! └────────┬─────────┘       └────────────┬────────────┘
//!          │                              │
//!          ▼                              ▼
//!    request path  ────▶  workspace URL  ────▶  response
//! ```
//!
//! Requests are answered from the live workspace, so edits show up on the
//! next request without a rebuild step. A failed request answers 500 and
//! logs the error; the listener itself only stops on Ctrl+C.

use crate::{
    compilation::Compilation,
    log,
    pipeline::ResourcePipeline,
    plugins::{Request, Response, ServerHooks, registry::PluginRegistry},
};
use anyhow::{Context, Result};
use http::header::{HeaderName, HeaderValue};
use std::{io::Cursor, net::SocketAddr, sync::Arc, thread};
use tiny_http::{Header, Server, StatusCode};

// ============================================================================
// Constants
// ============================================================================

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// Threads sharing the accept loop
const WORKER_COUNT: usize = 4;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the development server.
///
/// This function:
/// 1. Binds to the configured host and port (with auto-retry on port conflict)
/// 2. Instantiates server plugins and runs their `start` hooks
/// 3. Sets up Ctrl+C handler for graceful shutdown
/// 4. Answers requests on a small worker pool until shutdown
///
/// The server blocks until Ctrl+C is received, then runs the server
/// plugins' `stop` hooks.
pub fn serve_site(compilation: Arc<Compilation>, registry: Arc<PluginRegistry>) -> Result<()> {
    let interface: std::net::IpAddr = compilation.config.dev_server.host.parse()?;
    let base_port = compilation.config.dev_server.port;

    let (server, addr) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Server plugins come alive once the socket is bound
    let mut hooks: Vec<(String, ServerHooks)> = Vec::new();
    for entry in registry.servers() {
        hooks.push((entry.name.clone(), (entry.capability)(&compilation)));
    }
    for (name, hook) in &hooks {
        (hook.start)().with_context(|| format!("server plugin `{name}` failed to start"))?;
    }

    // Set up Ctrl+C handler for graceful shutdown; one unblock per worker
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        for _ in 0..WORKER_COUNT {
            server_for_signal.unblock();
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}{}", addr, compilation.config.build.base_path);

    let pipeline = Arc::new(ResourcePipeline::new(Arc::clone(&registry)));
    let workers: Vec<_> = (0..WORKER_COUNT)
        .map(|_| {
            let server = Arc::clone(&server);
            let pipeline = Arc::clone(&pipeline);
            let compilation = Arc::clone(&compilation);
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    handle_connection(&compilation, &pipeline, request);
                }
            })
        })
        .collect();

    for worker in workers {
        let _ = worker.join();
    }

    for (name, hook) in &hooks {
        if let Some(stop) = &hook.stop
            && let Err(err) = stop()
        {
            log!("error"; "server plugin `{name}` failed to stop: {err:#}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: std::net::IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < max_retries => {
                // Will retry silently
                continue;
            }
            Err(e) => {
                // Last attempt failed
                return Err(anyhow::anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    max_retries,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single connection. Errors answer 500 and never reach the
/// accept loop.
fn handle_connection(
    compilation: &Arc<Compilation>,
    pipeline: &ResourcePipeline,
    request: tiny_http::Request,
) {
    match respond_via_pipeline(compilation, pipeline, &request) {
        Ok(response) => {
            let _ = request.respond(response);
        }
        Err(err) => {
            log!("error"; "{} {}: {err:#}", request.method(), request.url());
            let _ = request.respond(internal_error_response());
        }
    }
}

/// Resolve one request through the pipeline.
fn respond_via_pipeline(
    compilation: &Arc<Compilation>,
    pipeline: &ResourcePipeline,
    request: &tiny_http::Request,
) -> Result<tiny_http::Response<Cursor<Vec<u8>>>> {
    // Decode URL-encoded characters (e.g., %20 → space)
    let url_path = urlencoding::decode(request.url())
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();

    // Strip query string (e.g., ?t=123456) before resolving the path
    let path_without_query = url_path.split('?').next().unwrap_or(&url_path);

    let base_path = &compilation.config.build.base_path;
    let Some(site_path) = strip_base_path(path_without_query, base_path) else {
        return Ok(not_found_response());
    };

    let url = compilation.url_for_path(&site_path)?;
    let inbound = inbound_request(request);
    let response = pipeline.resolve_resource(&url, Some(inbound), false)?;
    Ok(to_socket_response(response))
}

/// Remove the configured base path prefix. `None` means the request falls
/// outside the site root.
fn strip_base_path(path: &str, base_path: &str) -> Option<String> {
    if base_path.is_empty() {
        return Some(path.to_string());
    }
    let stripped = path.strip_prefix(base_path)?;
    if stripped.is_empty() {
        return Some("/".to_string());
    }
    stripped.starts_with('/').then(|| stripped.to_string())
}

// ============================================================================
// Request/Response Conversion
// ============================================================================

/// Express the socket request in the pipeline's request type. Headers that
/// are not valid HTTP are dropped rather than failing the request.
fn inbound_request(request: &tiny_http::Request) -> Request {
    let method = http::Method::from_bytes(request.method().as_str().as_bytes())
        .unwrap_or(http::Method::GET);

    let mut builder = http::Request::builder().method(method).uri(request.url());
    if let Some(headers) = builder.headers_mut() {
        for header in request.headers() {
            let name = HeaderName::from_bytes(header.field.as_str().as_bytes()).ok();
            let value = HeaderValue::from_bytes(header.value.as_bytes()).ok();
            if let (Some(name), Some(value)) = (name, value) {
                headers.append(name, value);
            }
        }
    }

    builder
        .body(Vec::new())
        .unwrap_or_else(|_| Request::new(Vec::new()))
}

/// Express a pipeline response as a socket response.
fn to_socket_response(response: Response) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let status = StatusCode(response.status().as_u16());
    let headers: Vec<Header> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            Header::from_bytes(name.as_str().as_bytes(), value.as_bytes()).ok()
        })
        .collect();

    let body = response.into_body();
    let length = body.len();
    tiny_http::Response::new(status, headers, Cursor::new(body), Some(length), None)
}

fn not_found_response() -> tiny_http::Response<Cursor<Vec<u8>>> {
    plain_response(StatusCode(404), "404 Not Found")
}

fn internal_error_response() -> tiny_http::Response<Cursor<Vec<u8>>> {
    plain_response(StatusCode(500), "500 Internal Server Error")
}

fn plain_response(status: StatusCode, body: &str) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let body = body.as_bytes().to_vec();
    let length = body.len();
    tiny_http::Response::new(
        status,
        vec![Header::from_bytes("Content-Type", "text/plain").unwrap()],
        Cursor::new(body),
        Some(length),
        None,
    )
}

// ============================================================================
// Tests
// ============================================================================
