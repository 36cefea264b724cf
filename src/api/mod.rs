// src/api/mod.rs

//! JSON-over-HTTP control API consumed by the admin shell.
//!
//! Routing is a plain match over path segments; [`route`] is free of any
//! socket handling so tests can drive it directly. [`serve`] is the blocking
//! accept loop around it.
//!
//! Error envelope is `{"error": "..."}` with a non-2xx status; successful
//! deletes answer `204 No Content`.

use std::io::Read;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::ServerSection;
use crate::errors::{ProcdagError, Result};
use crate::flow::{NodeRunner, WorkflowExecutor};
use crate::graph::GraphStore;
use crate::runner::ProcessBackend;
use crate::service::ServiceRegistry;

pub mod graphs;
pub mod schema;
pub mod services;

/// Everything the handlers need, shared across requests.
pub struct AppState<B, R: NodeRunner> {
    pub registry: ServiceRegistry<B>,
    pub graphs: Arc<dyn GraphStore>,
    pub executor: WorkflowExecutor<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
    Options,
}

impl ApiMethod {
    fn from_http(method: &tiny_http::Method) -> Option<Self> {
        match method {
            tiny_http::Method::Get => Some(Self::Get),
            tiny_http::Method::Post => Some(Self::Post),
            tiny_http::Method::Put => Some(Self::Put),
            tiny_http::Method::Delete => Some(Self::Delete),
            tiny_http::Method::Options => Some(Self::Options),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status_code: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status_code: u16, value: &T) -> Self {
        match serde_json::to_vec_pretty(value) {
            Ok(body) => Self {
                status_code,
                content_type: "application/json",
                body,
            },
            Err(err) => Self {
                status_code: 500,
                content_type: "text/plain",
                body: format!("serializing response: {err}\n").into_bytes(),
            },
        }
    }

    pub fn no_content() -> Self {
        Self {
            status_code: 204,
            content_type: "application/json",
            body: Vec::new(),
        }
    }

    pub fn error(err: &ProcdagError) -> Self {
        #[derive(Serialize)]
        struct Envelope {
            error: String,
        }
        Self::json(
            status_for(err),
            &Envelope {
                error: err.to_string(),
            },
        )
    }
}

/// HTTP status for an error. Structural errors map to client-side codes;
/// anything else is a 500.
fn status_for(err: &ProcdagError) -> u16 {
    match err {
        ProcdagError::Validation(_) | ProcdagError::Cycle { .. } => 400,
        ProcdagError::Conflict(_) => 409,
        ProcdagError::NotFound(_) => 404,
        _ => 500,
    }
}

/// Collapse a handler result into a response.
pub(crate) fn respond<T: Serialize>(status: u16, result: Result<T>) -> ApiResponse {
    match result {
        Ok(value) => ApiResponse::json(status, &value),
        Err(err) => ApiResponse::error(&err),
    }
}

/// Dispatch one API request.
pub async fn route<B, R>(
    state: &AppState<B, R>,
    method: ApiMethod,
    url: &str,
    body: Option<&[u8]>,
) -> ApiResponse
where
    B: ProcessBackend + 'static,
    R: NodeRunner + 'static,
{
    let path = url.split('?').next().unwrap_or(url);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    debug!(?method, path, "api request");

    use ApiMethod::*;

    match (method, segments.as_slice()) {
        (Get, ["api", "services"]) => ApiResponse::json(200, &services::list(state)),
        (Post, ["api", "services"]) => services::create(state, body).await,
        (Options, ["api", "services", "schema"]) => ApiResponse::json(200, &schema::service_schema()),
        (Get, ["api", "services", id]) => services::get(state, id),
        (Put, ["api", "services", id]) => services::update(state, id, body).await,
        (Delete, ["api", "services", id]) => services::delete(state, id).await,
        (Post, ["api", "services", id, "start"]) => services::start(state, id).await,
        (Post, ["api", "services", id, "stop"]) => services::stop(state, id).await,
        (Post, ["api", "services", id, "restart"]) => services::restart(state, id).await,
        (Post, ["api", "services", id, "enable"]) => services::set_enabled(state, id, true).await,
        (Post, ["api", "services", id, "disable"]) => services::set_enabled(state, id, false).await,

        (Get, ["api", "graphs"]) => ApiResponse::json(200, &graphs::list(state)),
        (Post, ["api", "graphs"]) => graphs::create(state, body),
        (Get, ["api", "graphs", id]) => graphs::get(state, id),
        (Put, ["api", "graphs", id]) => graphs::put(state, id, body),
        (Delete, ["api", "graphs", id]) => graphs::delete(state, id),
        (Post, ["api", "graphs", id, "run"]) => graphs::run(state, id),
        (Get, ["api", "graphs", id, "runs"]) => graphs::list_runs(state, id),

        (Get, ["api", "runs", id]) => graphs::get_run(state, id),
        (Post, ["api", "runs", id, "cancel"]) => graphs::cancel_run(state, id),

        // CORS preflight for anything else.
        (Options, _) => ApiResponse::no_content(),

        _ => ApiResponse::error(&ProcdagError::NotFound(format!("endpoint '{path}'"))),
    }
}

/// Parse a path segment as a service/graph/run id.
pub(crate) fn parse_id(segment: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(segment)
        .map_err(|_| ProcdagError::Validation(vec![format!("invalid id '{segment}'")]))
}

fn cors_headers() -> Vec<tiny_http::Header> {
    vec![
        tiny_http::Header::from_bytes(&b"Access-Control-Allow-Origin"[..], &b"*"[..])
            .expect("cors header"),
        tiny_http::Header::from_bytes(
            &b"Access-Control-Allow-Methods"[..],
            &b"GET, POST, PUT, DELETE, OPTIONS"[..],
        )
        .expect("cors header"),
        tiny_http::Header::from_bytes(&b"Access-Control-Allow-Headers"[..], &b"Content-Type"[..])
            .expect("cors header"),
    ]
}

/// Blocking accept loop. Runs on a plain thread; async handlers execute on
/// the runtime behind `handle`.
pub fn serve<B, R>(
    cfg: &ServerSection,
    state: AppState<B, R>,
    handle: tokio::runtime::Handle,
) -> Result<()>
where
    B: ProcessBackend + 'static,
    R: NodeRunner + 'static,
{
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let server = tiny_http::Server::http(&addr)
        .map_err(|e| ProcdagError::Config(format!("binding control API to {addr}: {e}")))?;

    info!(%addr, "control API listening");

    for mut req in server.incoming_requests() {
        let Some(method) = ApiMethod::from_http(req.method()) else {
            let _ = req.respond(tiny_http::Response::empty(405));
            continue;
        };

        let mut request_body = Vec::new();
        if matches!(method, ApiMethod::Post | ApiMethod::Put) {
            let _ = req.as_reader().read_to_end(&mut request_body);
        }

        let response = handle.block_on(route(
            &state,
            method,
            req.url(),
            if request_body.is_empty() {
                None
            } else {
                Some(request_body.as_slice())
            },
        ));

        let mut tiny = tiny_http::Response::from_data(response.body)
            .with_status_code(response.status_code)
            .with_header(
                tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    response.content_type.as_bytes(),
                )
                .expect("content-type header"),
            );

        for h in cors_headers() {
            tiny = tiny.with_header(h);
        }

        let _ = req.respond(tiny);
    }

    Ok(())
}
