//! Request dispatch.
//!
//! axum only supplies the transport: every request lands in [`dispatch`],
//! which routes it through the built-in [`PathRouter`], runs the matched
//! filters and answers from the resource pipeline.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
    Router,
};
use esmserve_core::pipeline::headers::etag_matches;
use esmserve_core::{DevContext, Error, Method, PathRouter, Resource};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::icon;
use crate::routes::{builtin_routes, Endpoint, Filter};

/// Shared state behind every request.
#[derive(Debug)]
pub struct AppState {
    pub ctx: DevContext,
    pub routes: PathRouter<Endpoint, Filter>,
}

impl AppState {
    pub fn new(ctx: DevContext) -> esmserve_core::Result<Self> {
        let routes = builtin_routes(&ctx.config)?;
        debug!(routes = ?routes.routes(), "Built-in routes registered");
        Ok(Self { ctx, routes })
    }
}

/// The axum application.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let started = Instant::now();
    let Ok(method) = request.method().as_str().parse::<Method>() else {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    };
    let target = request
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_string();
    let path = request.uri().path().to_string();

    let route = match state.routes.route(method, &target) {
        Ok(route) => route,
        Err(e) => return error_response(&e),
    };

    for filter in &route.before {
        if let Filter::AccessLog = filter {
            info!(method = %method, path = %target, "Request");
        }
    }

    let mut response = match serve(&state, *route.handler, &path, request.headers()).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    };

    if method == Method::Head {
        *response.body_mut() = Body::empty();
    }

    for filter in &route.after {
        if let Filter::NoSniff = filter {
            response.headers_mut().insert(
                HeaderName::from_static("x-content-type-options"),
                HeaderValue::from_static("nosniff"),
            );
        }
    }

    debug!(
        method = %method,
        path = %target,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Response"
    );
    response
}

async fn serve(
    state: &AppState,
    endpoint: Endpoint,
    path: &str,
    request_headers: &HeaderMap,
) -> esmserve_core::Result<Response> {
    let if_none_match = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    match endpoint {
        Endpoint::Icon => {
            let etag = icon::etag();
            if if_none_match.is_some_and(|inm| etag_matches(inm, &etag)) {
                return Ok(not_modified(&etag));
            }
            let mut response = Response::new(Body::from(icon::FAVICON_SVG));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(icon::CONTENT_TYPE));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400"));
            insert_header(headers, "etag", &etag);
            Ok(response)
        }
        Endpoint::Index => {
            let resource = state.ctx.pipeline.provide("/index.html").await?;
            Ok(resource_response(&resource, if_none_match))
        }
        Endpoint::Mount | Endpoint::Project => {
            let resource = state.ctx.pipeline.provide(path).await?;
            Ok(resource_response(&resource, if_none_match))
        }
    }
}

fn resource_response(resource: &Resource, if_none_match: Option<&str>) -> Response {
    if let (Some(inm), Some(etag)) = (if_none_match, resource.etag()) {
        if etag_matches(inm, etag) {
            let mut response = not_modified(etag);
            if let Some(cache_control) = resource.header("cache-control") {
                insert_header(response.headers_mut(), "cache-control", cache_control);
            }
            return response;
        }
    }

    let mut response = Response::new(Body::from(resource.content.clone()));
    for (name, value) in &resource.headers {
        insert_header(response.headers_mut(), name, value);
    }
    response
}

fn not_modified(etag: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    insert_header(response.headers_mut(), "etag", etag);
    response
}

/// Map an engine error onto a response: 404s and 308s as such, everything
/// else a 500 carrying the message.
fn error_response(error: &Error) -> Response {
    if let Error::Redirect { location } = error {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::PERMANENT_REDIRECT;
        insert_header(response.headers_mut(), "location", location);
        return response;
    }

    let status = StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(error = %error, "Request failed");
    }
    text_response(status, &error.to_string())
}

fn text_response(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!(header = name, "Dropping invalid response header"),
    }
}
