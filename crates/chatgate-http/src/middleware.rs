//! Request tracing and CORS.

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const X_TRACE_ID: &str = "x-trace-id";

/// Wraps each request in a span keyed by `x-trace-id` (taken from the caller
/// when it is a valid UUID, generated otherwise) and echoes the id back.
///
/// Bodies are never logged: auth payloads carry signatures.
pub async fn trace_requests(mut req: Request, next: Next) -> Response {
    let start = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        if let Some(h) = &header {
            req.headers_mut()
                .insert(HeaderName::from_static(X_TRACE_ID), h.clone());
        }

        let mut response = next.run(req).await;

        if let Some(h) = header {
            response
                .headers_mut()
                .insert(HeaderName::from_static(X_TRACE_ID), h);
        }
        info!(
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Open CORS unless an origin allow-list is configured.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let layer = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
