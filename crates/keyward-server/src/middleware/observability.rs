//! Request ids and per-request tracing spans.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, COOKIE, HeaderName};
use axum::http::{Request, Response};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

const TRACING_TARGET: &str = "keyward_server::middleware::requests";

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub trait RouterObservabilityExt<S> {
    /// Tags every request with an `x-request-id`, echoes it back and
    /// records method, path, status and latency in a span named after it.
    fn with_observability(self) -> Self;
}

impl<S> RouterObservabilityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_observability(self) -> Self {
        let trace = TraceLayer::new_for_http()
            .make_span_with(request_span)
            .on_request(())
            .on_response(record_response);

        // Outermost last: the id is assigned before the span is opened.
        self.layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(trace)
            .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION, COOKIE]))
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
    }
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    tracing::info_span!(
        target: TRACING_TARGET,
        "request",
        method = %request.method(),
        path = request.uri().path(),
        request_id,
        status = tracing::field::Empty,
    )
}

fn record_response(response: &Response<Body>, latency: Duration, span: &Span) {
    span.record("status", response.status().as_u16());
    tracing::debug!(
        target: TRACING_TARGET,
        latency_ms = latency.as_millis() as u64,
        "response sent"
    );
}
