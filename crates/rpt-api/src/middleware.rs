//! Layers applied to every route
use axum::body::Body;
use axum::http::Request;
use tower_http::cors::CorsLayer;
use tower_http::trace::{HttpMakeClassifier, TraceLayer};
use tracing::Span;

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Request spans carry method and path
pub fn trace() -> TraceLayer<HttpMakeClassifier, fn(&Request<Body>) -> Span> {
    TraceLayer::new_for_http().make_span_with(request_span as fn(&Request<Body>) -> Span)
}

fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!("request", method = %request.method(), path = %request.uri().path())
}
