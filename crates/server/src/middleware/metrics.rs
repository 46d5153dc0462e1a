use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::DeploymentImpl;

/// Label used for requests that matched no route (including the SPA fallback).
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Count every request and time it, keyed by the route template rather than
/// the concrete path so ids do not explode the label set.
pub async fn track_requests(
    State(deployment): State<DeploymentImpl>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let started = Instant::now();
    let response = next.run(request).await;
    deployment.metrics().record_request(
        &method,
        &route,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}
