use axum::{
    Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
};
use services::services::metrics::CONTENT_TYPE;

use crate::DeploymentImpl;

/// Prometheus text exposition of the request and business counters
pub async fn get_metrics(State(deployment): State<DeploymentImpl>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        deployment.metrics().render(),
    )
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/metrics", get(get_metrics))
}
