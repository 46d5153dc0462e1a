use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{DeploymentImpl, middleware::metrics::track_requests};

pub mod admin;
pub mod brands;
pub mod cart;
pub mod frontend;
pub mod health;
pub mod legal;
pub mod metrics;
pub mod payments;
pub mod sectors;

pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .merge(sectors::router())
        .merge(brands::router())
        .merge(cart::router())
        .merge(legal::router())
        .merge(admin::router())
        .merge(payments::router());

    let cors = cors_layer(&deployment.config().cors_allowed_origins);

    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .nest("/api", api)
        .fallback(frontend::serve_frontend)
        .layer(from_fn_with_state(deployment.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(deployment)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
