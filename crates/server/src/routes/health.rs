use axum::{
    Router, extract::State, http::StatusCode, response::Json as ResponseJson, routing::get,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::DeploymentImpl;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub version: String,
}

/// Report service and database health
pub async fn health_check(
    State(deployment): State<DeploymentImpl>,
) -> (StatusCode, ResponseJson<ApiResponse<HealthStatus>>) {
    let version = env!("CARGO_PKG_VERSION").to_string();
    match deployment.db().ping().await {
        Ok(()) => (
            StatusCode::OK,
            ResponseJson(ApiResponse::success(HealthStatus {
                status: "ok".to_string(),
                database: "ok".to_string(),
                version,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check: database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ResponseJson(ApiResponse {
                    success: false,
                    data: Some(HealthStatus {
                        status: "degraded".to_string(),
                        database: "unavailable".to_string(),
                        version,
                    }),
                    error: Some("database unavailable".to_string()),
                }),
            )
        }
    }
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
}
