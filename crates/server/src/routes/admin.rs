use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use services::services::admin_stats::AdminStats;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

/// Catalogue, cart, legal and payment totals for the admin dashboard
pub async fn get_stats(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<AdminStats>>, ApiError> {
    let stats = AdminStats::collect(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(stats)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/admin/stats", get(get_stats))
}
