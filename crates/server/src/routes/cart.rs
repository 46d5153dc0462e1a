use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, patch, post},
};
use db::models::cart_item::{AddCartItem, CartItem, UpdateCartItem};
use serde::{Deserialize, Serialize};
use services::services::{cart::CartSummary, metrics};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{ApiJson, ApiPath},
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ClearCartResponse {
    #[ts(type = "number")]
    pub removed: u64,
}

/// Get the cart for a session with item count and totals
pub async fn get_cart(
    State(deployment): State<DeploymentImpl>,
    ApiPath(session_id): ApiPath<String>,
) -> Result<ResponseJson<ApiResponse<CartSummary>>, ApiError> {
    let cart = deployment.cart().get_cart(&session_id).await?;
    Ok(ResponseJson(ApiResponse::success(cart)))
}

/// Add a brand to the cart, merging with an existing line
pub async fn add_cart_item(
    State(deployment): State<DeploymentImpl>,
    ApiPath(session_id): ApiPath<String>,
    ApiJson(payload): ApiJson<AddCartItem>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<CartItem>>), ApiError> {
    let item = deployment.cart().add_item(&session_id, &payload).await?;
    deployment.metrics().increment(metrics::CART_ITEMS_ADDED, &[]);
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(item))))
}

/// Setting the quantity to zero removes the line; the response data is then `null`.
pub async fn update_cart_item(
    State(deployment): State<DeploymentImpl>,
    ApiPath((session_id, item_id)): ApiPath<(String, Uuid)>,
    ApiJson(payload): ApiJson<UpdateCartItem>,
) -> Result<ResponseJson<ApiResponse<Option<CartItem>>>, ApiError> {
    let item = deployment
        .cart()
        .update_quantity(&session_id, item_id, payload.quantity)
        .await?;
    if item.is_none() {
        deployment.metrics().increment(metrics::CART_ITEMS_REMOVED, &[]);
    }
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// Remove one line from the cart
pub async fn remove_cart_item(
    State(deployment): State<DeploymentImpl>,
    ApiPath((session_id, item_id)): ApiPath<(String, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.cart().remove_item(&session_id, item_id).await?;
    deployment.metrics().increment(metrics::CART_ITEMS_REMOVED, &[]);
    Ok(ResponseJson(ApiResponse::success(())))
}

/// Remove every line in the session cart
pub async fn clear_cart(
    State(deployment): State<DeploymentImpl>,
    ApiPath(session_id): ApiPath<String>,
) -> Result<ResponseJson<ApiResponse<ClearCartResponse>>, ApiError> {
    let removed = deployment.cart().clear(&session_id).await?;
    if removed > 0 {
        deployment
            .metrics()
            .increment_by(metrics::CART_ITEMS_REMOVED, &[], removed);
    }
    Ok(ResponseJson(ApiResponse::success(ClearCartResponse { removed })))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/cart/{session_id}",
        Router::new()
            .route("/", get(get_cart).delete(clear_cart))
            .route("/items", post(add_cart_item))
            .route(
                "/items/{item_id}",
                patch(update_cart_item).delete(remove_cart_item),
            ),
    )
}
