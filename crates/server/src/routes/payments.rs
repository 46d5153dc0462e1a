//! PayPal and PayFast checkout routes.

use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::payment::Payment;
use serde::{Deserialize, Serialize};
use services::services::{
    payfast::Buyer,
    payments::{PayFastCheckout, PayPalCheckout},
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{ApiJson, ApiPath},
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePayPalOrderRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PayFastCheckoutRequest {
    pub session_id: String,
    #[serde(default)]
    pub buyer: Buyer,
    pub item_name: Option<String>,
}

/// Create a PayPal order for the session cart
pub async fn create_paypal_order(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<CreatePayPalOrderRequest>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<PayPalCheckout>>), ApiError> {
    let checkout = deployment
        .payments()
        .create_paypal_order(&payload.session_id)
        .await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(checkout))))
}

/// Capture an approved PayPal order and settle the payment
pub async fn capture_paypal_order(
    State(deployment): State<DeploymentImpl>,
    ApiPath(order_id): ApiPath<String>,
) -> Result<ResponseJson<ApiResponse<Payment>>, ApiError> {
    let payment = deployment.payments().capture_paypal_order(&order_id).await?;
    Ok(ResponseJson(ApiResponse::success(payment)))
}

/// Start a PayFast checkout and return the signed form fields
pub async fn payfast_checkout(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<PayFastCheckoutRequest>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<PayFastCheckout>>), ApiError> {
    let checkout = deployment
        .payments()
        .start_payfast_checkout(&payload.session_id, payload.buyer, payload.item_name)
        .await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(checkout))))
}

/// PayFast only looks at the status code; the body is the plain `OK` its
/// docs ask for. Field order matters for the signature, so the form is kept
/// as an ordered list.
pub async fn payfast_notify(
    State(deployment): State<DeploymentImpl>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<(StatusCode, &'static str), ApiError> {
    deployment.payments().handle_payfast_itn(&fields).await?;
    Ok((StatusCode::OK, "OK"))
}

/// Get a single payment
pub async fn get_payment(
    State(deployment): State<DeploymentImpl>,
    ApiPath(payment_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<Payment>>, ApiError> {
    let payment = deployment.payments().get(payment_id).await?;
    Ok(ResponseJson(ApiResponse::success(payment)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/payments",
        Router::new()
            .route("/paypal/orders", post(create_paypal_order))
            .route("/paypal/orders/{order_id}/capture", post(capture_paypal_order))
            .route("/payfast/checkout", post(payfast_checkout))
            .route("/payfast/notify", post(payfast_notify))
            .route("/{payment_id}", get(get_payment)),
    )
}
