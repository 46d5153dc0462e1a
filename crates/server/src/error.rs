use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    cart::CartError, legal::LegalError, payfast::PayFastError, payments::PaymentError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Legal(#[from] LegalError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Database(e) => database_status(e),
            ApiError::Cart(e) => cart_status(e),
            ApiError::Legal(e) => match e {
                LegalError::Database(e) => database_status(e),
                LegalError::NotFound => StatusCode::NOT_FOUND,
                LegalError::NotDraft(_) | LegalError::AlreadyRevoked => StatusCode::CONFLICT,
                LegalError::Validation(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Payment(e) => match e {
                PaymentError::Database(e) => database_status(e),
                PaymentError::Cart(e) => cart_status(e),
                PaymentError::EmptyCart => StatusCode::BAD_REQUEST,
                PaymentError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                PaymentError::NotFound => StatusCode::NOT_FOUND,
                PaymentError::PayFast(e) => match e {
                    PayFastError::Transport(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::BAD_REQUEST,
                },
                PaymentError::PayPal(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Message sent to the client. Internal failures are not echoed back.
    fn public_message(&self, status: StatusCode) -> String {
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            match self {
                ApiError::Payment(PaymentError::PayFast(_) | PaymentError::PayPal(_)) => {
                    "Payment provider request failed".to_string()
                }
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        }
    }
}

fn cart_status(e: &CartError) -> StatusCode {
    match e {
        CartError::Database(e) => database_status(e),
        CartError::BrandNotFound | CartError::ItemNotFound => StatusCode::NOT_FOUND,
        CartError::InvalidSession
        | CartError::InvalidQuantity
        | CartError::NegativeQuantity
        | CartError::QuantityTooLarge
        | CartError::InvalidPrice
        | CartError::TotalOverflow => StatusCode::BAD_REQUEST,
    }
}

/// Constraint violations surface as client errors; everything else is a 500.
fn database_status(e: &sqlx::Error) -> StatusCode {
    match e {
        sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
        sqlx::Error::Database(db) if db.is_unique_violation() => StatusCode::CONFLICT,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() || db.is_check_violation() => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ApiResponse::<()>::error(self.public_message(status));
        (status, Json(body)).into_response()
    }
}
