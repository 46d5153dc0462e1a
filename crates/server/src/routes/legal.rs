//! SecureSign legal document routes.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::legal_document::{
    CreateLegalDocument, DocumentType, LegalDocument, SignLegalDocument,
};
use serde::Deserialize;
use services::services::{legal::VerificationResult, metrics};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{ApiJson, ApiPath, ApiQuery},
};

#[derive(Debug, Deserialize)]
pub struct LegalDocumentQuery {
    pub document_type: Option<DocumentType>,
}

/// List legal documents, optionally of one type
pub async fn get_legal_documents(
    State(deployment): State<DeploymentImpl>,
    ApiQuery(query): ApiQuery<LegalDocumentQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<LegalDocument>>>, ApiError> {
    let documents = deployment.secure_sign().list(query.document_type).await?;
    Ok(ResponseJson(ApiResponse::success(documents)))
}

/// Get a single legal document
pub async fn get_legal_document(
    State(deployment): State<DeploymentImpl>,
    ApiPath(document_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<LegalDocument>>, ApiError> {
    let document = deployment.secure_sign().get(document_id).await?;
    Ok(ResponseJson(ApiResponse::success(document)))
}

/// Create a draft legal document
pub async fn create_legal_document(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<CreateLegalDocument>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<LegalDocument>>), ApiError> {
    let document = deployment.secure_sign().create(&payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(document))))
}

/// Sign a draft document and store its signature
pub async fn sign_legal_document(
    State(deployment): State<DeploymentImpl>,
    ApiPath(document_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SignLegalDocument>,
) -> Result<ResponseJson<ApiResponse<LegalDocument>>, ApiError> {
    let document = deployment.secure_sign().sign(document_id, &payload).await?;
    let document_type = document.document_type.to_string();
    deployment.metrics().increment(
        metrics::LEGAL_DOCUMENTS_SIGNED,
        &[("document_type", document_type.as_str())],
    );
    Ok(ResponseJson(ApiResponse::success(document)))
}

/// Revoke a draft or signed document
pub async fn revoke_legal_document(
    State(deployment): State<DeploymentImpl>,
    ApiPath(document_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<LegalDocument>>, ApiError> {
    let document = deployment.secure_sign().revoke(document_id).await?;
    Ok(ResponseJson(ApiResponse::success(document)))
}

/// Check a document's content hash and signature
pub async fn verify_legal_document(
    State(deployment): State<DeploymentImpl>,
    ApiPath(document_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<VerificationResult>>, ApiError> {
    let result = deployment.secure_sign().verify(document_id).await?;
    Ok(ResponseJson(ApiResponse::success(result)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/legal-documents",
        Router::new()
            .route("/", get(get_legal_documents).post(create_legal_document))
            .route("/{document_id}", get(get_legal_document))
            .route("/{document_id}/sign", post(sign_legal_document))
            .route("/{document_id}/revoke", post(revoke_legal_document))
            .route("/{document_id}/verify", get(verify_legal_document)),
    )
}
