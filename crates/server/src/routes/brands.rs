use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    brand::{Brand, BrandFilter, CreateBrand, UpdateBrand},
    sector::Sector,
};
use sqlx::SqlitePool;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{ApiJson, ApiPath, ApiQuery},
};

/// List brands, filtered by sector, status and search text
pub async fn get_brands(
    State(deployment): State<DeploymentImpl>,
    ApiQuery(filter): ApiQuery<BrandFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<Brand>>>, ApiError> {
    let brands = Brand::find_filtered(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(brands)))
}

/// Get a single brand
pub async fn get_brand(
    State(deployment): State<DeploymentImpl>,
    ApiPath(brand_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<Brand>>, ApiError> {
    let brand = Brand::find_by_id(&deployment.db().pool, brand_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("brand not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(brand)))
}

/// Sector and parent references must point at existing rows, and the parent
/// chain must not loop back to the brand.
async fn check_references(
    pool: &SqlitePool,
    brand_id: Option<Uuid>,
    sector_id: Option<Uuid>,
    parent_id: Option<Uuid>,
) -> Result<(), ApiError> {
    if let Some(sector_id) = sector_id {
        if Sector::find_by_id(pool, sector_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!("sector {sector_id} does not exist")));
        }
    }
    if let Some(parent_id) = parent_id {
        if Some(parent_id) == brand_id {
            return Err(ApiError::BadRequest("a brand cannot be its own parent".to_string()));
        }
        if Brand::find_by_id(pool, parent_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!(
                "parent brand {parent_id} does not exist"
            )));
        }
        if let Some(brand_id) = brand_id {
            if Brand::parent_chain_contains(pool, parent_id, brand_id).await? {
                return Err(ApiError::BadRequest(format!(
                    "brand {parent_id} is a descendant of {brand_id}; parent chain would loop"
                )));
            }
        }
    }
    Ok(())
}

/// Create a brand, optionally under a parent brand
pub async fn create_brand(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<CreateBrand>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Brand>>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let pool = &deployment.db().pool;
    check_references(pool, None, Some(payload.sector_id), payload.parent_id).await?;

    let brand = Brand::create(pool, &payload).await?;
    tracing::info!(brand_id = %brand.id, sector_id = %brand.sector_id, "Brand created");
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(brand))))
}

/// Update a brand; only the fields present in the body change
pub async fn update_brand(
    State(deployment): State<DeploymentImpl>,
    ApiPath(brand_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateBrand>,
) -> Result<ResponseJson<ApiResponse<Brand>>, ApiError> {
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name cannot be empty".to_string()));
    }
    let pool = &deployment.db().pool;
    check_references(pool, Some(brand_id), payload.sector_id, payload.parent_id).await?;

    let brand = Brand::update(pool, brand_id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("brand not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(brand)))
}

/// Delete a brand and its cart lines
pub async fn delete_brand(
    State(deployment): State<DeploymentImpl>,
    ApiPath(brand_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let removed = Brand::delete(&deployment.db().pool, brand_id).await?;
    if removed == 0 {
        return Err(ApiError::NotFound("brand not found".to_string()));
    }
    tracing::info!(brand_id = %brand_id, "Brand deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/brands",
        Router::new()
            .route("/", get(get_brands).post(create_brand))
            .route(
                "/{brand_id}",
                get(get_brand).put(update_brand).delete(delete_brand),
            ),
    )
}
