use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    brand::Brand,
    sector::{CreateSector, Sector, SectorWithCounts, UpdateSector},
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{ApiJson, ApiPath},
};

/// List sectors with brand and subnode counts
pub async fn get_sectors(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<SectorWithCounts>>>, ApiError> {
    let sectors = Sector::find_all(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(sectors)))
}

/// Get a single sector with its counts
pub async fn get_sector(
    State(deployment): State<DeploymentImpl>,
    ApiPath(sector_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<SectorWithCounts>>, ApiError> {
    let sector = Sector::find_by_id_with_counts(&deployment.db().pool, sector_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("sector not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(sector)))
}

/// Create a sector
pub async fn create_sector(
    State(deployment): State<DeploymentImpl>,
    ApiJson(payload): ApiJson<CreateSector>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Sector>>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let sector = Sector::create(&deployment.db().pool, &payload).await?;
    tracing::info!(sector_id = %sector.id, name = %sector.name, "Sector created");
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(sector))))
}

/// Update a sector; only the fields present in the body change
pub async fn update_sector(
    State(deployment): State<DeploymentImpl>,
    ApiPath(sector_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateSector>,
) -> Result<ResponseJson<ApiResponse<Sector>>, ApiError> {
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name cannot be empty".to_string()));
    }
    let sector = Sector::update(&deployment.db().pool, sector_id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("sector not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(sector)))
}

/// Delete a sector that has no brands
pub async fn delete_sector(
    State(deployment): State<DeploymentImpl>,
    ApiPath(sector_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = &deployment.db().pool;
    if Sector::find_by_id(pool, sector_id).await?.is_none() {
        return Err(ApiError::NotFound("sector not found".to_string()));
    }

    let brands = Sector::count_brands(pool, sector_id).await?;
    if brands > 0 {
        return Err(ApiError::Conflict(format!(
            "sector still has {brands} brands"
        )));
    }

    Sector::delete(pool, sector_id).await?;
    tracing::info!(sector_id = %sector_id, "Sector deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

/// List the brands in a sector
pub async fn get_sector_brands(
    State(deployment): State<DeploymentImpl>,
    ApiPath(sector_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Brand>>>, ApiError> {
    let pool = &deployment.db().pool;
    if Sector::find_by_id(pool, sector_id).await?.is_none() {
        return Err(ApiError::NotFound("sector not found".to_string()));
    }
    let brands = Brand::find_by_sector_id(pool, sector_id).await?;
    Ok(ResponseJson(ApiResponse::success(brands)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/sectors",
        Router::new()
            .route("/", get(get_sectors).post(create_sector))
            .route(
                "/{sector_id}",
                get(get_sector).put(update_sector).delete(delete_sector),
            )
            .route("/{sector_id}/brands", get(get_sector_brands)),
    )
}
