use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "brand_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BrandStatus {
    #[default]
    Active,
    Inactive,
    Pending,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sector_id: Uuid,
    pub parent_id: Option<Uuid>, // Set for subnodes
    pub integration_type: String,
    pub status: BrandStatus,
    pub metadata: Value, // Pricing, security rating, node info, ...
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateBrand {
    pub name: String,
    pub description: Option<String>,
    pub sector_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub integration_type: Option<String>,
    pub status: Option<BrandStatus>,
    pub metadata: Option<Value>,
}

impl CreateBrand {
    pub fn named(name: impl Into<String>, sector_id: Uuid) -> Self {
        Self {
            name: name.into(),
            description: None,
            sector_id,
            parent_id: None,
            integration_type: None,
            status: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateBrand {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sector_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub integration_type: Option<String>,
    pub status: Option<BrandStatus>,
    pub metadata: Option<Value>,
}

/// Query-string filters for listing brands.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct BrandFilter {
    pub sector_id: Option<Uuid>,
    pub status: Option<BrandStatus>,
    pub search: Option<String>,
    #[ts(type = "number | null")]
    pub limit: Option<i64>,
    #[ts(type = "number | null")]
    pub offset: Option<i64>,
}

pub const DEFAULT_BRAND_PAGE_SIZE: i64 = 100;
pub const MAX_BRAND_PAGE_SIZE: i64 = 500;

const BRAND_COLUMNS: &str = "id, name, description, sector_id, parent_id, integration_type, status, metadata, created_at, updated_at";

impl Brand {
    pub async fn find_filtered(
        pool: &SqlitePool,
        filter: &BrandFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {BRAND_COLUMNS} FROM brands WHERE 1 = 1"));

        if let Some(sector_id) = filter.sector_id {
            query.push(" AND sector_id = ").push_bind(sector_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            query
                .push(" AND (LOWER(name) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(COALESCE(description, '')) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_BRAND_PAGE_SIZE)
            .clamp(1, MAX_BRAND_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0).max(0);
        query
            .push(" ORDER BY name ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        query.build_query_as::<Brand>().fetch_all(pool).await
    }

    pub async fn find_by_sector_id(
        pool: &SqlitePool,
        sector_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!("SELECT {BRAND_COLUMNS} FROM brands WHERE sector_id = $1 ORDER BY name ASC");
        sqlx::query_as::<_, Brand>(&sql)
            .bind(sector_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {BRAND_COLUMNS} FROM brands WHERE id = $1");
        sqlx::query_as::<_, Brand>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateBrand) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let sql = format!(
            r#"INSERT INTO brands (id, name, description, sector_id, parent_id, integration_type, status, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {BRAND_COLUMNS}"#
        );
        sqlx::query_as::<_, Brand>(&sql)
            .bind(id)
            .bind(data.name.trim())
            .bind(&data.description)
            .bind(data.sector_id)
            .bind(data.parent_id)
            .bind(
                data.integration_type
                    .clone()
                    .unwrap_or_else(|| "standard".to_string()),
            )
            .bind(data.status.unwrap_or_default())
            .bind(data.metadata.clone().unwrap_or_else(|| serde_json::json!({})))
            .fetch_one(pool)
            .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateBrand,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"UPDATE brands SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                sector_id = COALESCE($4, sector_id),
                parent_id = COALESCE($5, parent_id),
                integration_type = COALESCE($6, integration_type),
                status = COALESCE($7, status),
                metadata = COALESCE($8, metadata),
                updated_at = datetime('now', 'subsec')
            WHERE id = $1
            RETURNING {BRAND_COLUMNS}"#
        );
        sqlx::query_as::<_, Brand>(&sql)
            .bind(id)
            .bind(data.name.as_deref().map(str::trim))
            .bind(&data.description)
            .bind(data.sector_id)
            .bind(data.parent_id)
            .bind(&data.integration_type)
            .bind(data.status)
            .bind(&data.metadata)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM brands WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// True if `target` is `start` or one of its ancestors. Pointing
    /// `target`'s parent at `start` would then close a loop.
    pub async fn parent_chain_contains(
        pool: &SqlitePool,
        start: Uuid,
        target: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"WITH RECURSIVE chain(id, parent_id) AS (
                SELECT id, parent_id FROM brands WHERE id = $1
                UNION
                SELECT b.id, b.parent_id FROM brands b JOIN chain c ON b.id = c.parent_id
            )
            SELECT EXISTS(SELECT 1 FROM chain WHERE id = $2)"#,
        )
        .bind(start)
        .bind(target)
        .fetch_one(pool)
        .await
    }

    pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(BrandStatus, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (BrandStatus, i64)>(
            "SELECT status, COUNT(*) FROM brands GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
    }
}

/// Case-insensitive substring pattern with LIKE wildcards in `search` escaped.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
