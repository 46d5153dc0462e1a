use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Sector {
    pub id: Uuid,
    pub name: String,
    pub emoji: String,
    pub description: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sector row together with the number of top-level brands and subnodes in it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SectorWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub sector: Sector,
    #[ts(type = "number")]
    pub brand_count: i64,
    #[ts(type = "number")]
    pub subnode_count: i64,
}

impl std::ops::Deref for SectorWithCounts {
    type Target = Sector;
    fn deref(&self) -> &Self::Target {
        &self.sector
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateSector {
    pub name: String,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateSector {
    pub name: Option<String>,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

const SECTOR_COLUMNS: &str =
    "s.id, s.name, s.emoji, s.description, s.metadata, s.created_at, s.updated_at";

const COUNT_COLUMNS: &str = r#"
    (SELECT COUNT(*) FROM brands b WHERE b.sector_id = s.id AND b.parent_id IS NULL) AS brand_count,
    (SELECT COUNT(*) FROM brands b WHERE b.sector_id = s.id AND b.parent_id IS NOT NULL) AS subnode_count"#;

impl Sector {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<SectorWithCounts>, sqlx::Error> {
        let sql = format!("SELECT {SECTOR_COLUMNS}, {COUNT_COLUMNS} FROM sectors s ORDER BY s.name ASC");
        sqlx::query_as::<_, SectorWithCounts>(&sql)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {SECTOR_COLUMNS} FROM sectors s WHERE s.id = $1");
        sqlx::query_as::<_, Sector>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id_with_counts(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<Option<SectorWithCounts>, sqlx::Error> {
        let sql =
            format!("SELECT {SECTOR_COLUMNS}, {COUNT_COLUMNS} FROM sectors s WHERE s.id = $1");
        sqlx::query_as::<_, SectorWithCounts>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateSector) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, Sector>(
            r#"INSERT INTO sectors (id, name, emoji, description, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, emoji, description, metadata, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(data.emoji.clone().unwrap_or_default())
        .bind(&data.description)
        .bind(data.metadata.clone().unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(pool)
        .await
    }

    /// Apply the provided fields; absent fields keep their current value.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateSector,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sector>(
            r#"UPDATE sectors SET
                name = COALESCE($2, name),
                emoji = COALESCE($3, emoji),
                description = COALESCE($4, description),
                metadata = COALESCE($5, metadata),
                updated_at = datetime('now', 'subsec')
            WHERE id = $1
            RETURNING id, name, emoji, description, metadata, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(&data.emoji)
        .bind(&data.description)
        .bind(&data.metadata)
        .fetch_optional(pool)
        .await
    }

    pub async fn count_brands(pool: &SqlitePool, id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM brands WHERE sector_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sectors WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sectors")
            .fetch_one(pool)
            .await
    }
}
