use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CartItem {
    pub id: Uuid,
    pub session_id: String,
    pub brand_id: Uuid,
    #[ts(type = "number")]
    pub quantity: i64,
    #[ts(type = "number")]
    pub price_cents: i64, // Unit price
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i64 = 10_000;
/// Largest unit price accepted for a cart line (10 million in major units).
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000_000;

impl CartItem {
    /// `None` when quantity times price does not fit in an `i64`.
    pub fn line_total_cents(&self) -> Option<i64> {
        self.quantity.checked_mul(self.price_cents)
    }
}

/// Cart line joined with the brand it refers to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CartItemWithBrand {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub item: CartItem,
    pub brand_name: String,
}

impl std::ops::Deref for CartItemWithBrand {
    type Target = CartItem;
    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AddCartItem {
    pub brand_id: Uuid,
    #[ts(type = "number | null")]
    pub quantity: Option<i64>,
    #[ts(type = "number")]
    pub price_cents: i64,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateCartItem {
    #[ts(type = "number")]
    pub quantity: i64,
}

const CART_COLUMNS: &str =
    "id, session_id, brand_id, quantity, price_cents, metadata, created_at, updated_at";

impl CartItem {
    pub async fn find_by_session(
        pool: &SqlitePool,
        session_id: &str,
    ) -> Result<Vec<CartItemWithBrand>, sqlx::Error> {
        sqlx::query_as::<_, CartItemWithBrand>(
            r#"SELECT
                ci.id, ci.session_id, ci.brand_id, ci.quantity, ci.price_cents,
                ci.metadata, ci.created_at, ci.updated_at,
                b.name AS brand_name
            FROM cart_items ci
            JOIN brands b ON b.id = ci.brand_id
            WHERE ci.session_id = $1
            ORDER BY ci.created_at ASC, b.name ASC"#,
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        session_id: &str,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {CART_COLUMNS} FROM cart_items WHERE id = $1 AND session_id = $2");
        sqlx::query_as::<_, CartItem>(&sql)
            .bind(id)
            .bind(session_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a line, or add `quantity` to the existing line for the same brand.
    /// Price and metadata are replaced by the latest values.
    ///
    /// Returns `None` (and leaves the line untouched) when the merged quantity
    /// would exceed [`MAX_LINE_QUANTITY`].
    pub async fn add_or_increment(
        pool: &SqlitePool,
        session_id: &str,
        brand_id: Uuid,
        quantity: i64,
        price_cents: i64,
        metadata: &Value,
    ) -> Result<Option<Self>, sqlx::Error> {
        let id = Uuid::new_v4();
        let sql = format!(
            r#"INSERT INTO cart_items (id, session_id, brand_id, quantity, price_cents, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(session_id, brand_id) DO UPDATE SET
                quantity = cart_items.quantity + excluded.quantity,
                price_cents = excluded.price_cents,
                metadata = excluded.metadata,
                updated_at = datetime('now', 'subsec')
            WHERE cart_items.quantity <= $7 - excluded.quantity
            RETURNING {CART_COLUMNS}"#
        );
        sqlx::query_as::<_, CartItem>(&sql)
            .bind(id)
            .bind(session_id)
            .bind(brand_id)
            .bind(quantity)
            .bind(price_cents)
            .bind(metadata)
            .bind(MAX_LINE_QUANTITY)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_quantity(
        pool: &SqlitePool,
        session_id: &str,
        id: Uuid,
        quantity: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"UPDATE cart_items SET
                quantity = $3,
                updated_at = datetime('now', 'subsec')
            WHERE id = $1 AND session_id = $2
            RETURNING {CART_COLUMNS}"#
        );
        sqlx::query_as::<_, CartItem>(&sql)
            .bind(id)
            .bind(session_id)
            .bind(quantity)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &SqlitePool, session_id: &str, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND session_id = $2")
            .bind(id)
            .bind(session_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Take `quantity` units off a line, deleting it when nothing is left.
    /// Returns the number of rows touched (0 if the line is gone).
    pub async fn remove_quantity(
        pool: &SqlitePool,
        session_id: &str,
        id: Uuid,
        quantity: i64,
    ) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query(
            "DELETE FROM cart_items WHERE id = $1 AND session_id = $2 AND quantity <= $3",
        )
        .bind(id)
        .bind(session_id)
        .bind(quantity)
        .execute(pool)
        .await?;
        if deleted.rows_affected() > 0 {
            return Ok(deleted.rows_affected());
        }

        let reduced = sqlx::query(
            r#"UPDATE cart_items SET
                quantity = quantity - $3,
                updated_at = datetime('now', 'subsec')
            WHERE id = $1 AND session_id = $2 AND quantity > $3"#,
        )
        .bind(id)
        .bind(session_id)
        .bind(quantity)
        .execute(pool)
        .await?;
        Ok(reduced.rows_affected())
    }

    pub async fn clear_session(pool: &SqlitePool, session_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
            .bind(session_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cart_items")
            .fetch_one(pool)
            .await
    }

    pub async fn count_sessions(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT session_id) FROM cart_items")
            .fetch_one(pool)
            .await
    }
}
