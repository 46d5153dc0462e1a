use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display)]
#[sqlx(type_name = "payment_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentProvider {
    Paypal,
    Payfast,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Payment {
    pub id: Uuid,
    pub provider: PaymentProvider,
    pub session_id: String,
    pub external_reference: String, // PayPal order id or PayFast m_payment_id
    #[ts(type = "number")]
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>, // PayPal capture id or PayFast pf_payment_id
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub provider: PaymentProvider,
    pub session_id: String,
    pub external_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PaymentStatusCount {
    pub status: PaymentStatus,
    #[ts(type = "number")]
    pub count: i64,
}

const PAYMENT_COLUMNS: &str = "id, provider, session_id, external_reference, amount_cents, currency, status, provider_reference, metadata, created_at, updated_at";

impl Payment {
    pub async fn create(pool: &SqlitePool, data: &CreatePayment) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let sql = format!(
            r#"INSERT INTO payments (id, provider, session_id, external_reference, amount_cents, currency, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PAYMENT_COLUMNS}"#
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .bind(data.provider)
            .bind(&data.session_id)
            .bind(&data.external_reference)
            .bind(data.amount_cents)
            .bind(&data.currency)
            .bind(&data.metadata)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_reference(
        pool: &SqlitePool,
        provider: PaymentProvider,
        external_reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider = $1 AND external_reference = $2"
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(provider)
            .bind(external_reference)
            .fetch_optional(pool)
            .await
    }

    /// Move a pending payment to `status`. Returns `None` when the payment is
    /// missing or has already reached a final status.
    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: PaymentStatus,
        provider_reference: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"UPDATE payments SET
                status = $2,
                provider_reference = COALESCE($3, provider_reference),
                updated_at = datetime('now', 'subsec')
            WHERE id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}"#
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .bind(status)
            .bind(provider_reference)
            .fetch_optional(pool)
            .await
    }

    pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<PaymentStatusCount>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (PaymentStatus, i64)>(
            "SELECT status, COUNT(*) FROM payments GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(status, count)| PaymentStatusCount { status, count })
            .collect())
    }

    pub async fn completed_revenue_cents(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE status = 'completed'",
        )
        .fetch_one(pool)
        .await
    }
}
