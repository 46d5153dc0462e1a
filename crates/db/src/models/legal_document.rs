use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "document_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DocumentType {
    Nda,
    Terms,
    Privacy,
    License,
    Other,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "document_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Signed,
    Revoked,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct LegalDocument {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub title: String,
    pub content: String,
    pub content_hash: String, // SHA-256 hex of content
    pub status: DocumentStatus,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
    pub signature: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateLegalDocument {
    pub document_type: DocumentType,
    pub title: String,
    pub content: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SignLegalDocument {
    pub signer_name: String,
    pub signer_email: String,
}

const DOCUMENT_COLUMNS: &str = "id, document_type, title, content, content_hash, status, signer_name, signer_email, signature, signed_at, metadata, created_at, updated_at";

impl LegalDocument {
    pub async fn find_all(
        pool: &SqlitePool,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM legal_documents
            WHERE ($1 IS NULL OR document_type = $1)
            ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, LegalDocument>(&sql)
            .bind(document_type)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM legal_documents WHERE id = $1");
        sqlx::query_as::<_, LegalDocument>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateLegalDocument,
        content_hash: &str,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let sql = format!(
            r#"INSERT INTO legal_documents (id, document_type, title, content, content_hash, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DOCUMENT_COLUMNS}"#
        );
        sqlx::query_as::<_, LegalDocument>(&sql)
            .bind(id)
            .bind(data.document_type)
            .bind(data.title.trim())
            .bind(&data.content)
            .bind(content_hash)
            .bind(data.metadata.clone().unwrap_or_else(|| serde_json::json!({})))
            .fetch_one(pool)
            .await
    }

    /// Transition a draft to signed. Returns `None` when the document is
    /// missing or no longer a draft.
    pub async fn mark_signed(
        pool: &SqlitePool,
        id: Uuid,
        signer_name: &str,
        signer_email: &str,
        signature: &str,
        signed_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"UPDATE legal_documents SET
                status = 'signed',
                signer_name = $2,
                signer_email = $3,
                signature = $4,
                signed_at = $5,
                updated_at = datetime('now', 'subsec')
            WHERE id = $1 AND status = 'draft'
            RETURNING {DOCUMENT_COLUMNS}"#
        );
        sqlx::query_as::<_, LegalDocument>(&sql)
            .bind(id)
            .bind(signer_name)
            .bind(signer_email)
            .bind(signature)
            .bind(signed_at)
            .fetch_optional(pool)
            .await
    }

    /// Revoke a draft or signed document. Returns `None` when missing or already revoked.
    pub async fn mark_revoked(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"UPDATE legal_documents SET
                status = 'revoked',
                updated_at = datetime('now', 'subsec')
            WHERE id = $1 AND status != 'revoked'
            RETURNING {DOCUMENT_COLUMNS}"#
        );
        sqlx::query_as::<_, LegalDocument>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn count_by_status(
        pool: &SqlitePool,
    ) -> Result<Vec<(DocumentStatus, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (DocumentStatus, i64)>(
            "SELECT status, COUNT(*) FROM legal_documents GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
    }
}
