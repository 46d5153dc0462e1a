//! SecureSign: legal document storage with content hashing and HMAC signatures.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use db::models::legal_document::{
    CreateLegalDocument, DocumentStatus, DocumentType, LegalDocument, SignLegalDocument,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum LegalError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("legal document not found")]
    NotFound,
    #[error("document is {0}, only drafts can be signed")]
    NotDraft(DocumentStatus),
    #[error("document is already revoked")]
    AlreadyRevoked,
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct VerificationResult {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    pub hash_matches: bool,
    /// `None` for documents that were never signed.
    pub signature_valid: Option<bool>,
}

pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn signing_payload(content_hash: &str, signer_email: &str, signed_at: DateTime<Utc>) -> String {
    format!(
        "{}|{}|{}",
        content_hash,
        signer_email,
        signed_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

pub struct SecureSignService {
    pool: SqlitePool,
    mac: HmacSha256,
}

impl SecureSignService {
    pub fn new(pool: SqlitePool, secret: impl AsRef<[u8]>) -> Result<Self, LegalError> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| LegalError::Validation(format!("invalid signing secret: {e}")))?;
        Ok(Self { pool, mac })
    }

    pub fn sign_payload(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify_payload(&self, payload: &str, signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    pub async fn list(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<LegalDocument>, LegalError> {
        Ok(LegalDocument::find_all(&self.pool, document_type).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<LegalDocument, LegalError> {
        LegalDocument::find_by_id(&self.pool, id)
            .await?
            .ok_or(LegalError::NotFound)
    }

    pub async fn create(&self, data: &CreateLegalDocument) -> Result<LegalDocument, LegalError> {
        if data.title.trim().is_empty() {
            return Err(LegalError::Validation("title is required".to_string()));
        }
        if data.content.trim().is_empty() {
            return Err(LegalError::Validation("content is required".to_string()));
        }

        let hash = content_hash(&data.content);
        let document = LegalDocument::create(&self.pool, data, &hash).await?;
        info!(document_id = %document.id, document_type = %document.document_type, "Legal document stored");
        Ok(document)
    }

    pub async fn sign(
        &self,
        id: Uuid,
        request: &SignLegalDocument,
    ) -> Result<LegalDocument, LegalError> {
        let signer_name = request.signer_name.trim();
        let signer_email = request.signer_email.trim().to_lowercase();
        if signer_name.is_empty() {
            return Err(LegalError::Validation("signer_name is required".to_string()));
        }
        if !is_plausible_email(&signer_email) {
            return Err(LegalError::Validation("signer_email is invalid".to_string()));
        }

        let document = self.get(id).await?;
        if document.status != DocumentStatus::Draft {
            return Err(LegalError::NotDraft(document.status));
        }

        let signed_at = Utc::now().trunc_subsecs(3);
        let signature =
            self.sign_payload(&signing_payload(&document.content_hash, &signer_email, signed_at));

        // The update is conditional on the row still being a draft.
        let signed = LegalDocument::mark_signed(
            &self.pool,
            id,
            signer_name,
            &signer_email,
            &signature,
            signed_at,
        )
        .await?
        .ok_or(LegalError::NotDraft(DocumentStatus::Signed))?;

        info!(document_id = %id, "Legal document signed");
        Ok(signed)
    }

    pub async fn revoke(&self, id: Uuid) -> Result<LegalDocument, LegalError> {
        let document = self.get(id).await?;
        if document.status == DocumentStatus::Revoked {
            return Err(LegalError::AlreadyRevoked);
        }
        let revoked = LegalDocument::mark_revoked(&self.pool, id)
            .await?
            .ok_or(LegalError::AlreadyRevoked)?;
        info!(document_id = %id, "Legal document revoked");
        Ok(revoked)
    }

    pub async fn verify(&self, id: Uuid) -> Result<VerificationResult, LegalError> {
        let document = self.get(id).await?;
        let hash_matches = content_hash(&document.content) == document.content_hash;

        let signature_valid = match (
            document.signature.as_deref(),
            document.signer_email.as_deref(),
            document.signed_at,
        ) {
            (Some(signature), Some(email), Some(signed_at)) => Some(self.verify_payload(
                &signing_payload(&document.content_hash, email, signed_at),
                signature,
            )),
            _ => None,
        };

        Ok(VerificationResult {
            document_id: document.id,
            status: document.status,
            hash_matches,
            signature_valid,
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    }
}
