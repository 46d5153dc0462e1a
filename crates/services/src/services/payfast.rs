//! PayFast hosted-checkout integration: signed form fields for the redirect
//! and validation of Instant Transaction Notifications (ITN).

use std::time::Duration;

use db::models::payment::PaymentStatus;
use md5::{Digest, Md5};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use utils::money::{format_cents, parse_cents};

const SANDBOX_HOST: &str = "sandbox.payfast.co.za";
const LIVE_HOST: &str = "www.payfast.co.za";

#[derive(Debug, Clone, Error)]
pub enum PayFastError {
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: String, received: String },
    #[error("server validation rejected the notification")]
    ServerValidationFailed,
    #[error("network error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct PayFastConfig {
    pub merchant_id: String,
    pub merchant_key: String,
    pub passphrase: Option<String>,
    pub sandbox: bool,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub notify_url: Option<String>,
    /// Confirm each ITN with PayFast's `/eng/query/validate` endpoint.
    pub validate_with_server: bool,
}

impl PayFastConfig {
    pub fn host(&self) -> &'static str {
        if self.sandbox { SANDBOX_HOST } else { LIVE_HOST }
    }

    pub fn process_url(&self) -> String {
        format!("https://{}/eng/process", self.host())
    }

    pub fn validate_url(&self) -> String {
        format!("https://{}/eng/query/validate", self.host())
    }

    fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// Encode like PHP's `urlencode`, which PayFast uses when signing:
/// spaces become `+` and every other reserved byte is percent-escaped in upper case.
pub fn php_urlencode(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%20", "+")
        .replace('~', "%7E")
}

/// The `key=value&...` string that gets hashed. Fields are taken in the order
/// given; `signature` and blank values are skipped.
pub fn signature_payload(fields: &[(String, String)], passphrase: Option<&str>) -> String {
    let mut parts: Vec<String> = fields
        .iter()
        .filter(|(key, value)| key != "signature" && !value.trim().is_empty())
        .map(|(key, value)| format!("{}={}", key, php_urlencode(value.trim())))
        .collect();

    if let Some(passphrase) = passphrase.filter(|p| !p.trim().is_empty()) {
        parts.push(format!("passphrase={}", php_urlencode(passphrase.trim())));
    }

    parts.join("&")
}

/// Lowercase hex MD5 of [`signature_payload`].
pub fn generate_signature(fields: &[(String, String)], passphrase: Option<&str>) -> String {
    let payload = signature_payload(fields, passphrase);
    hex::encode(Md5::digest(payload.as_bytes()))
}

/// Check the `signature` field against a freshly computed one.
pub fn verify_signature(fields: &[(String, String)], passphrase: Option<&str>) -> bool {
    let Some(received) = field(fields, "signature") else {
        return false;
    };
    let expected = generate_signature(fields, passphrase);
    let received = received.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// What the shopper's browser needs to POST to PayFast.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CheckoutForm {
    pub action_url: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct Buyer {
    pub name_first: Option<String>,
    pub name_last: Option<String>,
    pub email_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub m_payment_id: String,
    pub amount_cents: i64,
    pub item_name: String,
    pub item_description: Option<String>,
    pub buyer: Buyer,
}

/// Parsed ITN fields this service acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItnNotification {
    pub m_payment_id: String,
    pub pf_payment_id: Option<String>,
    pub payment_status: String,
    pub amount_gross_cents: i64,
}

impl ItnNotification {
    pub fn from_fields(fields: &[(String, String)]) -> Result<Self, PayFastError> {
        let m_payment_id = field(fields, "m_payment_id")
            .filter(|v| !v.trim().is_empty())
            .ok_or(PayFastError::MissingField("m_payment_id"))?
            .trim()
            .to_string();
        let payment_status = field(fields, "payment_status")
            .ok_or(PayFastError::MissingField("payment_status"))?
            .trim()
            .to_string();
        let amount_gross = field(fields, "amount_gross")
            .ok_or(PayFastError::MissingField("amount_gross"))?;
        let amount_gross_cents = parse_cents(amount_gross)
            .map_err(|_| PayFastError::InvalidAmount(amount_gross.to_string()))?;
        let pf_payment_id = field(fields, "pf_payment_id")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self {
            m_payment_id,
            pf_payment_id,
            payment_status,
            amount_gross_cents,
        })
    }

    pub fn status(&self) -> PaymentStatus {
        map_payment_status(&self.payment_status)
    }
}

pub fn map_payment_status(status: &str) -> PaymentStatus {
    match status.trim().to_ascii_uppercase().as_str() {
        "COMPLETE" => PaymentStatus::Completed,
        "FAILED" => PaymentStatus::Failed,
        "CANCELLED" => PaymentStatus::Cancelled,
        _ => PaymentStatus::Pending,
    }
}

/// Amounts may differ by at most one cent.
pub fn amounts_match(expected_cents: i64, received_cents: i64) -> bool {
    (expected_cents - received_cents).abs() <= 1
}

#[derive(Debug, Clone)]
pub struct PayFastClient {
    config: PayFastConfig,
    http: Client,
}

impl PayFastClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(config: PayFastConfig) -> Result<Self, PayFastError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("seedwave/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PayFastError::Transport(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &PayFastConfig {
        &self.config
    }

    /// Build the ordered, signed field list for the hosted checkout page.
    pub fn build_checkout(&self, request: &CheckoutRequest) -> CheckoutForm {
        let cfg = &self.config;
        let candidates: [(&str, Option<String>); 12] = [
            ("merchant_id", Some(cfg.merchant_id.clone())),
            ("merchant_key", Some(cfg.merchant_key.clone())),
            ("return_url", cfg.return_url.clone()),
            ("cancel_url", cfg.cancel_url.clone()),
            ("notify_url", cfg.notify_url.clone()),
            ("name_first", request.buyer.name_first.clone()),
            ("name_last", request.buyer.name_last.clone()),
            ("email_address", request.buyer.email_address.clone()),
            ("m_payment_id", Some(request.m_payment_id.clone())),
            ("amount", Some(format_cents(request.amount_cents))),
            ("item_name", Some(request.item_name.clone())),
            ("item_description", request.item_description.clone()),
        ];

        let mut fields: Vec<(String, String)> = candidates
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v))
            })
            .collect();

        let signature = generate_signature(&fields, cfg.passphrase());
        fields.push(("signature".to_string(), signature));

        CheckoutForm {
            action_url: cfg.process_url(),
            fields,
        }
    }

    /// Validate an ITN: signature, then amount against `expected_amount_cents`,
    /// then (optionally) a confirmation round-trip to PayFast.
    pub async fn verify_itn(
        &self,
        fields: &[(String, String)],
        expected_amount_cents: i64,
    ) -> Result<ItnNotification, PayFastError> {
        if !verify_signature(fields, self.config.passphrase()) {
            warn!("PayFast ITN: signature mismatch");
            return Err(PayFastError::SignatureMismatch);
        }

        let notification = ItnNotification::from_fields(fields)?;
        if !amounts_match(expected_amount_cents, notification.amount_gross_cents) {
            return Err(PayFastError::AmountMismatch {
                expected: format_cents(expected_amount_cents),
                received: format_cents(notification.amount_gross_cents),
            });
        }

        if self.config.validate_with_server && !self.confirm_with_server(fields).await? {
            return Err(PayFastError::ServerValidationFailed);
        }

        debug!(
            m_payment_id = %notification.m_payment_id,
            payment_status = %notification.payment_status,
            "PayFast ITN verified"
        );
        Ok(notification)
    }

    async fn confirm_with_server(&self, fields: &[(String, String)]) -> Result<bool, PayFastError> {
        let body = signature_payload(fields, None);
        let res = self
            .http
            .post(self.config.validate_url())
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| PayFastError::Transport(e.to_string()))?;

        let text = res
            .text()
            .await
            .map_err(|e| PayFastError::Transport(e.to_string()))?;
        Ok(text.trim() == "VALID")
    }
}
