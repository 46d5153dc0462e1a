//! PayPal REST client for the Orders v2 API.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use ts_rs::TS;
use utils::money::format_cents;

const SANDBOX_API_URL: &str = "https://api-m.sandbox.paypal.com";
const LIVE_API_URL: &str = "https://api-m.paypal.com";

/// Refresh the access token this long before PayPal says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Error)]
pub enum PayPalError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid client credentials")]
    Unauthorized,
    #[error("json error: {0}")]
    Serde(String),
}

impl PayPalError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PayPalMode {
    #[default]
    Sandbox,
    Live,
}

impl PayPalMode {
    pub fn api_url(&self) -> &'static str {
        match self {
            PayPalMode::Sandbox => SANDBOX_API_URL,
            PayPalMode::Live => LIVE_API_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub mode: PayPalMode,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Serialize)]
struct PurchaseUnit {
    reference_id: String,
    amount: Amount,
}

#[derive(Debug, Serialize)]
struct Amount {
    currency_code: String,
    value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct LinkDescription {
    pub href: String,
    pub rel: String,
    pub method: Option<String>,
}

/// The subset of a PayPal order resource this service reads.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub purchase_units: Vec<Value>,
}

impl PayPalOrder {
    /// URL the buyer is redirected to for approval.
    pub fn approve_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.as_str())
    }

    /// Id of the first capture, present once the order has been captured.
    pub fn capture_id(&self) -> Option<&str> {
        self.purchase_units
            .first()?
            .pointer("/payments/captures/0/id")?
            .as_str()
    }

    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

#[derive(Debug, Clone)]
pub struct PayPalClient {
    http: Client,
    config: PayPalConfig,
    base_url: String,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl PayPalClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(config: PayPalConfig) -> Result<Self, PayPalError> {
        let base_url = config.mode.api_url().to_string();
        Self::with_base_url(config, base_url)
    }

    /// Point the client at a different API host (used by tests).
    pub fn with_base_url(
        config: PayPalConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, PayPalError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("seedwave/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PayPalError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn mode(&self) -> PayPalMode {
        self.config.mode
    }

    /// Create a CAPTURE-intent order. `reference` doubles as the idempotency key.
    pub async fn create_order(
        &self,
        amount_cents: i64,
        currency: &str,
        reference: &str,
    ) -> Result<PayPalOrder, PayPalError> {
        let body = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnit {
                reference_id: reference.to_string(),
                amount: Amount {
                    currency_code: currency.to_uppercase(),
                    value: format_cents(amount_cents),
                },
            }],
        };
        let url = format!("{}/v2/checkout/orders", self.base_url);

        let order: PayPalOrder = self
            .send_with_retry(|token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header("PayPal-Request-Id", format!("create-{reference}"))
                    .json(&body)
            })
            .await?;
        debug!(order_id = %order.id, status = %order.status, "PayPal order created");
        Ok(order)
    }

    pub async fn capture_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalError> {
        let url = format!("{}/v2/checkout/orders/{}/capture", self.base_url, order_id);

        let order: PayPalOrder = self
            .send_with_retry(|token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header("PayPal-Request-Id", format!("capture-{order_id}"))
                    .header("content-type", "application/json")
                    .body("{}")
            })
            .await?;
        debug!(order_id = %order.id, status = %order.status, "PayPal order captured");
        Ok(order)
    }

    async fn send_with_retry<T, F>(&self, build: F) -> Result<T, PayPalError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        (|| async {
            let token = self.access_token().await?;
            match send_json(build(&token)).await {
                Err(PayPalError::Unauthorized) => {
                    // cached token revoked or expired early: refresh once and resend
                    debug!("PayPal rejected the cached access token, refreshing");
                    self.invalidate_token(&token).await;
                    let token = self.access_token().await?;
                    send_json(build(&token)).await
                }
                result => result,
            }
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(10))
                .with_max_times(3)
                .with_jitter(),
        )
        .when(|e: &PayPalError| e.should_retry())
        .notify(|e, dur| {
            warn!(
                "PayPal API call failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                e
            )
        })
        .await
    }

    /// Return a cached OAuth2 access token, fetching a new one when close to expiry.
    pub async fn access_token(&self) -> Result<String, PayPalError> {
        if let Some(value) = fresh_token(self.token.read().await.as_ref()) {
            return Ok(value);
        }

        let mut guard = self.token.write().await;
        // another task may have refreshed while we waited for the write lock
        if let Some(value) = fresh_token(guard.as_ref()) {
            return Ok(value);
        }

        let request = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")]);
        let response: TokenResponse = send_json(request).await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *guard = Some(CachedToken {
            value: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        debug!(expires_in = response.expires_in, "PayPal access token refreshed");
        Ok(response.access_token)
    }

    /// Drop the cached token unless another task already replaced it.
    async fn invalidate_token(&self, rejected: &str) {
        let mut guard = self.token.write().await;
        if guard.as_ref().is_some_and(|t| t.value == rejected) {
            guard.take();
        }
    }
}

fn fresh_token(cached: Option<&CachedToken>) -> Option<String> {
    cached
        .filter(|t| Instant::now() < t.refresh_at)
        .map(|t| t.value.clone())
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, PayPalError> {
    let res = request.send().await.map_err(map_reqwest_error)?;

    match res.status() {
        s if s.is_success() => res
            .json::<T>()
            .await
            .map_err(|e| PayPalError::Serde(e.to_string())),
        StatusCode::UNAUTHORIZED => Err(PayPalError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Err(PayPalError::RateLimited),
        s => {
            let status = s.as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(PayPalError::Http { status, body })
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> PayPalError {
    if e.is_timeout() {
        PayPalError::Timeout
    } else {
        PayPalError::Transport(e.to_string())
    }
}
