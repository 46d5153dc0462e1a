use std::sync::Arc;

use db::DBService;
use services::services::{
    cart::CartService,
    legal::{LegalError, SecureSignService},
    metrics::MetricsRegistry,
    payfast::{PayFastClient, PayFastError},
    payments::PaymentService,
    paypal::{PayPalClient, PayPalError},
};
use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Legal(#[from] LegalError),
    #[error(transparent)]
    PayFast(#[from] PayFastError),
    #[error(transparent)]
    PayPal(#[from] PayPalError),
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct DeploymentImpl {
    inner: Arc<Inner>,
}

struct Inner {
    db: DBService,
    config: ServerConfig,
    metrics: Arc<MetricsRegistry>,
    secure_sign: SecureSignService,
    payments: PaymentService,
}

impl DeploymentImpl {
    pub async fn new(config: ServerConfig) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;
        Self::with_db(db, config)
    }

    pub fn with_db(db: DBService, config: ServerConfig) -> Result<Self, DeploymentError> {
        Self::with_paypal(db, config, None)
    }

    /// Like `with_db`, but with an explicit PayPal client (e.g. one pointed at
    /// a different API host).
    pub fn with_paypal(
        db: DBService,
        config: ServerConfig,
        paypal: Option<PayPalClient>,
    ) -> Result<Self, DeploymentError> {
        let metrics = Arc::new(MetricsRegistry::new());

        let payfast = config.payfast.clone().map(PayFastClient::new).transpose()?;
        let paypal = match paypal {
            Some(client) => Some(client),
            None => config.paypal.clone().map(PayPalClient::new).transpose()?,
        };
        info!(
            payfast = payfast.is_some(),
            paypal = paypal.is_some(),
            "Payment providers configured"
        );

        let payments = PaymentService::new(
            db.pool.clone(),
            config.payment_currency.clone(),
            metrics.clone(),
        )
        .with_payfast(payfast)
        .with_paypal(paypal);
        let secure_sign = SecureSignService::new(db.pool.clone(), &config.securesign_secret)?;

        Ok(Self {
            inner: Arc::new(Inner {
                db,
                config,
                metrics,
                secure_sign,
                payments,
            }),
        })
    }

    pub fn db(&self) -> &DBService {
        &self.inner.db
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.inner.metrics
    }

    pub fn cart(&self) -> CartService {
        CartService::new(self.inner.db.pool.clone())
    }

    pub fn secure_sign(&self) -> &SecureSignService {
        &self.inner.secure_sign
    }

    pub fn payments(&self) -> &PaymentService {
        &self.inner.payments
    }
}
