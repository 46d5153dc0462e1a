//! Payment orchestration: turns a cart into a pending payment with one of
//! the providers and settles it from provider callbacks.

use std::sync::Arc;

use db::models::payment::{CreatePayment, Payment, PaymentProvider, PaymentStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    cart::{CartError, CartService, CartSummary, PurchasedLine},
    metrics::{self, MetricsRegistry},
    payfast::{Buyer, CheckoutForm, CheckoutRequest, ItnNotification, PayFastClient, PayFastError},
    paypal::{PayPalClient, PayPalError, PayPalOrder},
};

/// PayFast settles in rand only.
const PAYFAST_CURRENCY: &str = "ZAR";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error("cart is empty")]
    EmptyCart,
    #[error("{0} payments are not configured")]
    NotConfigured(PaymentProvider),
    #[error("payment not found")]
    NotFound,
    #[error("payfast: {0}")]
    PayFast(#[from] PayFastError),
    #[error("paypal: {0}")]
    PayPal(#[from] PayPalError),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PayFastCheckout {
    pub payment: Payment,
    pub form: CheckoutForm,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PayPalCheckout {
    pub payment: Payment,
    pub order_id: String,
    pub approve_url: Option<String>,
}

pub struct PaymentService {
    pool: SqlitePool,
    cart: CartService,
    currency: String,
    metrics: Arc<MetricsRegistry>,
    payfast: Option<PayFastClient>,
    paypal: Option<PayPalClient>,
}

impl PaymentService {
    pub fn new(pool: SqlitePool, currency: impl Into<String>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            cart: CartService::new(pool.clone()),
            pool,
            currency: currency.into().to_uppercase(),
            metrics,
            payfast: None,
            paypal: None,
        }
    }

    pub fn with_payfast(mut self, client: Option<PayFastClient>) -> Self {
        self.payfast = client;
        self
    }

    pub fn with_paypal(mut self, client: Option<PayPalClient>) -> Self {
        self.paypal = client;
        self
    }

    pub async fn get(&self, id: Uuid) -> Result<Payment, PaymentError> {
        Payment::find_by_id(&self.pool, id)
            .await?
            .ok_or(PaymentError::NotFound)
    }

    async fn checkout_cart(&self, session_id: &str) -> Result<CartSummary, PaymentError> {
        let cart = self.cart.get_cart(session_id).await?;
        if cart.is_empty() || cart.total_cents <= 0 {
            return Err(PaymentError::EmptyCart);
        }
        Ok(cart)
    }

    /// Record a pending PayFast payment for the cart and return the signed
    /// form the browser posts to PayFast.
    pub async fn start_payfast_checkout(
        &self,
        session_id: &str,
        buyer: Buyer,
        item_name: Option<String>,
    ) -> Result<PayFastCheckout, PaymentError> {
        let client = self
            .payfast
            .as_ref()
            .ok_or(PaymentError::NotConfigured(PaymentProvider::Payfast))?;
        let cart = self.checkout_cart(session_id).await?;

        let m_payment_id = Uuid::new_v4().to_string();
        let item_name = item_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| order_title(&cart));
        let payment = Payment::create(
            &self.pool,
            &CreatePayment {
                provider: PaymentProvider::Payfast,
                session_id: cart.session_id.clone(),
                external_reference: m_payment_id.clone(),
                amount_cents: cart.total_cents,
                currency: PAYFAST_CURRENCY.to_string(),
                metadata: json!({
                    "item_count": cart.item_count,
                    "lines": cart.purchased_lines(),
                }),
            },
        )
        .await?;

        let form = client.build_checkout(&CheckoutRequest {
            m_payment_id,
            amount_cents: cart.total_cents,
            item_name,
            item_description: None,
            buyer,
        });

        self.record_payment(&payment);
        info!(
            payment_id = %payment.id,
            session_id = %payment.session_id,
            amount_cents = payment.amount_cents,
            "PayFast checkout started"
        );
        Ok(PayFastCheckout { payment, form })
    }

    /// Apply a PayFast ITN. Notifications for payments that already reached a
    /// final status are acknowledged without changing anything.
    pub async fn handle_payfast_itn(
        &self,
        fields: &[(String, String)],
    ) -> Result<Payment, PaymentError> {
        let result = self.apply_payfast_itn(fields).await;
        let outcome = match &result {
            Ok(_) => "accepted",
            Err(_) => "rejected",
        };
        self.metrics.increment(
            metrics::PAYMENT_NOTIFICATIONS,
            &[("provider", "payfast"), ("outcome", outcome)],
        );
        if let Err(e) = &result {
            warn!(error = %e, "PayFast ITN rejected");
        }
        result
    }

    async fn apply_payfast_itn(&self, fields: &[(String, String)]) -> Result<Payment, PaymentError> {
        let client = self
            .payfast
            .as_ref()
            .ok_or(PaymentError::NotConfigured(PaymentProvider::Payfast))?;

        let claimed = ItnNotification::from_fields(fields)?;
        let payment =
            Payment::find_by_reference(&self.pool, PaymentProvider::Payfast, &claimed.m_payment_id)
                .await?
                .ok_or(PaymentError::NotFound)?;

        let notification = client.verify_itn(fields, payment.amount_cents).await?;
        if payment.status.is_final() {
            return Ok(payment);
        }

        self.settle(
            &payment,
            notification.status(),
            notification.pf_payment_id.as_deref(),
        )
        .await
    }

    pub async fn create_paypal_order(&self, session_id: &str) -> Result<PayPalCheckout, PaymentError> {
        let client = self
            .paypal
            .as_ref()
            .ok_or(PaymentError::NotConfigured(PaymentProvider::Paypal))?;
        let cart = self.checkout_cart(session_id).await?;

        let reference = Uuid::new_v4().to_string();
        let order = client
            .create_order(cart.total_cents, &self.currency, &reference)
            .await?;
        let approve_url = order.approve_url().map(str::to_string);

        let payment = Payment::create(
            &self.pool,
            &CreatePayment {
                provider: PaymentProvider::Paypal,
                session_id: cart.session_id.clone(),
                external_reference: order.id.clone(),
                amount_cents: cart.total_cents,
                currency: self.currency.clone(),
                metadata: json!({
                    "reference": reference,
                    "approve_url": approve_url,
                    "item_count": cart.item_count,
                    "lines": cart.purchased_lines(),
                }),
            },
        )
        .await?;

        self.record_payment(&payment);
        info!(payment_id = %payment.id, order_id = %order.id, "PayPal order created");
        Ok(PayPalCheckout {
            payment,
            order_id: order.id,
            approve_url,
        })
    }

    pub async fn capture_paypal_order(&self, order_id: &str) -> Result<Payment, PaymentError> {
        let client = self
            .paypal
            .as_ref()
            .ok_or(PaymentError::NotConfigured(PaymentProvider::Paypal))?;
        let payment = Payment::find_by_reference(&self.pool, PaymentProvider::Paypal, order_id)
            .await?
            .ok_or(PaymentError::NotFound)?;
        if payment.status.is_final() {
            return Ok(payment);
        }

        let order = client.capture_order(order_id).await?;
        self.settle(&payment, paypal_status(&order), order.capture_id())
            .await
    }

    /// Move a pending payment to its provider outcome. A payment that another
    /// notification already settled is returned as stored.
    async fn settle(
        &self,
        payment: &Payment,
        status: PaymentStatus,
        provider_reference: Option<&str>,
    ) -> Result<Payment, PaymentError> {
        let Some(updated) =
            Payment::update_status(&self.pool, payment.id, status, provider_reference).await?
        else {
            let current = self.get(payment.id).await?;
            info!(
                payment_id = %current.id,
                status = %current.status,
                ignored = %status,
                "Payment already settled"
            );
            return Ok(current);
        };

        if updated.status == PaymentStatus::Completed {
            self.remove_purchased_lines(&updated).await?;
        }
        self.record_payment(&updated);
        Ok(updated)
    }

    async fn remove_purchased_lines(&self, payment: &Payment) -> Result<(), PaymentError> {
        let lines = payment
            .metadata
            .get("lines")
            .cloned()
            .map(serde_json::from_value::<Vec<PurchasedLine>>);
        match lines {
            Some(Ok(lines)) => {
                let removed = self.cart.remove_purchased(&payment.session_id, &lines).await?;
                info!(
                    payment_id = %payment.id,
                    session_id = %payment.session_id,
                    removed,
                    "Payment completed, purchased lines removed from cart"
                );
            }
            _ => warn!(
                payment_id = %payment.id,
                "Payment completed without recorded cart lines, cart left as is"
            ),
        }
        Ok(())
    }

    fn record_payment(&self, payment: &Payment) {
        let provider = payment.provider.to_string();
        let status = payment.status.to_string();
        self.metrics.increment(
            metrics::PAYMENTS,
            &[("provider", provider.as_str()), ("status", status.as_str())],
        );
    }
}

fn order_title(cart: &CartSummary) -> String {
    match cart.items.as_slice() {
        [only] => only.brand_name.clone(),
        _ => format!("Seedwave order ({} items)", cart.item_count),
    }
}

fn paypal_status(order: &PayPalOrder) -> PaymentStatus {
    match order.status.as_str() {
        "COMPLETED" => PaymentStatus::Completed,
        "VOIDED" => PaymentStatus::Cancelled,
        _ => PaymentStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, extract::Path, routing::post};
    use db::{
        DBService,
        models::{
            brand::{Brand, CreateBrand},
            cart_item::AddCartItem,
            sector::{CreateSector, Sector},
        },
    };
    use serde_json::Value;

    use super::*;
    use crate::services::{
        payfast::{PayFastConfig, generate_signature},
        paypal::{PayPalConfig, PayPalMode},
    };

    const PASSPHRASE: &str = "jt7NOE43FZPn";

    async fn seeded(session_id: &str) -> (DBService, Arc<MetricsRegistry>) {
        let db = DBService::new_in_memory().await.unwrap();
        let sector = Sector::create(
            &db.pool,
            &CreateSector {
                name: "Agriculture".to_string(),
                emoji: None,
                description: None,
                metadata: None,
            },
        )
        .await
        .unwrap();
        let brand = Brand::create(&db.pool, &CreateBrand::named("SeedGrow", sector.id))
            .await
            .unwrap();
        CartService::new(db.pool.clone())
            .add_item(
                session_id,
                &AddCartItem {
                    brand_id: brand.id,
                    quantity: Some(2),
                    price_cents: 5000,
                    metadata: None,
                },
            )
            .await
            .unwrap();
        (db, Arc::new(MetricsRegistry::new()))
    }

    fn payfast_client() -> PayFastClient {
        PayFastClient::new(PayFastConfig {
            merchant_id: "10000100".to_string(),
            merchant_key: "46f0cd694581a".to_string(),
            passphrase: Some(PASSPHRASE.to_string()),
            sandbox: true,
            return_url: None,
            cancel_url: None,
            notify_url: Some("https://shop.example/api/payments/payfast/notify".to_string()),
            validate_with_server: false,
        })
        .unwrap()
    }

    fn signed_itn(m_payment_id: &str, status: &str, amount: &str) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = [
            ("m_payment_id", m_payment_id),
            ("pf_payment_id", "1089250"),
            ("payment_status", status),
            ("item_name", "SeedGrow"),
            ("amount_gross", amount),
            ("merchant_id", "10000100"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let signature = generate_signature(&fields, Some(PASSPHRASE));
        fields.push(("signature".to_string(), signature));
        fields
    }

    #[tokio::test]
    async fn payfast_checkout_then_itn_completes_and_clears_cart() {
        let (db, metrics) = seeded("s1").await;
        let service = PaymentService::new(db.pool.clone(), "ZAR", metrics.clone())
            .with_payfast(Some(payfast_client()));

        let checkout = service
            .start_payfast_checkout("s1", Buyer::default(), None)
            .await
            .unwrap();
        assert_eq!(checkout.payment.status, PaymentStatus::Pending);
        assert_eq!(checkout.payment.amount_cents, 10000);
        let amount = checkout
            .form
            .fields
            .iter()
            .find(|(k, _)| k == "amount")
            .map(|(_, v)| v.as_str());
        assert_eq!(amount, Some("100.00"));
        assert_eq!(
            checkout.form.action_url,
            "https://sandbox.payfast.co.za/eng/process"
        );

        let itn = signed_itn(&checkout.payment.external_reference, "COMPLETE", "100.00");
        let settled = service.handle_payfast_itn(&itn).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Completed);
        assert_eq!(settled.provider_reference.as_deref(), Some("1089250"));
        assert!(CartService::new(db.pool.clone()).get_cart("s1").await.unwrap().is_empty());

        // a replayed notification is acknowledged without changes
        let replay = service.handle_payfast_itn(&itn).await.unwrap();
        assert_eq!(replay.status, PaymentStatus::Completed);

        assert_eq!(
            metrics.counter_value(
                metrics::PAYMENTS,
                &[("provider", "payfast"), ("status", "completed")]
            ),
            1
        );
        assert_eq!(
            metrics.counter_value(
                metrics::PAYMENT_NOTIFICATIONS,
                &[("provider", "payfast"), ("outcome", "accepted")]
            ),
            2
        );
    }

    #[tokio::test]
    async fn late_notification_does_not_override_a_settled_payment() {
        let (db, metrics) = seeded("s1").await;
        let service = PaymentService::new(db.pool.clone(), "ZAR", metrics.clone())
            .with_payfast(Some(payfast_client()));
        let checkout = service
            .start_payfast_checkout("s1", Buyer::default(), None)
            .await
            .unwrap();
        let stale = checkout.payment.clone();

        let itn = signed_itn(&stale.external_reference, "COMPLETE", "100.00");
        service.handle_payfast_itn(&itn).await.unwrap();

        // A second handler read the row while it was still pending.
        let result = service
            .settle(&stale, PaymentStatus::Failed, Some("late"))
            .await
            .unwrap();
        assert_eq!(result.status, PaymentStatus::Completed);
        assert_eq!(result.provider_reference.as_deref(), Some("1089250"));
        assert_eq!(service.get(stale.id).await.unwrap().status, PaymentStatus::Completed);
        assert_eq!(
            metrics.counter_value(
                metrics::PAYMENTS,
                &[("provider", "payfast"), ("status", "failed")]
            ),
            0
        );
    }

    #[tokio::test]
    async fn completion_keeps_items_added_after_checkout() {
        let (db, metrics) = seeded("s1").await;
        let service = PaymentService::new(db.pool.clone(), "ZAR", metrics)
            .with_payfast(Some(payfast_client()));
        let checkout = service
            .start_payfast_checkout("s1", Buyer::default(), None)
            .await
            .unwrap();

        let cart = CartService::new(db.pool.clone());
        let before = cart.get_cart("s1").await.unwrap();
        let seedgrow = before.items[0].brand_id;
        let sector_id = Brand::find_by_id(&db.pool, seedgrow)
            .await
            .unwrap()
            .unwrap()
            .sector_id;
        let extra = Brand::create(&db.pool, &CreateBrand::named("HarvestPro", sector_id))
            .await
            .unwrap();
        for (brand_id, quantity) in [(seedgrow, 1), (extra.id, 3)] {
            cart.add_item(
                "s1",
                &AddCartItem {
                    brand_id,
                    quantity: Some(quantity),
                    price_cents: 700,
                    metadata: None,
                },
            )
            .await
            .unwrap();
        }

        let itn = signed_itn(&checkout.payment.external_reference, "COMPLETE", "100.00");
        service.handle_payfast_itn(&itn).await.unwrap();

        let after = cart.get_cart("s1").await.unwrap();
        let left: Vec<(Uuid, i64)> = after.items.iter().map(|l| (l.brand_id, l.quantity)).collect();
        assert_eq!(left, vec![(seedgrow, 1), (extra.id, 3)]);
    }

    #[tokio::test]
    async fn payfast_itn_rejects_tampering() {
        let (db, metrics) = seeded("s1").await;
        let service = PaymentService::new(db.pool.clone(), "ZAR", metrics.clone())
            .with_payfast(Some(payfast_client()));
        let checkout = service
            .start_payfast_checkout("s1", Buyer::default(), Some("Custom".to_string()))
            .await
            .unwrap();
        let reference = checkout.payment.external_reference.clone();

        let mut forged = signed_itn(&reference, "COMPLETE", "100.00");
        forged[2].1 = "FAILED".to_string();
        assert!(matches!(
            service.handle_payfast_itn(&forged).await,
            Err(PaymentError::PayFast(PayFastError::SignatureMismatch))
        ));

        let underpaid = signed_itn(&reference, "COMPLETE", "1.00");
        assert!(matches!(
            service.handle_payfast_itn(&underpaid).await,
            Err(PaymentError::PayFast(PayFastError::AmountMismatch { .. }))
        ));

        let unknown = signed_itn("no-such-payment", "COMPLETE", "100.00");
        assert!(matches!(
            service.handle_payfast_itn(&unknown).await,
            Err(PaymentError::NotFound)
        ));

        assert_eq!(service.get(checkout.payment.id).await.unwrap().status, PaymentStatus::Pending);
        assert_eq!(
            metrics.counter_value(
                metrics::PAYMENT_NOTIFICATIONS,
                &[("provider", "payfast"), ("outcome", "rejected")]
            ),
            3
        );
    }

    #[tokio::test]
    async fn refuses_empty_carts_and_missing_providers() {
        let (db, metrics) = seeded("s1").await;
        let unconfigured = PaymentService::new(db.pool.clone(), "ZAR", metrics.clone());
        assert!(matches!(
            unconfigured.create_paypal_order("s1").await,
            Err(PaymentError::NotConfigured(PaymentProvider::Paypal))
        ));

        let service = unconfigured.with_payfast(Some(payfast_client()));
        assert!(matches!(
            service
                .start_payfast_checkout("empty", Buyer::default(), None)
                .await,
            Err(PaymentError::EmptyCart)
        ));
    }

    async fn spawn_paypal() -> String {
        let app = Router::new()
            .route(
                "/v1/oauth2/token",
                post(|| async { Json(json!({"access_token": "tok", "expires_in": 3600})) }),
            )
            .route(
                "/v2/checkout/orders",
                post(|| async {
                    Json(json!({
                        "id": "ORDER-1",
                        "status": "CREATED",
                        "links": [{"href": "https://paypal.test/approve", "rel": "approve"}]
                    }))
                }),
            )
            .route(
                "/v2/checkout/orders/{id}/capture",
                post(|Path(id): Path<String>| async move {
                    Json(json!({
                        "id": id,
                        "status": "COMPLETED",
                        "purchase_units": [{"payments": {"captures": [{"id": "CAP-9"}]}}]
                    }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn paypal_order_then_capture() {
        let (db, metrics) = seeded("s2").await;
        let base = spawn_paypal().await;
        let client = PayPalClient::with_base_url(
            PayPalConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                mode: PayPalMode::Sandbox,
            },
            base,
        )
        .unwrap();
        let service =
            PaymentService::new(db.pool.clone(), "usd", metrics).with_paypal(Some(client));

        let checkout = service.create_paypal_order("s2").await.unwrap();
        assert_eq!(checkout.order_id, "ORDER-1");
        assert_eq!(checkout.approve_url.as_deref(), Some("https://paypal.test/approve"));
        assert_eq!(checkout.payment.currency, "USD");
        assert_eq!(checkout.payment.metadata["approve_url"], Value::from("https://paypal.test/approve"));

        let captured = service.capture_paypal_order("ORDER-1").await.unwrap();
        assert_eq!(captured.status, PaymentStatus::Completed);
        assert_eq!(captured.provider_reference.as_deref(), Some("CAP-9"));
        assert!(CartService::new(db.pool.clone()).get_cart("s2").await.unwrap().is_empty());

        assert!(matches!(
            service.capture_paypal_order("ORDER-404").await,
            Err(PaymentError::NotFound)
        ));
    }
}
