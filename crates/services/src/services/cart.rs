//! Server-side cart operations keyed by session (or user) id.

use db::models::{
    brand::Brand,
    cart_item::{
        AddCartItem, CartItem, CartItemWithBrand, MAX_LINE_QUANTITY, MAX_UNIT_PRICE_CENTS,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use utils::money::format_cents;
use uuid::Uuid;

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid session id")]
    InvalidSession,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("quantity cannot be negative")]
    NegativeQuantity,
    #[error("quantity cannot exceed 10000")]
    QuantityTooLarge,
    #[error("price must be between 0 and 1000000000 cents")]
    InvalidPrice,
    #[error("cart total is too large")]
    TotalOverflow,
    #[error("brand not found")]
    BrandNotFound,
    #[error("cart item not found")]
    ItemNotFound,
}

/// Cart contents plus totals.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CartSummary {
    pub session_id: String,
    pub items: Vec<CartItemWithBrand>,
    #[ts(type = "number")]
    pub item_count: i64,
    #[ts(type = "number")]
    pub total_cents: i64,
    pub total: String,
}

impl CartSummary {
    pub fn from_items(
        session_id: impl Into<String>,
        items: Vec<CartItemWithBrand>,
    ) -> Result<Self, CartError> {
        let mut item_count: i64 = 0;
        let mut total_cents: i64 = 0;
        for item in &items {
            item_count = item_count
                .checked_add(item.quantity)
                .ok_or(CartError::TotalOverflow)?;
            total_cents = item
                .line_total_cents()
                .and_then(|line| total_cents.checked_add(line))
                .ok_or(CartError::TotalOverflow)?;
        }
        Ok(Self {
            session_id: session_id.into(),
            items,
            item_count,
            total_cents,
            total: format_cents(total_cents),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Line ids and quantities as they stand now, for removal after payment.
    pub fn purchased_lines(&self) -> Vec<PurchasedLine> {
        self.items
            .iter()
            .map(|line| PurchasedLine {
                id: line.id,
                quantity: line.quantity,
            })
            .collect()
    }
}

/// A cart line captured at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedLine {
    pub id: Uuid,
    pub quantity: i64,
}

pub struct CartService {
    pool: SqlitePool,
}

impl CartService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_cart(&self, session_id: &str) -> Result<CartSummary, CartError> {
        let session_id = validate_session(session_id)?;
        let items = CartItem::find_by_session(&self.pool, session_id).await?;
        CartSummary::from_items(session_id, items)
    }

    /// Add a brand to the cart. Adding a brand already present adds to its quantity.
    pub async fn add_item(
        &self,
        session_id: &str,
        payload: &AddCartItem,
    ) -> Result<CartItem, CartError> {
        let session_id = validate_session(session_id)?;
        let quantity = payload.quantity.unwrap_or(1);
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityTooLarge);
        }
        if !(0..=MAX_UNIT_PRICE_CENTS).contains(&payload.price_cents) {
            return Err(CartError::InvalidPrice);
        }
        if Brand::find_by_id(&self.pool, payload.brand_id).await?.is_none() {
            return Err(CartError::BrandNotFound);
        }

        let metadata = payload
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let item = CartItem::add_or_increment(
            &self.pool,
            session_id,
            payload.brand_id,
            quantity,
            payload.price_cents,
            &metadata,
        )
        .await?
        .ok_or(CartError::QuantityTooLarge)?;

        info!(
            session_id = %session_id,
            brand_id = %payload.brand_id,
            quantity = item.quantity,
            "Cart: item added"
        );
        Ok(item)
    }

    /// Set the quantity of a line. Zero removes the line and returns `None`.
    pub async fn update_quantity(
        &self,
        session_id: &str,
        item_id: Uuid,
        quantity: i64,
    ) -> Result<Option<CartItem>, CartError> {
        let session_id = validate_session(session_id)?;
        if quantity < 0 {
            return Err(CartError::NegativeQuantity);
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityTooLarge);
        }
        if quantity == 0 {
            self.remove_item(session_id, item_id).await?;
            return Ok(None);
        }

        let item = CartItem::update_quantity(&self.pool, session_id, item_id, quantity)
            .await?
            .ok_or(CartError::ItemNotFound)?;
        debug!(session_id = %session_id, item_id = %item_id, quantity, "Cart: quantity updated");
        Ok(Some(item))
    }

    pub async fn remove_item(&self, session_id: &str, item_id: Uuid) -> Result<(), CartError> {
        let session_id = validate_session(session_id)?;
        let removed = CartItem::delete(&self.pool, session_id, item_id).await?;
        if removed == 0 {
            return Err(CartError::ItemNotFound);
        }
        info!(session_id = %session_id, item_id = %item_id, "Cart: item removed");
        Ok(())
    }

    /// Remove what was bought from the cart. Lines added or topped up after
    /// checkout keep the extra quantity.
    pub async fn remove_purchased(
        &self,
        session_id: &str,
        lines: &[PurchasedLine],
    ) -> Result<u64, CartError> {
        let session_id = validate_session(session_id)?;
        let mut touched = 0;
        for line in lines {
            touched +=
                CartItem::remove_quantity(&self.pool, session_id, line.id, line.quantity).await?;
        }
        info!(session_id = %session_id, touched, "Cart: purchased lines removed");
        Ok(touched)
    }

    pub async fn clear(&self, session_id: &str) -> Result<u64, CartError> {
        let session_id = validate_session(session_id)?;
        let removed = CartItem::clear_session(&self.pool, session_id).await?;
        info!(session_id = %session_id, removed, "Cart: cleared");
        Ok(removed)
    }
}

fn validate_session(session_id: &str) -> Result<&str, CartError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SESSION_ID_LEN {
        return Err(CartError::InvalidSession);
    }
    Ok(trimmed)
}
