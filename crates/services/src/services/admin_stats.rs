//! Aggregate figures for the admin panel.

use db::models::{
    brand::{Brand, BrandStatus},
    cart_item::CartItem,
    legal_document::{DocumentStatus, LegalDocument},
    payment::{Payment, PaymentStatusCount},
    sector::Sector,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use ts_rs::TS;
use utils::money::format_cents;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct BrandStatusCounts {
    #[ts(type = "number")]
    pub active: i64,
    #[ts(type = "number")]
    pub inactive: i64,
    #[ts(type = "number")]
    pub pending: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SectorBreakdown {
    pub sector_id: Uuid,
    pub name: String,
    pub emoji: String,
    #[ts(type = "number")]
    pub brand_count: i64,
    #[ts(type = "number")]
    pub subnode_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AdminStats {
    #[ts(type = "number")]
    pub total_sectors: i64,
    #[ts(type = "number")]
    pub total_brands: i64,
    pub brands_by_status: BrandStatusCounts,
    #[ts(type = "number")]
    pub cart_items: i64,
    #[ts(type = "number")]
    pub active_carts: i64,
    #[ts(type = "number")]
    pub legal_documents: i64,
    #[ts(type = "number")]
    pub signed_legal_documents: i64,
    pub payments_by_status: Vec<PaymentStatusCount>,
    #[ts(type = "number")]
    pub revenue_cents: i64,
    pub revenue: String,
    pub sectors: Vec<SectorBreakdown>,
}

impl AdminStats {
    pub async fn collect(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut brands_by_status = BrandStatusCounts::default();
        for (status, count) in Brand::count_by_status(pool).await? {
            match status {
                BrandStatus::Active => brands_by_status.active = count,
                BrandStatus::Inactive => brands_by_status.inactive = count,
                BrandStatus::Pending => brands_by_status.pending = count,
            }
        }

        let documents = LegalDocument::count_by_status(pool).await?;
        let legal_documents = documents.iter().map(|(_, c)| c).sum();
        let signed_legal_documents = documents
            .iter()
            .filter(|(status, _)| *status == DocumentStatus::Signed)
            .map(|(_, c)| c)
            .sum();

        let sectors: Vec<SectorBreakdown> = Sector::find_all(pool)
            .await?
            .into_iter()
            .map(|s| SectorBreakdown {
                sector_id: s.sector.id,
                name: s.sector.name,
                emoji: s.sector.emoji,
                brand_count: s.brand_count,
                subnode_count: s.subnode_count,
            })
            .collect();

        let revenue_cents = Payment::completed_revenue_cents(pool).await?;

        Ok(Self {
            total_sectors: sectors.len() as i64,
            total_brands: brands_by_status.active
                + brands_by_status.inactive
                + brands_by_status.pending,
            brands_by_status,
            cart_items: CartItem::count(pool).await?,
            active_carts: CartItem::count_sessions(pool).await?,
            legal_documents,
            signed_legal_documents,
            payments_by_status: Payment::count_by_status(pool).await?,
            revenue_cents,
            revenue: format_cents(revenue_cents),
            sectors,
        })
    }
}
