//! Writes the TypeScript declarations the frontend imports to
//! `shared/types.ts`. Run with `--check` in CI to fail on drift.

use std::{env, fs, path::PathBuf, process::ExitCode};

use db::models::{
    brand::{Brand, BrandFilter, BrandStatus, CreateBrand, UpdateBrand},
    cart_item::{AddCartItem, CartItem, CartItemWithBrand, UpdateCartItem},
    legal_document::{
        CreateLegalDocument, DocumentStatus, DocumentType, LegalDocument, SignLegalDocument,
    },
    payment::{Payment, PaymentProvider, PaymentStatus, PaymentStatusCount},
    sector::{CreateSector, Sector, SectorWithCounts, UpdateSector},
};
use server::routes::{
    cart::ClearCartResponse,
    health::HealthStatus,
    payments::{CreatePayPalOrderRequest, PayFastCheckoutRequest},
};
use services::services::{
    admin_stats::{AdminStats, BrandStatusCounts, SectorBreakdown},
    cart::CartSummary,
    cart_store::{CartState, LocalCartItem},
    legal::VerificationResult,
    payfast::{Buyer, CheckoutForm},
    payments::{PayFastCheckout, PayPalCheckout},
};
use ts_rs::TS;
use utils::response::ApiResponse;

/// ts-rs names `serde_json::Value` fields `JsonValue` without declaring it.
const JSON_VALUE_DECL: &str = "type JsonValue = number | string | boolean | Array<JsonValue> | { [key in string]?: JsonValue } | null;";

fn generate_types_content() -> String {
    let header = "// This file was generated by `generate_types`. Do not edit it by hand.\n\n";
    let decls = [
        JSON_VALUE_DECL.to_string(),
        ApiResponse::<()>::decl(),
        HealthStatus::decl(),
        Sector::decl(),
        SectorWithCounts::decl(),
        CreateSector::decl(),
        UpdateSector::decl(),
        BrandStatus::decl(),
        Brand::decl(),
        CreateBrand::decl(),
        UpdateBrand::decl(),
        BrandFilter::decl(),
        CartItem::decl(),
        CartItemWithBrand::decl(),
        AddCartItem::decl(),
        UpdateCartItem::decl(),
        CartSummary::decl(),
        ClearCartResponse::decl(),
        LocalCartItem::decl(),
        CartState::decl(),
        DocumentType::decl(),
        DocumentStatus::decl(),
        LegalDocument::decl(),
        CreateLegalDocument::decl(),
        SignLegalDocument::decl(),
        VerificationResult::decl(),
        PaymentProvider::decl(),
        PaymentStatus::decl(),
        Payment::decl(),
        PaymentStatusCount::decl(),
        Buyer::decl(),
        CheckoutForm::decl(),
        PayFastCheckout::decl(),
        PayPalCheckout::decl(),
        CreatePayPalOrderRequest::decl(),
        PayFastCheckoutRequest::decl(),
        BrandStatusCounts::decl(),
        SectorBreakdown::decl(),
        AdminStats::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|decl| format!("export {}", decl.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{header}{body}\n")
}

fn main() -> ExitCode {
    let check_mode = env::args().any(|arg| arg == "--check");
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shared/types.ts");
    let generated = generate_types_content();

    if check_mode {
        let current = fs::read_to_string(&path).unwrap_or_default();
        if current == generated {
            println!("shared/types.ts is up to date.");
            return ExitCode::SUCCESS;
        }
        eprintln!("shared/types.ts is stale; run `cargo run --bin generate_types`.");
        return ExitCode::FAILURE;
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("failed to create {}: {e}", parent.display());
            return ExitCode::FAILURE;
        }
    }
    match fs::write(&path, generated) {
        Ok(()) => {
            println!("Wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to write {}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
