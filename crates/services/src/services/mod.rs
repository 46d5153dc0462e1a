pub mod admin_stats;
pub mod button_scanner;
pub mod cart;
pub mod cart_store;
pub mod legal;
pub mod metrics;
pub mod payfast;
pub mod payments;
pub mod paypal;
