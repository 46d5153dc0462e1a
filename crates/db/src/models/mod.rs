pub mod brand;
pub mod cart_item;
pub mod legal_document;
pub mod payment;
pub mod sector;
