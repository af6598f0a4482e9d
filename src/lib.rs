//! Adress beauty storefront backend
//!
//! Bilingual (RO/RU) shop for lash and brow supplies.
//!
//! ## Features
//! - Shopping cart per client session
//! - Loyalty tiers and registration bonus discounts
//! - Checkout with cash, bank transfer or MAIB card payment
//! - Idempotent payment confirmation
//! - Admin catalog editor over per-category product tables
//! - LEI / RON / EUR price display

pub mod api;
pub mod config;
pub mod domain;
pub mod locale;
pub mod payment;
pub mod persistence;
pub mod services;
pub mod session;
pub mod storage;

pub use api::{router, AppState};
pub use config::AppConfig;
