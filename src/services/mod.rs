//! Application services over the row store and the payment gateway.
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod orders;
