//! Aggregates module
pub mod cart;
pub mod customer;
pub mod order;
pub mod product;

pub use cart::{CartError, CartItem, CartStore, LineKey, NewCartItem};
pub use customer::{Registration, RegistrationBonus, UserProfile};
pub use order::{
    CustomerInfo, Delivery, DeliveryMethod, Order, OrderDraft, OrderError, OrderLine, OrderStatus,
    OrderTotals, Payment, PaymentMethod, PostalAddress,
};
pub use product::{collect_violations, CategoryKey, CategorySchema, FieldSpec, FieldViolation, ProductDraft};
