//! Storefront domain: value objects, aggregates, loyalty rules and events.
pub mod aggregates;
pub mod events;
pub mod loyalty;
pub mod value_objects;
