//! Tradepost Core - Shared types and the price engine.
//!
//! This crate provides the types used across all Tradepost components:
//! - `storefront` - Cart store, checkout orchestration and the backend gateway
//! - `cli` - Command-line front end over the persisted cart
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, statuses and cart line items
//! - [`pricing`] - Subtotal, VAT and grand total computation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;

pub use pricing::{PricingError, Totals, VatRate, compute_totals};
pub use types::*;
