//! Core types for Tradepost.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod line_item;
pub mod price;
pub mod status;

pub use id::*;
pub use line_item::{CartLineItem, ItemError, MAX_UNIT_PRICE};
pub use price::{CurrencyCode, Price};
pub use status::*;
