//! Price engine: subtotal, VAT and grand total for a set of line items.
//!
//! Everything here is pure and synchronous. Rounding is half away from zero
//! to two decimal places and happens once on the summed subtotal, never per
//! line, so rounding error does not compound across lines.
//!
//! Arithmetic saturates instead of panicking. Validated line items never get
//! near the limit (see [`MAX_UNIT_PRICE`](crate::types::MAX_UNIT_PRICE)).

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::CartLineItem;

/// Decimal places used for every monetary result.
const MONEY_SCALE: u32 = 2;

/// Errors produced by the price engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// VAT rate outside `0..=1`.
    #[error("VAT rate must be between 0 and 1 (got {0})")]
    InvalidVatRate(Decimal),
    /// VAT rate string could not be parsed.
    #[error("invalid VAT rate '{0}'")]
    Unparseable(String),
}

/// A VAT rate expressed as a fraction (0.21 for 21%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct VatRate(Decimal);

impl VatRate {
    /// Create a VAT rate.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidVatRate`] when `rate` is negative or
    /// greater than one.
    pub fn new(rate: Decimal) -> Result<Self, PricingError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(PricingError::InvalidVatRate(rate));
        }
        Ok(Self(rate))
    }

    /// The rate as a fraction.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl Default for VatRate {
    fn default() -> Self {
        Self(Decimal::new(21, 2))
    }
}

impl fmt::Display for VatRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

impl FromStr for VatRate {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rate = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| PricingError::Unparseable(s.to_string()))?;
        Self::new(rate)
    }
}

impl TryFrom<Decimal> for VatRate {
    type Error = PricingError;

    fn try_from(rate: Decimal) -> Result<Self, Self::Error> {
        Self::new(rate)
    }
}

impl From<VatRate> for Decimal {
    fn from(rate: VatRate) -> Self {
        rate.0
    }
}

/// Derived totals for display.
///
/// These are client-side estimates; the backend recomputes the authoritative
/// amounts when an order is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub grand_total: Decimal,
}

/// Round a monetary amount to two decimals, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Unrounded `price * quantity`.
#[must_use]
pub fn line_total(price: Decimal, quantity: u32) -> Decimal {
    price.saturating_mul(Decimal::from(quantity))
}

/// Sum of line totals, rounded once.
#[must_use]
pub fn subtotal(items: &[CartLineItem]) -> Decimal {
    round_money(
        items
            .iter()
            .map(CartLineItem::total)
            .fold(Decimal::ZERO, Decimal::saturating_add),
    )
}

/// Total number of units across all lines.
#[must_use]
pub fn item_count(items: &[CartLineItem]) -> u64 {
    items.iter().map(|item| u64::from(item.quantity())).sum()
}

/// Compute subtotal, VAT and grand total.
///
/// Empty input yields all zeros.
#[must_use]
pub fn compute_totals(items: &[CartLineItem], vat_rate: VatRate) -> Totals {
    let subtotal = subtotal(items);
    let vat = round_money(subtotal.saturating_mul(vat_rate.as_decimal()));
    Totals {
        subtotal,
        vat,
        grand_total: subtotal.saturating_add(vat),
    }
}
