//! Cart line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ProductId;

/// Largest accepted unit price. Keeps every cart total far inside
/// `Decimal`'s range.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Errors that can occur when building a [`CartLineItem`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// Quantity must be at least one; removal is the deletion path.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    /// Unit prices cannot be negative.
    #[error("price cannot be negative (got {0})")]
    NegativePrice(Decimal),
    /// Unit price above [`MAX_UNIT_PRICE`].
    #[error("price exceeds {MAX_UNIT_PRICE} (got {0})")]
    PriceTooLarge(Decimal),
    /// Product IDs cannot be blank.
    #[error("product id cannot be empty")]
    EmptyProductId,
}

/// One product entry in a cart.
///
/// ## Constraints
///
/// - `quantity >= 1`
/// - `0 <= price <= MAX_UNIT_PRICE`
/// - the line total is always `price * quantity`; it is computed, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LineItemRecord", into = "LineItemRecord")]
pub struct CartLineItem {
    product_id: ProductId,
    name: String,
    sku: Option<String>,
    image: Option<String>,
    price: Decimal,
    quantity: u32,
}

impl CartLineItem {
    /// Create a validated line item.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError`] for a zero quantity, a negative or out-of-range
    /// price, or a blank product id.
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        price: Decimal,
        quantity: u32,
    ) -> Result<Self, ItemError> {
        if product_id.as_str().trim().is_empty() {
            return Err(ItemError::EmptyProductId);
        }
        if quantity == 0 {
            return Err(ItemError::ZeroQuantity);
        }
        if price.is_sign_negative() && !price.is_zero() {
            return Err(ItemError::NegativePrice(price));
        }
        if price > MAX_UNIT_PRICE {
            return Err(ItemError::PriceTooLarge(price));
        }
        Ok(Self {
            product_id,
            name: name.into(),
            sku: None,
            image: None,
            price,
            quantity,
        })
    }

    /// Attach a SKU.
    #[must_use]
    pub fn with_sku(mut self, sku: Option<String>) -> Self {
        self.sku = sku;
        self
    }

    /// Attach an image URL.
    #[must_use]
    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Unit price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Line total, `price * quantity`, unrounded.
    #[must_use]
    pub fn total(&self) -> Decimal {
        crate::pricing::line_total(self.price, self.quantity)
    }

    /// Replace the quantity.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::ZeroQuantity`] if `quantity` is zero.
    pub const fn set_quantity(&mut self, quantity: u32) -> Result<(), ItemError> {
        if quantity == 0 {
            return Err(ItemError::ZeroQuantity);
        }
        self.quantity = quantity;
        Ok(())
    }
}

/// Serialized form of a line item; validated on the way in.
#[derive(Serialize, Deserialize)]
struct LineItemRecord {
    product_id: ProductId,
    name: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    image: Option<String>,
    price: Decimal,
    quantity: u32,
}

impl TryFrom<LineItemRecord> for CartLineItem {
    type Error = ItemError;

    fn try_from(record: LineItemRecord) -> Result<Self, Self::Error> {
        Ok(Self::new(record.product_id, record.name, record.price, record.quantity)?
            .with_sku(record.sku)
            .with_image(record.image))
    }
}

impl From<CartLineItem> for LineItemRecord {
    fn from(item: CartLineItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name,
            sku: item.sku,
            image: item.image,
            price: item.price,
            quantity: item.quantity,
        }
    }
}
