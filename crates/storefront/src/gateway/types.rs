//! Wire types for the backend REST API.
//!
//! These mirror the JSON the backend sends and receives. Conversion into
//! validated domain types happens in [`RemoteCart::into_line_items`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tradepost_core::{
    CartLineItem, ItemError, OrderId, OrderStatus, ProductId, QuoteId, QuoteStatus,
};

// =============================================================================
// Cart Types
// =============================================================================

/// Body of `POST /cart/items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A line in the server cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCartLine {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Unit price; the backend sends either a JSON string or a number.
    pub price: Decimal,
    pub quantity: u32,
}

/// Snapshot of the server cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteCart {
    #[serde(default)]
    pub items: Vec<RemoteCartLine>,
}

impl RemoteCart {
    /// Convert server lines into validated line items, keeping server order.
    ///
    /// Lines reporting a zero quantity are dropped. Repeated product IDs are
    /// folded into the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError`] if a line carries a negative price or blank id.
    pub fn into_line_items(self) -> Result<Vec<CartLineItem>, ItemError> {
        let mut items: Vec<CartLineItem> = Vec::with_capacity(self.items.len());

        for line in self.items {
            if line.quantity == 0 {
                warn!(product_id = %line.product_id, "Dropping zero-quantity line from server cart");
                continue;
            }

            if let Some(existing) = items
                .iter_mut()
                .find(|item| item.product_id() == &line.product_id)
            {
                let merged = existing.quantity().saturating_add(line.quantity);
                existing.set_quantity(merged)?;
                continue;
            }

            items.push(
                CartLineItem::new(line.product_id, line.name, line.price, line.quantity)?
                    .with_sku(line.sku)
                    .with_image(line.image),
            );
        }

        Ok(items)
    }
}

// =============================================================================
// Checkout Types
// =============================================================================

/// Body of `POST /orders`.
///
/// Prices and lines are recomputed by the backend from its own cart; only
/// the shipping choice travels from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub shipping_method: String,
}

/// A product/quantity pair in a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of `POST /quotes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<QuoteItem>,
    pub notes: String,
}

/// A line of a created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Response of `POST /orders`.
///
/// `total_amount` is the authoritative order total; the client-side totals
/// shown before checkout are estimates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub id: OrderId,
    #[serde(default)]
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

/// Response of `POST /quotes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteConfirmation {
    pub id: QuoteId,
    #[serde(default)]
    pub status: QuoteStatus,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_cart_accepts_string_and_number_prices() {
        let json = r#"{
            "items": [
                {"product_id": "A", "name": "Anvil", "price": "24.99", "quantity": 2},
                {"product_id": "B", "name": "Bucket", "sku": "BK-1", "price": 45.5, "quantity": 1}
            ]
        }"#;
        let cart: RemoteCart = serde_json::from_str(json).unwrap();
        let items = cart.into_line_items().unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price(), Decimal::new(2499, 2));
        assert_eq!(items[1].price(), Decimal::new(455, 1));
        assert_eq!(items[1].sku(), Some("BK-1"));
    }

    #[test]
    fn test_zero_quantity_lines_are_dropped() {
        let json = r#"{"items": [{"product_id": "A", "name": "Anvil", "price": "1", "quantity": 0}]}"#;
        let cart: RemoteCart = serde_json::from_str(json).unwrap();
        assert!(cart.into_line_items().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_lines_are_folded() {
        let json = r#"{"items": [
            {"product_id": "A", "name": "Anvil", "price": "1", "quantity": 2},
            {"product_id": "A", "name": "Anvil", "price": "1", "quantity": 3}
        ]}"#;
        let cart: RemoteCart = serde_json::from_str(json).unwrap();
        let items = cart.into_line_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity(), 5);
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let json = r#"{"items": [{"product_id": "A", "name": "Anvil", "price": "-1.00", "quantity": 1}]}"#;
        let cart: RemoteCart = serde_json::from_str(json).unwrap();
        assert!(matches!(
            cart.into_line_items(),
            Err(ItemError::NegativePrice(_))
        ));
    }

    #[test]
    fn test_missing_items_is_empty_cart() {
        let cart: RemoteCart = serde_json::from_str("{}").unwrap();
        assert!(cart.items.is_empty());
    }

    #[test]
    fn test_order_confirmation_parses() {
        let json = r#"{
            "id": "ord_1001",
            "status": "pending",
            "total_amount": "115.53",
            "created_at": "2026-03-01T12:00:00Z",
            "items": [{"product_id": "A", "quantity": 2}]
        }"#;
        let order: OrderConfirmation = serde_json::from_str(json).unwrap();
        assert_eq!(order.id.as_str(), "ord_1001");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Decimal::new(11553, 2));
        assert_eq!(order.items.len(), 1);
    }

    #[test]
    fn test_quote_request_serializes_snake_case() {
        let request = QuoteRequest {
            items: vec![QuoteItem {
                product_id: ProductId::new("A"),
                quantity: 3,
            }],
            notes: "Need by Friday".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "items": [{"product_id": "A", "quantity": 3}],
                "notes": "Need by Friday"
            })
        );
    }
}
