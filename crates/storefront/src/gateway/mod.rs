//! Backend gateway for cart, order and quote operations.
//!
//! # Architecture
//!
//! - The backend is the source of truth for prices and order totals; the
//!   local cart is a mirror that the [`CartStore`](crate::cart::CartStore)
//!   reconciles against server snapshots
//! - [`CartGateway`] is the seam: [`HttpGateway`] talks REST over `reqwest`,
//!   tests plug in in-memory fakes
//! - Every call takes the bearer token explicitly; callers check for a token
//!   before calling
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | add item | `POST /cart/items` |
//! | remove item | `DELETE /cart/items/{product_id}` |
//! | fetch cart | `GET /cart` |
//! | clear cart | `DELETE /cart` |
//! | create order | `POST /orders` |
//! | create quote | `POST /quotes` |

mod http;
pub mod types;

use std::future::Future;

use secrecy::SecretString;
use thiserror::Error;
use uuid::Uuid;

use tradepost_core::ProductId;

pub use http::HttpGateway;
pub use types::*;

/// Longest raw-text error body passed through to users.
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The backend could not be reached (connect failure, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The bearer token was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The backend answered with a non-success status and a message.
    #[error("API error: {status} - {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Normalized error message.
        message: String,
    },

    /// A success response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Contract the cart/checkout core consumes from the backend.
///
/// Implementations must be cheap to share; the store and the checkout
/// orchestrator each hold a handle.
pub trait CartGateway: Send + Sync {
    /// Add `quantity` units of a product; returns the server cart.
    fn add_item(
        &self,
        token: &SecretString,
        request: &AddItemRequest,
    ) -> impl Future<Output = Result<RemoteCart, GatewayError>> + Send;

    /// Remove a product line; returns the server cart.
    fn remove_item(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<RemoteCart, GatewayError>> + Send;

    /// Fetch the server cart.
    fn fetch_cart(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<RemoteCart, GatewayError>> + Send;

    /// Empty the server cart.
    fn clear_cart(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Turn the server cart into an order.
    fn create_order(
        &self,
        token: &SecretString,
        request: &OrderRequest,
        idempotency_key: Uuid,
    ) -> impl Future<Output = Result<OrderConfirmation, GatewayError>> + Send;

    /// Submit a B2B quote request.
    fn create_quote(
        &self,
        token: &SecretString,
        request: &QuoteRequest,
        idempotency_key: Uuid,
    ) -> impl Future<Output = Result<QuoteConfirmation, GatewayError>> + Send;
}

/// Reduce an error response body to a single message.
///
/// Handles the shapes the backend is known to produce: `{"message": ..}`,
/// `{"error": ..}` (string or nested object), `{"details": ..}` (string or list),
/// a bare JSON string, and raw text. Malformed JSON, HTML pages and empty
/// bodies fall back to `fallback`.
#[must_use]
pub fn normalize_error_body(body: &str, fallback: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => message_from_json(&value).unwrap_or_else(|| fallback.to_string()),
        // Looks like JSON but isn't, or is an HTML error page
        Err(_) if trimmed.starts_with(['{', '[', '<']) => fallback.to_string(),
        Err(_) => truncate(trimmed),
    }
}

fn message_from_json(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(truncate(s.trim())),
        serde_json::Value::Array(values) => {
            let parts: Vec<String> = values.iter().filter_map(message_from_json).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        serde_json::Value::Object(map) => ["message", "error", "details", "detail"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(message_from_json),
        _ => None,
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "Bad Request";

    #[test]
    fn test_message_field() {
        let msg = normalize_error_body(r#"{"message":"Quantity exceeds stock"}"#, FALLBACK);
        assert_eq!(msg, "Quantity exceeds stock");
    }

    #[test]
    fn test_error_field() {
        let msg = normalize_error_body(r#"{"error":"Cart is closed"}"#, FALLBACK);
        assert_eq!(msg, "Cart is closed");
    }

    #[test]
    fn test_nested_error_object() {
        let msg = normalize_error_body(r#"{"error":{"code":42,"message":"Nope"}}"#, FALLBACK);
        assert_eq!(msg, "Nope");
    }

    #[test]
    fn test_details_list() {
        let msg = normalize_error_body(
            r#"{"details":["quantity must be positive","product inactive"]}"#,
            FALLBACK,
        );
        assert_eq!(msg, "quantity must be positive; product inactive");
    }

    #[test]
    fn test_message_takes_precedence_over_details() {
        let msg = normalize_error_body(
            r#"{"details":"field x","message":"Validation failed"}"#,
            FALLBACK,
        );
        assert_eq!(msg, "Validation failed");
    }

    #[test]
    fn test_raw_text() {
        let msg = normalize_error_body("  Service temporarily closed \n", FALLBACK);
        assert_eq!(msg, "Service temporarily closed");
    }

    #[test]
    fn test_malformed_json_falls_back() {
        assert_eq!(normalize_error_body(r#"{"message": "#, FALLBACK), FALLBACK);
    }

    #[test]
    fn test_html_falls_back() {
        let body = "<html><body><h1>502 Bad Gateway</h1></body></html>";
        assert_eq!(normalize_error_body(body, FALLBACK), FALLBACK);
    }

    #[test]
    fn test_json_without_known_fields_falls_back() {
        assert_eq!(normalize_error_body(r#"{"code":500}"#, FALLBACK), FALLBACK);
        assert_eq!(normalize_error_body("", FALLBACK), FALLBACK);
    }

    #[test]
    fn test_long_text_is_truncated() {
        let body = "x".repeat(500);
        let msg = normalize_error_body(&body, FALLBACK);
        assert_eq!(msg.chars().count(), MAX_ERROR_MESSAGE_CHARS + 1);
        assert!(msg.ends_with('…'));
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Rejected {
            status: 422,
            message: "Invalid quantity".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 422 - Invalid quantity");

        let err = GatewayError::RateLimited(30);
        assert_eq!(err.to_string(), "rate limited, retry after 30 seconds");
    }
}
