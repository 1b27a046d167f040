//! Status enums for backend entities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Order status as reported by the backend.
///
/// Unknown values are kept verbatim in [`OrderStatus::Other`] so a new
/// backend status never breaks deserialization of an order confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    #[serde(untagged)]
    Other(String),
}

/// B2B quote request status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Pending,
    Reviewed,
    Accepted,
    Rejected,
    Expired,
    #[serde(untagged)]
    Other(String),
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QuoteStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_known_value() {
        let status: OrderStatus = serde_json::from_str("\"confirmed\"").expect("parse");
        assert_eq!(status, OrderStatus::Confirmed);
    }

    #[test]
    fn test_order_status_unknown_value_is_kept() {
        let status: OrderStatus = serde_json::from_str("\"awaiting_payment\"").expect("parse");
        assert_eq!(status, OrderStatus::Other("awaiting_payment".to_string()));
        assert_eq!(status.to_string(), "awaiting_payment");
    }

    #[test]
    fn test_quote_status_roundtrip_name() {
        let json = serde_json::to_string(&QuoteStatus::Pending).expect("serialize");
        assert_eq!(json, "\"pending\"");
    }
}
