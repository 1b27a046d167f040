//! User-facing error handling with Sentry integration.
//!
//! Every failure the cart store or checkout orchestrator reports is a
//! [`CartError`]. Its [`ErrorKind`] tells the caller how to react (redirect to
//! sign-in, offer a retry, show the backend's message) and
//! [`CartError::user_message`] is the only text meant for display. Raw HTTP
//! bodies and transport details stay in logs.

use thiserror::Error;

use crate::gateway::GatewayError;

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No bearer token, or the backend rejected it. Redirect to sign-in.
    AuthRequired,
    /// The backend could not be reached. Retryable; cart unchanged.
    NetworkUnavailable,
    /// The backend or local validation refused the request with a message.
    BusinessRejection,
    /// Something unexpected, such as a malformed backend payload.
    Unexpected,
}

/// Errors surfaced by the cart store and checkout orchestrator.
#[derive(Debug, Clone, Error)]
pub enum CartError {
    /// No session token is available.
    #[error("authentication required")]
    AuthRequired,

    /// Quantity must be at least one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Rate limited by the backend.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The backend refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The backend returned data that could not be used.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl CartError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthRequired => ErrorKind::AuthRequired,
            Self::Unavailable(_) | Self::RateLimited(_) => ErrorKind::NetworkUnavailable,
            Self::InvalidQuantity | Self::Rejected(_) => ErrorKind::BusinessRejection,
            Self::InvalidResponse(_) => ErrorKind::Unexpected,
        }
    }

    /// Whether retrying the same action may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::NetworkUnavailable)
    }

    /// Message safe to show to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Please sign in to continue.".to_string(),
            Self::InvalidQuantity => "Quantity must be at least 1.".to_string(),
            Self::Unavailable(_) => {
                "We couldn't reach the store. Check your connection and try again.".to_string()
            }
            Self::RateLimited(secs) => {
                format!("Too many requests. Please try again in {secs} seconds.")
            }
            Self::Rejected(message) => message.clone(),
            Self::InvalidResponse(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<GatewayError> for CartError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network(detail) => Self::Unavailable(detail),
            GatewayError::Unauthorized(_) => Self::AuthRequired,
            GatewayError::RateLimited(secs) => Self::RateLimited(secs),
            GatewayError::Rejected { message, .. } => Self::Rejected(message),
            GatewayError::Parse(detail) => Self::InvalidResponse(detail),
        }
    }
}

/// Log an error at the level its kind deserves, capturing unexpected ones to
/// Sentry.
pub fn report(context: &str, err: &CartError) {
    match err.kind() {
        ErrorKind::Unexpected => {
            let event_id = sentry::capture_error(err);
            tracing::error!(
                error = %err,
                sentry_event_id = %event_id,
                "{context} failed"
            );
        }
        ErrorKind::NetworkUnavailable => tracing::warn!(error = %err, "{context} failed"),
        ErrorKind::AuthRequired | ErrorKind::BusinessRejection => {
            tracing::info!(error = %err, "{context} refused");
        }
    }
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// actions leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "sku-1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_mapping() {
        let err = CartError::from(GatewayError::Network("connection refused".to_string()));
        assert_eq!(err.kind(), ErrorKind::NetworkUnavailable);
        assert!(err.is_retryable());

        let err = CartError::from(GatewayError::Unauthorized("expired".to_string()));
        assert_eq!(err.kind(), ErrorKind::AuthRequired);

        let err = CartError::from(GatewayError::Rejected {
            status: 422,
            message: "Invalid quantity".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::BusinessRejection);
        assert!(!err.is_retryable());

        let err = CartError::from(GatewayError::Parse("EOF".to_string()));
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn test_rejection_message_is_verbatim() {
        let err = CartError::Rejected("Cart is closed".to_string());
        assert_eq!(err.user_message(), "Cart is closed");
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = CartError::Unavailable("tcp connect error: 10.0.0.3:443".to_string());
        assert!(!err.user_message().contains("10.0.0.3"));

        let err = CartError::InvalidResponse("expected value at line 1 column 1".to_string());
        assert!(!err.user_message().contains("line 1"));
    }
}
