//! REST implementation of [`CartGateway`] over `reqwest`.

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use tradepost_core::ProductId;

use crate::config::ApiConfig;

use super::{
    AddItemRequest, CartGateway, GatewayError, OrderConfirmation, OrderRequest,
    QuoteConfirmation, QuoteRequest, RemoteCart, normalize_error_body,
};

/// Header carrying the per-submission idempotency key on checkout calls.
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Characters of an unparseable body kept in logs.
const LOG_BODY_CHARS: usize = 500;

/// Client for the backend cart, order and quote endpoints.
#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<HttpGatewayInner>,
}

struct HttpGatewayInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGateway {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("tradepost/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpGatewayInner {
                client,
                base_url: config.base_url.clone(),
            }),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Parse(format!("invalid base URL: {}", self.inner.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and decode a JSON body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = check_status(request.send().await?).await?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(LOG_BODY_CHARS).collect::<String>(),
                "Failed to parse backend response"
            );
            GatewayError::Parse(e.to_string())
        })
    }
}

/// Map non-success responses into [`GatewayError`].
async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(GatewayError::RateLimited(retry_after));
    }

    let fallback = status
        .canonical_reason()
        .map_or_else(|| format!("Request failed ({status})"), str::to_string);
    let body = response.text().await.unwrap_or_default();
    let message = normalize_error_body(&body, &fallback);

    if status == StatusCode::UNAUTHORIZED {
        return Err(GatewayError::Unauthorized(message));
    }

    warn!(status = %status, message = %message, "Backend rejected request");
    Err(GatewayError::Rejected {
        status: status.as_u16(),
        message,
    })
}

impl CartGateway for HttpGateway {
    #[instrument(skip(self, token), fields(product_id = %request.product_id, quantity = request.quantity))]
    async fn add_item(
        &self,
        token: &SecretString,
        request: &AddItemRequest,
    ) -> Result<RemoteCart, GatewayError> {
        let url = self.endpoint(&["cart", "items"])?;
        let builder = self
            .inner
            .client
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(request);
        self.send_json(builder).await
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn remove_item(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<RemoteCart, GatewayError> {
        let url = self.endpoint(&["cart", "items", product_id.as_str()])?;
        let builder = self
            .inner
            .client
            .delete(url)
            .bearer_auth(token.expose_secret());
        self.send_json(builder).await
    }

    #[instrument(skip(self, token))]
    async fn fetch_cart(&self, token: &SecretString) -> Result<RemoteCart, GatewayError> {
        let url = self.endpoint(&["cart"])?;
        let builder = self.inner.client.get(url).bearer_auth(token.expose_secret());
        self.send_json(builder).await
    }

    #[instrument(skip(self, token))]
    async fn clear_cart(&self, token: &SecretString) -> Result<(), GatewayError> {
        let url = self.endpoint(&["cart"])?;
        let response = self
            .inner
            .client
            .delete(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        check_status(response).await?;
        debug!("Server cart cleared");
        Ok(())
    }

    #[instrument(skip(self, token), fields(shipping_method = %request.shipping_method, %idempotency_key))]
    async fn create_order(
        &self,
        token: &SecretString,
        request: &OrderRequest,
        idempotency_key: Uuid,
    ) -> Result<OrderConfirmation, GatewayError> {
        let url = self.endpoint(&["orders"])?;
        let builder = self
            .inner
            .client
            .post(url)
            .bearer_auth(token.expose_secret())
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key.to_string())
            .json(request);
        self.send_json(builder).await
    }

    #[instrument(skip(self, token, request), fields(lines = request.items.len(), %idempotency_key))]
    async fn create_quote(
        &self,
        token: &SecretString,
        request: &QuoteRequest,
        idempotency_key: Uuid,
    ) -> Result<QuoteConfirmation, GatewayError> {
        let url = self.endpoint(&["quotes"])?;
        let builder = self
            .inner
            .client
            .post(url)
            .bearer_auth(token.expose_secret())
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key.to_string())
            .json(request);
        self.send_json(builder).await
    }
}
