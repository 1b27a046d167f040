//! Application state shared by every front end.

use std::sync::Arc;

use crate::cart::{CartStore, FileCartStorage, StorageError};
use crate::checkout::Checkout;
use crate::config::StorefrontConfig;
use crate::gateway::{CartGateway, GatewayError, HttpGateway};
use crate::session::Session;

/// Error assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to build HTTP gateway: {0}")]
    Gateway(#[from] GatewayError),
    #[error("failed to restore cart: {0}")]
    Storage(#[from] StorageError),
}

/// Application state: the one cart store, its checkout orchestrator and the
/// session they share.
///
/// This struct is cheaply cloneable via `Arc`. Nothing outside it owns a
/// cart; front ends receive a handle.
pub struct AppState<G> {
    inner: Arc<AppStateInner<G>>,
}

impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<G> {
    config: StorefrontConfig,
    session: Session,
    cart: CartStore<G>,
    checkout: Checkout<G>,
}

impl AppState<HttpGateway> {
    /// Build the state for a configured backend.
    ///
    /// The session is signed in when the configuration carries a token, and
    /// the persisted cart is restored from `config.cart_file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the persisted
    /// cart cannot be read.
    pub fn from_config(config: StorefrontConfig) -> Result<Self, StateError> {
        let gateway = HttpGateway::new(&config.api)?;
        let session = config
            .api_token
            .clone()
            .map_or_else(Session::anonymous, Session::with_token);
        let storage = Arc::new(FileCartStorage::new(&config.cart_file));
        let cart = CartStore::with_storage(gateway, session.clone(), config.vat_rate, storage);
        cart.restore()?;

        Ok(Self::assemble(config, session, cart))
    }
}

impl<G: CartGateway> AppState<G> {
    /// Build the state around an existing cart store.
    #[must_use]
    pub fn new(config: StorefrontConfig, session: Session, cart: CartStore<G>) -> Self {
        Self::assemble(config, session, cart)
    }

    fn assemble(config: StorefrontConfig, session: Session, cart: CartStore<G>) -> Self {
        let checkout = Checkout::new(cart.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                session,
                cart,
                checkout,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore<G> {
        &self.inner.cart
    }

    #[must_use]
    pub fn checkout(&self) -> &Checkout<G> {
        &self.inner.checkout
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tradepost_core::ProductId;

    use super::*;
    use crate::cart::tests::{gateway, signed_in};

    fn config(cart_file: &str) -> StorefrontConfig {
        StorefrontConfig::from_lookup(|key| match key {
            "TRADEPOST_API_URL" => Some("http://127.0.0.1:9/api/".to_string()),
            "TRADEPOST_CART_FILE" => Some(cart_file.to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_shares_the_cart_store() {
        let gateway = gateway();
        let session = signed_in();
        let cart = CartStore::new(gateway, session.clone(), config("unused").vat_rate);
        let state = AppState::new(config("unused"), session, cart);

        state.cart().add_item(ProductId::new("A"), 1).await.unwrap();
        let handle = state.clone();
        assert_eq!(handle.cart().item_count(), 1);
        assert!(handle.session().is_authenticated());
    }

    #[test]
    fn test_from_config_without_token_is_anonymous() {
        let path = std::env::temp_dir()
            .join(format!("tradepost-state-{}", std::process::id()))
            .join("cart.json");
        let state = AppState::from_config(config(path.to_str().unwrap())).unwrap();

        assert!(!state.session().is_authenticated());
        assert!(state.cart().items().is_empty());
        assert_eq!(state.config().cart_file, path);
    }
}
