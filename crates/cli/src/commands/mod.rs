//! Command implementations.
//!
//! Every command works on the same [`AppState`]: the persisted cart is
//! restored on startup and saved after each change.

pub mod cart;
pub mod checkout;

use thiserror::Error;

use tradepost_storefront::config::{ConfigError, StorefrontConfig};
use tradepost_storefront::state::StateError;
use tradepost_storefront::{AppState, CartError, HttpGateway};

/// State every command runs against.
pub type State = AppState<HttpGateway>;

/// Errors that end a command with a non-zero exit status.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup failed: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Cart(#[from] CartError),

    /// Checkout ended in a failed state.
    #[error("Checkout failed: {0}")]
    Checkout(String),

    /// The command needs a signed-in session.
    #[error("Please sign in first (set TRADEPOST_API_TOKEN)")]
    LoginRequired,

    #[error("A checkout is already being submitted")]
    AlreadySubmitting,
}

impl CliError {
    /// Text to show the user; backend failures use the cart's wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::Cart(CartError::AuthRequired) => Self::LoginRequired.to_string(),
            Self::Cart(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Build the application state from configuration.
pub fn load_state(config: StorefrontConfig) -> Result<State, CliError> {
    let state = AppState::from_config(config)?;
    tracing::debug!(
        lines = state.cart().items().len(),
        signed_in = state.session().is_authenticated(),
        "Loaded cart"
    );
    Ok(state)
}
