//! Shopper session: holds the bearer token issued by the auth service.
//!
//! Token issuance is external; this type only stores what it is handed so
//! the cart store and checkout can check for a token before any network call.

use std::sync::{Arc, Mutex};

use secrecy::SecretString;

use crate::lock;

/// Cheaply cloneable handle to the current session.
#[derive(Clone, Default)]
pub struct Session {
    token: Arc<Mutex<Option<SecretString>>>,
}

impl Session {
    /// Create an anonymous session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create a session that is already signed in.
    #[must_use]
    pub fn with_token(token: SecretString) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(token))),
        }
    }

    /// Store a freshly issued token.
    pub fn sign_in(&self, token: SecretString) {
        *lock(&self.token) = Some(token);
    }

    /// Forget the token.
    pub fn sign_out(&self) {
        *lock(&self.token) = None;
    }

    /// Current token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        lock(&self.token).clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        lock(&self.token).is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
