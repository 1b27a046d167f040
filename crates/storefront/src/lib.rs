//! Tradepost storefront library.
//!
//! Client-side cart and checkout orchestration against the Tradepost REST
//! backend: a single [`CartStore`](cart::CartStore) owns the shopper's cart,
//! [`Checkout`](checkout::Checkout) turns it into an order or a quote, and
//! everything that touches the network goes through a
//! [`CartGateway`](gateway::CartGateway).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod state;

pub use cart::{CartSnapshot, CartStore, SyncOutcome};
pub use checkout::{Checkout, CheckoutIntent, CheckoutResult, CheckoutState, SubmitOutcome};
pub use error::{CartError, ErrorKind};
pub use gateway::{CartGateway, GatewayError, HttpGateway};
pub use session::Session;
pub use state::AppState;

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// Cart state is only mutated through short, non-panicking critical sections,
/// so the data is consistent even after a poison.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
