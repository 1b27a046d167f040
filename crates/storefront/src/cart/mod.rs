//! The cart store: single owner of the shopper's cart.
//!
//! # Architecture
//!
//! - One [`CartStore`] per session, cloned as a handle into whatever needs it
//!   (checkout, CLI, UI). Nothing else mutates the cart
//! - Local state is authoritative for display; the backend cart is a mirror
//!   reconciled against every server snapshot (see [`state`])
//! - Removals and clears are local-first. The server work they owe is pushed
//!   before the next add, rehydrate or order, one caller at a time
//! - Committed state is persisted through a [`CartStorage`] after every
//!   change so the cart survives reloads
//!
//! # Example
//!
//! ```rust,ignore
//! let storage = Arc::new(FileCartStorage::new(".tradepost/cart.json"));
//! let store = CartStore::with_storage(gateway, session, VatRate::default(), storage);
//! store.restore()?;
//!
//! store.add_item(ProductId::new("sku-1"), 2).await?;
//! let totals = store.totals();
//! ```

mod state;
pub mod storage;

use std::sync::{Arc, Mutex};

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tradepost_core::{CartLineItem, ProductId, Totals, VatRate, compute_totals, pricing};

use crate::error::{CartError, add_breadcrumb, report};
use crate::gateway::{AddItemRequest, CartGateway, GatewayError};
use crate::lock;
use crate::session::Session;

pub use state::{CartState, PendingAdd, PendingSync, Reconciliation};
pub use storage::{CartStorage, FileCartStorage, MemoryCartStorage, PersistedCart, StorageError};

/// Result of a request whose response may arrive after the cart moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The server snapshot was merged into the cart.
    Applied,
    /// The cart was cleared while the request was in flight; the response
    /// was ignored.
    Discarded,
}

/// Read-only view of the cart for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub items: Vec<CartLineItem>,
    pub is_loading: bool,
    pub item_count: u64,
    pub totals: Totals,
}

/// Handle to the shopper's cart.
pub struct CartStore<G> {
    inner: Arc<CartStoreInner<G>>,
}

impl<G> Clone for CartStore<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CartStoreInner<G> {
    gateway: G,
    session: Session,
    vat_rate: VatRate,
    storage: Option<Arc<dyn CartStorage>>,
    state: Mutex<CartState>,
    /// Held while owed removals and clears are pushed.
    sync_lock: tokio::sync::Mutex<()>,
}

impl<G: CartGateway> CartStore<G> {
    /// Create a cart store that keeps its state in memory only.
    #[must_use]
    pub fn new(gateway: G, session: Session, vat_rate: VatRate) -> Self {
        Self::build(gateway, session, vat_rate, None)
    }

    /// Create a cart store that persists committed state to `storage` after
    /// every change.
    #[must_use]
    pub fn with_storage(
        gateway: G,
        session: Session,
        vat_rate: VatRate,
        storage: Arc<dyn CartStorage>,
    ) -> Self {
        Self::build(gateway, session, vat_rate, Some(storage))
    }

    fn build(
        gateway: G,
        session: Session,
        vat_rate: VatRate,
        storage: Option<Arc<dyn CartStorage>>,
    ) -> Self {
        Self {
            inner: Arc::new(CartStoreInner {
                gateway,
                session,
                vat_rate,
                storage,
                state: Mutex::new(CartState::default()),
                sync_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub(crate) fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    pub(crate) fn session(&self) -> &Session {
        &self.inner.session
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CartState) -> R) -> R {
        f(&mut lock(&self.inner.state))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current line items in display order.
    #[must_use]
    pub fn items(&self) -> Vec<CartLineItem> {
        self.with_state(|s| s.items().to_vec())
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.with_state(|s| s.is_loading())
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.with_state(|s| s.item_count())
    }

    /// Subtotal from the price engine; never cached.
    #[must_use]
    pub fn subtotal(&self) -> rust_decimal::Decimal {
        self.with_state(|s| pricing::subtotal(s.items()))
    }

    /// Subtotal, VAT and grand total estimates.
    #[must_use]
    pub fn totals(&self) -> Totals {
        self.with_state(|s| compute_totals(s.items(), self.inner.vat_rate))
    }

    #[must_use]
    pub fn vat_rate(&self) -> VatRate {
        self.inner.vat_rate
    }

    /// Adds still awaiting the server.
    #[must_use]
    pub fn pending_adds(&self) -> Vec<PendingAdd> {
        self.with_state(|s| s.pending_adds().to_vec())
    }

    /// Server work owed for local removals and clears.
    #[must_use]
    pub fn pending_sync(&self) -> PendingSync {
        self.with_state(|s| s.pending_sync().clone())
    }

    /// Everything needed to render the cart, read under one lock.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.with_state(|s| CartSnapshot {
            items: s.items().to_vec(),
            is_loading: s.is_loading(),
            item_count: s.item_count(),
            totals: compute_totals(s.items(), self.inner.vat_rate),
        })
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    /// Remove a product line immediately.
    ///
    /// No round trip: the removal is pushed to the server before the next
    /// add, rehydrate or order.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn remove_from_cart(&self, product_id: &ProductId) -> Option<CartLineItem> {
        add_breadcrumb("cart", "Removed item", Some(&[("product_id", product_id.as_str())]));
        let removed = self.with_state(|s| s.remove(product_id));
        match &removed {
            Some(_) => {
                info!("Removed line from cart");
                self.persist();
            }
            None => debug!("Product not in cart"),
        }
        removed
    }

    /// Empty the cart locally.
    ///
    /// Responses to requests still in flight are discarded. Emptying the
    /// server cart is deferred to the next sync; use
    /// [`empty_cart`](Self::empty_cart) to do it now.
    #[instrument(skip(self))]
    pub fn clear_cart(&self) {
        add_breadcrumb("cart", "Cleared cart", None);
        self.with_state(CartState::clear);
        info!("Cart cleared");
        self.persist();
    }

    /// Load persisted state from storage, replacing the in-memory cart.
    ///
    /// Returns the number of lines restored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the stored cart cannot be read.
    pub fn restore(&self) -> Result<usize, StorageError> {
        let Some(storage) = &self.inner.storage else {
            return Ok(0);
        };
        let Some(persisted) = storage.load()? else {
            return Ok(0);
        };

        let count = persisted.items.len();
        self.with_state(|s| s.restore(persisted));
        debug!(lines = count, "Cart restored from storage");
        Ok(count)
    }

    // =========================================================================
    // Server round trips
    // =========================================================================

    /// Add `quantity` units of a product.
    ///
    /// Applies an optimistic bump when the product is already in the cart,
    /// then merges the server's cart snapshot. On failure the bump is
    /// reverted and the cart is otherwise untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for a zero quantity,
    /// [`CartError::AuthRequired`] without a session token, and the mapped
    /// gateway error when the backend call fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<SyncOutcome, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let Some(token) = self.inner.session.token() else {
            report("Add to cart", &CartError::AuthRequired);
            return Err(CartError::AuthRequired);
        };

        add_breadcrumb("cart", "Added item", Some(&[("product_id", product_id.as_str())]));

        let ticket = self.with_state(|s| s.begin_add(&product_id, quantity));
        let _guard = PendingGuard {
            state: &self.inner.state,
            ticket,
        };

        let request = AddItemRequest {
            product_id,
            quantity,
        };
        let result = match self.push_pending_sync(&token).await {
            Ok(()) => self
                .inner
                .gateway
                .add_item(&token, &request)
                .await
                .map_err(CartError::from),
            Err(err) => Err(err),
        };

        match self.with_state(|s| s.reconcile(ticket, result)) {
            Reconciliation::Confirmed => {
                info!("Cart confirmed by server");
                self.persist();
                Ok(SyncOutcome::Applied)
            }
            Reconciliation::Discarded => {
                debug!("Discarding stale add-to-cart response");
                Ok(SyncOutcome::Discarded)
            }
            Reconciliation::RolledBack(err) => {
                report("Add to cart", &err);
                Err(err)
            }
        }
    }

    /// Replace the cart with the server's copy.
    ///
    /// Pending local removals and clears are pushed first so the server
    /// reflects them. Without a session token the local cart is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::AuthRequired`] without a session token and the
    /// mapped gateway error when the backend call fails.
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) -> Result<SyncOutcome, CartError> {
        let Some(token) = self.inner.session.token() else {
            return Err(CartError::AuthRequired);
        };

        let _sync = SyncGuard::new(&self.inner.state);
        let generation = self.with_state(|s| s.generation());

        let result: Result<Vec<CartLineItem>, CartError> = async {
            self.push_pending_sync(&token).await?;
            let remote = self.inner.gateway.fetch_cart(&token).await?;
            remote
                .into_line_items()
                .map_err(|e| CartError::InvalidResponse(e.to_string()))
        }
        .await;

        match result {
            Ok(items) => {
                if self.with_state(|s| s.replace_from_server(generation, items)) {
                    info!("Cart rehydrated from server");
                    self.persist();
                    Ok(SyncOutcome::Applied)
                } else {
                    debug!("Discarding stale cart snapshot");
                    Ok(SyncOutcome::Discarded)
                }
            }
            Err(err) => {
                report("Cart rehydrate", &err);
                Err(err)
            }
        }
    }

    /// Empty the cart locally and on the server.
    ///
    /// The local cart is empty afterwards even if the server call fails; the
    /// server clear is then retried on the next sync.
    ///
    /// # Errors
    ///
    /// Returns the mapped gateway error if the server could not be emptied.
    #[instrument(skip(self))]
    pub async fn empty_cart(&self) -> Result<(), CartError> {
        self.clear_cart();
        let Some(token) = self.inner.session.token() else {
            return Ok(());
        };

        let _sync = SyncGuard::new(&self.inner.state);
        self.push_pending_sync(&token).await.inspect_err(|err| {
            report("Empty cart", err);
        })
    }

    /// Push owed removals and clears to the server.
    ///
    /// Serialized: a caller that finds work in progress waits for it and
    /// then sees what is still owed, so a clear is never sent twice and
    /// never lands after a later add.
    pub(crate) async fn push_pending_sync(&self, token: &SecretString) -> Result<(), CartError> {
        let _serial = self.inner.sync_lock.lock().await;
        let pending = self.with_state(|s| s.pending_sync().clone());
        if pending.is_empty() {
            return Ok(());
        }

        if pending.clear {
            self.inner.gateway.clear_cart(token).await?;
            self.with_state(CartState::mark_cleared_remotely);
            debug!("Pushed cart clear to server");
        }

        for product_id in &pending.removals {
            match self.inner.gateway.remove_item(token, product_id).await {
                // Already gone is as good as removed
                Ok(_) | Err(GatewayError::Rejected { status: 404, .. }) => {
                    self.with_state(|s| s.mark_removed_remotely(product_id));
                    debug!(product_id = %product_id, "Pushed removal to server");
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.persist();
        Ok(())
    }

    /// Save committed state; failures are logged, never returned.
    fn persist(&self) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        let snapshot = self.with_state(|s| s.to_persisted());
        if let Err(e) = storage.save(&snapshot) {
            warn!(error = %e, "Failed to persist cart");
        }
    }
}

/// Rolls back an add whose future is dropped before it settles.
struct PendingGuard<'a> {
    state: &'a Mutex<CartState>,
    ticket: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if lock(self.state).rollback(self.ticket) {
            debug!(ticket = self.ticket, "Add-to-cart cancelled; rolled back");
        }
    }
}

/// Keeps `is_loading` raised for the duration of a sync.
struct SyncGuard<'a> {
    state: &'a Mutex<CartState>,
}

impl<'a> SyncGuard<'a> {
    fn new(state: &'a Mutex<CartState>) -> Self {
        lock(state).begin_sync();
        Self { state }
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).end_sync();
    }
}
