//! Synchronous cart state and its reconciliation rules.
//!
//! [`CartState`] never performs I/O. The async [`CartStore`](super::CartStore)
//! locks it briefly before and after each gateway call; everything that
//! decides how a server response combines with local edits lives here.

use tracing::debug;
use tradepost_core::{CartLineItem, ProductId, pricing};

use super::storage::PersistedCart;
use crate::error::CartError;
use crate::gateway::RemoteCart;

/// An add-to-cart request in the optimistic state: applied locally (when the
/// product was already in the cart) and awaiting the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAdd {
    pub ticket: u64,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Cart generation the request was issued in.
    pub generation: u64,
    /// Whether the optimistic quantity bump is currently reflected in
    /// `items`. A server snapshot wipes every unconfirmed bump.
    applied_locally: bool,
}

/// How a settled request was folded into the cart.
#[derive(Debug, Clone)]
pub enum Reconciliation {
    /// The server snapshot replaced local lines.
    Confirmed,
    /// The request failed; the optimistic bump was reverted.
    RolledBack(CartError),
    /// The cart was cleared while the request was in flight; the response
    /// was ignored.
    Discarded,
}

/// Server-side work owed for local edits made without a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSync {
    /// The server cart must be emptied.
    pub clear: bool,
    /// Products removed locally but still present on the server.
    pub removals: Vec<ProductId>,
}

impl PendingSync {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.clear && self.removals.is_empty()
    }
}

/// The cart itself plus bookkeeping for in-flight requests.
#[derive(Debug, Default)]
pub struct CartState {
    items: Vec<CartLineItem>,
    generation: u64,
    next_ticket: u64,
    pending: Vec<PendingAdd>,
    sync: PendingSync,
    syncing: usize,
}

impl CartState {
    /// Replace the cart with a persisted snapshot.
    ///
    /// Starts a new generation so responses to requests issued before the
    /// restore are discarded.
    pub fn restore(&mut self, cart: PersistedCart) {
        self.items = cart.items;
        self.sync = PendingSync {
            clear: cart.clear_pending,
            removals: cart.pending_removals,
        };
        self.generation += 1;
        for pending in &mut self.pending {
            pending.applied_locally = false;
        }
    }

    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn item_count(&self) -> u64 {
        pricing::item_count(&self.items)
    }

    /// True while an add issued in the current generation, or a sync, is
    /// outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.syncing > 0
            || self
                .pending
                .iter()
                .any(|p| p.generation == self.generation)
    }

    #[must_use]
    pub fn pending_adds(&self) -> &[PendingAdd] {
        &self.pending
    }

    #[must_use]
    pub const fn pending_sync(&self) -> &PendingSync {
        &self.sync
    }

    fn is_tombstoned(&self, product_id: &ProductId) -> bool {
        self.sync.removals.contains(product_id)
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    /// Register an add request and apply it optimistically.
    ///
    /// Only products already in the cart are bumped locally; a new product
    /// has no name or price until the server answers.
    pub fn begin_add(&mut self, product_id: &ProductId, quantity: u32) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let applied_locally = match self
            .items
            .iter_mut()
            .find(|item| item.product_id() == product_id)
        {
            Some(item) => {
                let bumped = item.quantity().saturating_add(quantity);
                item.set_quantity(bumped).is_ok()
            }
            None => false,
        };

        self.pending.push(PendingAdd {
            ticket,
            product_id: product_id.clone(),
            quantity,
            generation: self.generation,
            applied_locally,
        });
        ticket
    }

    /// Remove a line immediately and remember to remove it on the server.
    pub fn remove(&mut self, product_id: &ProductId) -> Option<CartLineItem> {
        let index = self
            .items
            .iter()
            .position(|item| item.product_id() == product_id)?;
        let removed = self.items.remove(index);

        // The removed line no longer carries any optimistic bump
        for pending in &mut self.pending {
            if &pending.product_id == product_id {
                pending.applied_locally = false;
            }
        }

        if !self.is_tombstoned(product_id) {
            self.sync.removals.push(product_id.clone());
        }
        Some(removed)
    }

    /// Empty the cart and start a new generation.
    ///
    /// Outstanding responses become stale. Individual removals are
    /// superseded by clearing the whole server cart.
    pub fn clear(&mut self) {
        self.items.clear();
        self.generation += 1;
        for pending in &mut self.pending {
            pending.applied_locally = false;
        }
        self.sync = PendingSync {
            clear: true,
            removals: Vec::new(),
        };
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Fold the outcome of an add request into the cart.
    pub fn reconcile(
        &mut self,
        ticket: u64,
        result: Result<RemoteCart, CartError>,
    ) -> Reconciliation {
        let Some(index) = self.pending.iter().position(|p| p.ticket == ticket) else {
            // Already settled (for example by a cancelled future's guard)
            return Reconciliation::Discarded;
        };

        if self.pending.get(index).map(|p| p.generation) != Some(self.generation) {
            self.pending.remove(index);
            return Reconciliation::Discarded;
        }

        let items = result.and_then(|remote| {
            remote
                .into_line_items()
                .map_err(|e| CartError::InvalidResponse(e.to_string()))
        });

        match items {
            Ok(items) => {
                self.pending.remove(index);
                self.apply_server_items(items);
                Reconciliation::Confirmed
            }
            Err(err) => {
                self.rollback(ticket);
                Reconciliation::RolledBack(err)
            }
        }
    }

    /// Revert an unconfirmed add. No-op when the ticket is not pending.
    pub fn rollback(&mut self, ticket: u64) -> bool {
        let Some(index) = self.pending.iter().position(|p| p.ticket == ticket) else {
            return false;
        };
        let pending = self.pending.remove(index);

        if pending.applied_locally && pending.generation == self.generation {
            self.revert_bump(&pending.product_id, pending.quantity);
        }
        true
    }

    /// Replace the cart with a server snapshot issued in `generation`.
    ///
    /// Returns `false` if the cart was cleared since.
    pub fn replace_from_server(&mut self, generation: u64, items: Vec<CartLineItem>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.apply_server_items(items);
        true
    }

    /// Server lines win, except those removed locally and not yet pushed.
    fn apply_server_items(&mut self, items: Vec<CartLineItem>) {
        self.items = items
            .into_iter()
            .filter(|item| !self.sync.removals.contains(item.product_id()))
            .collect();
        for pending in &mut self.pending {
            pending.applied_locally = false;
        }
    }

    fn revert_bump(&mut self, product_id: &ProductId, quantity: u32) {
        let Some(index) = self
            .items
            .iter()
            .position(|item| item.product_id() == product_id)
        else {
            return;
        };

        let remaining = self
            .items
            .get(index)
            .map_or(0, |item| item.quantity().saturating_sub(quantity));
        if remaining == 0 {
            self.items.remove(index);
        } else if let Some(item) = self.items.get_mut(index)
            && let Err(e) = item.set_quantity(remaining)
        {
            debug!(error = %e, product_id = %product_id, "Could not revert quantity bump");
        }
    }

    // =========================================================================
    // Server sync bookkeeping
    // =========================================================================

    pub const fn begin_sync(&mut self) {
        self.syncing += 1;
    }

    pub const fn end_sync(&mut self) {
        self.syncing = self.syncing.saturating_sub(1);
    }

    /// The server cart was emptied.
    pub const fn mark_cleared_remotely(&mut self) {
        self.sync.clear = false;
    }

    /// A pending removal reached the server.
    pub fn mark_removed_remotely(&mut self, product_id: &ProductId) {
        self.sync.removals.retain(|id| id != product_id);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Snapshot of committed state: unconfirmed bumps are left out.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedCart {
        let mut items = self.items.clone();
        for pending in self.pending.iter().filter(|p| p.applied_locally) {
            if let Some(item) = items
                .iter_mut()
                .find(|item| item.product_id() == &pending.product_id)
            {
                let committed = item.quantity().saturating_sub(pending.quantity).max(1);
                if let Err(e) = item.set_quantity(committed) {
                    debug!(error = %e, product_id = %pending.product_id, "Could not persist committed quantity");
                }
            }
        }
        PersistedCart::new(items, self.sync.removals.clone(), self.sync.clear)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::gateway::RemoteCartLine;

    fn line(id: &str, cents: i64, quantity: u32) -> RemoteCartLine {
        RemoteCartLine {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            sku: None,
            image: None,
            price: Decimal::new(cents, 2),
            quantity,
        }
    }

    fn remote(lines: Vec<RemoteCartLine>) -> RemoteCart {
        RemoteCart { items: lines }
    }

    fn state_with(lines: Vec<RemoteCartLine>) -> CartState {
        let mut state = CartState::default();
        let items = remote(lines).into_line_items().unwrap();
        assert!(state.replace_from_server(0, items));
        state
    }

    fn quantities(state: &CartState) -> Vec<(String, u32)> {
        state
            .items()
            .iter()
            .map(|i| (i.product_id().to_string(), i.quantity()))
            .collect()
    }

    #[test]
    fn test_optimistic_bump_then_confirm() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        let a = ProductId::new("A");

        let ticket = state.begin_add(&a, 1);
        assert_eq!(quantities(&state), vec![("A".to_string(), 3)]);
        assert!(state.is_loading());

        let outcome = state.reconcile(ticket, Ok(remote(vec![line("A", 1100, 3)])));
        assert!(matches!(outcome, Reconciliation::Confirmed));
        assert_eq!(state.items()[0].price(), Decimal::new(1100, 2));
        assert!(!state.is_loading());
    }

    #[test]
    fn test_new_product_is_not_shown_until_confirmed() {
        let mut state = CartState::default();
        let ticket = state.begin_add(&ProductId::new("B"), 1);
        assert!(state.items().is_empty());

        state.reconcile(ticket, Ok(remote(vec![line("B", 500, 1)])));
        assert_eq!(quantities(&state), vec![("B".to_string(), 1)]);
    }

    #[test]
    fn test_failure_rolls_back_bump() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        let ticket = state.begin_add(&ProductId::new("A"), 5);

        let outcome = state.reconcile(ticket, Err(CartError::Unavailable("down".to_string())));
        assert!(matches!(outcome, Reconciliation::RolledBack(CartError::Unavailable(_))));
        assert_eq!(quantities(&state), vec![("A".to_string(), 2)]);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_invalid_server_payload_rolls_back() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        let ticket = state.begin_add(&ProductId::new("A"), 1);

        let outcome = state.reconcile(ticket, Ok(remote(vec![line("A", -100, 3)])));
        assert!(matches!(
            outcome,
            Reconciliation::RolledBack(CartError::InvalidResponse(_))
        ));
        assert_eq!(quantities(&state), vec![("A".to_string(), 2)]);
    }

    #[test]
    fn test_out_of_range_server_price_rolls_back() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        let ticket = state.begin_add(&ProductId::new("A"), 1);

        let outcome = state.reconcile(ticket, Ok(remote(vec![line("A", i64::MAX, 3)])));
        assert!(matches!(
            outcome,
            Reconciliation::RolledBack(CartError::InvalidResponse(_))
        ));
        assert_eq!(quantities(&state), vec![("A".to_string(), 2)]);
        assert_eq!(pricing::subtotal(state.items()), Decimal::new(2000, 2));
    }

    #[test]
    fn test_response_after_clear_is_discarded() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        let ticket = state.begin_add(&ProductId::new("B"), 1);

        state.clear();
        assert!(!state.is_loading());

        let outcome = state.reconcile(
            ticket,
            Ok(remote(vec![line("A", 1000, 2), line("B", 500, 1)])),
        );
        assert!(matches!(outcome, Reconciliation::Discarded));
        assert!(state.items().is_empty());
        assert!(state.pending_adds().is_empty());
    }

    #[test]
    fn test_removal_during_flight_survives_merge() {
        let mut state = state_with(vec![line("A", 1000, 2), line("C", 300, 1)]);
        let ticket = state.begin_add(&ProductId::new("B"), 1);

        state.remove(&ProductId::new("C"));

        // Server still has C because removal is local-only
        state.reconcile(
            ticket,
            Ok(remote(vec![line("A", 1000, 2), line("C", 300, 1), line("B", 500, 1)])),
        );
        assert_eq!(
            quantities(&state),
            vec![("A".to_string(), 2), ("B".to_string(), 1)]
        );
        assert_eq!(state.pending_sync().removals, vec![ProductId::new("C")]);
    }

    #[test]
    fn test_rollback_after_foreign_snapshot_does_not_double_revert() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        let first = state.begin_add(&ProductId::new("A"), 1);
        let second = state.begin_add(&ProductId::new("B"), 1);
        assert_eq!(quantities(&state), vec![("A".to_string(), 3)]);

        // B confirms first with a snapshot that does not include A's bump
        state.reconcile(second, Ok(remote(vec![line("A", 1000, 2), line("B", 500, 1)])));
        state.reconcile(first, Err(CartError::Rejected("out of stock".to_string())));

        assert_eq!(
            quantities(&state),
            vec![("A".to_string(), 2), ("B".to_string(), 1)]
        );
    }

    #[test]
    fn test_clear_supersedes_removals() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        state.remove(&ProductId::new("A"));
        assert_eq!(state.pending_sync().removals.len(), 1);

        state.clear();
        assert!(state.pending_sync().clear);
        assert!(state.pending_sync().removals.is_empty());
        assert_eq!(state.item_count(), 0);
    }

    #[test]
    fn test_persisted_snapshot_excludes_unconfirmed_bump() {
        let mut state = state_with(vec![line("A", 1000, 2)]);
        state.begin_add(&ProductId::new("A"), 3);

        let persisted = state.to_persisted();
        assert_eq!(persisted.items[0].quantity(), 2);

        let mut restored = CartState::default();
        restored.restore(persisted);
        assert_eq!(quantities(&restored), vec![("A".to_string(), 2)]);
        assert!(!restored.is_loading());
    }
}
