//! Checkout orchestration: turns the cart into an order or a B2B quote.
//!
//! # State machine
//!
//! ```text
//! Idle ──submit──▶ Submitting ──ok──▶ Settled(result) ──reset──▶ Idle
//!                      │
//!                      └──err──▶ Failed(message) ──retry──▶ Idle
//! ```
//!
//! At most one submission is in flight per [`Checkout`]: the check-and-set
//! into `Submitting` happens under the lock, before any network call. The
//! cart is cleared only after the backend confirmed the order or quote.

use std::sync::{Arc, Mutex};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tradepost_core::OrderId;

use crate::cart::CartStore;
use crate::error::{CartError, ErrorKind, add_breadcrumb, report};
use crate::gateway::{
    CartGateway, OrderConfirmation, OrderRequest, QuoteConfirmation, QuoteItem, QuoteRequest,
};
use crate::lock;

const EMPTY_CART_MESSAGE: &str = "Your cart is empty";
const MISSING_SHIPPING_MESSAGE: &str = "Please choose a shipping method";

// =============================================================================
// Types
// =============================================================================

/// What the shopper asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutIntent {
    /// Place an order for the cart.
    Order { shipping_method: String },
    /// Ask for a quote on the cart.
    Quote { notes: String },
}

impl CheckoutIntent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Order { .. } => "order",
            Self::Quote { .. } => "quote",
        }
    }
}

/// Request body captured when a submission starts.
///
/// Cart changes made while the request is in flight do not affect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutRequest {
    Order(OrderRequest),
    Quote(QuoteRequest),
}

/// Outcome of a checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStatus {
    Success,
    Failure,
}

/// Result of a settled or failed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub status: CheckoutStatus,
    /// Set for successful orders; quotes have no order id.
    pub order_id: Option<OrderId>,
    pub error: Option<String>,
}

impl CheckoutResult {
    #[must_use]
    pub const fn success(order_id: Option<OrderId>) -> Self {
        Self {
            status: CheckoutStatus::Success,
            order_id,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: CheckoutStatus::Failure,
            order_id: None,
            error: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == CheckoutStatus::Success
    }
}

/// Where the checkout orchestrator currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CheckoutState {
    #[default]
    Idle,
    Submitting,
    Settled(CheckoutResult),
    /// Holds the user-facing message.
    Failed(String),
}

/// Return value of [`Checkout::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The submission reached a terminal state.
    Completed(CheckoutResult),
    /// No valid session; send the shopper to sign in.
    LoginRequired,
    /// Another submission is in flight; nothing was sent.
    AlreadySubmitting,
}

/// Page to show after a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    OrderConfirmation(OrderId),
    QuoteSubmitted,
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Debug, Default)]
struct Machine {
    state: CheckoutState,
    navigation: Option<Navigation>,
    last_order: Option<OrderConfirmation>,
    last_quote: Option<QuoteConfirmation>,
}

/// Checkout orchestrator bound to one cart store.
pub struct Checkout<G> {
    inner: Arc<CheckoutInner<G>>,
}

impl<G> Clone for Checkout<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CheckoutInner<G> {
    store: CartStore<G>,
    machine: Mutex<Machine>,
}

impl<G: CartGateway> Checkout<G> {
    #[must_use]
    pub fn new(store: CartStore<G>) -> Self {
        Self {
            inner: Arc::new(CheckoutInner {
                store,
                machine: Mutex::new(Machine::default()),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> CheckoutState {
        lock(&self.inner.machine).state.clone()
    }

    /// Where to send the shopper after the last successful submission.
    #[must_use]
    pub fn navigation(&self) -> Option<Navigation> {
        lock(&self.inner.machine).navigation.clone()
    }

    /// The backend's record of the last placed order, including the
    /// authoritative total.
    #[must_use]
    pub fn last_order(&self) -> Option<OrderConfirmation> {
        lock(&self.inner.machine).last_order.clone()
    }

    #[must_use]
    pub fn last_quote(&self) -> Option<QuoteConfirmation> {
        lock(&self.inner.machine).last_quote.clone()
    }

    /// Leave `Failed` for `Idle`. Returns `false` in any other state.
    pub fn retry(&self) -> bool {
        let mut machine = lock(&self.inner.machine);
        if matches!(machine.state, CheckoutState::Failed(_)) {
            machine.state = CheckoutState::Idle;
            true
        } else {
            false
        }
    }

    /// Leave `Settled` for `Idle`. Returns `false` in any other state.
    pub fn reset(&self) -> bool {
        let mut machine = lock(&self.inner.machine);
        if matches!(machine.state, CheckoutState::Settled(_)) {
            machine.state = CheckoutState::Idle;
            machine.navigation = None;
            true
        } else {
            false
        }
    }

    /// Submit the cart as an order or a quote.
    ///
    /// Never returns an error: failures end in [`CheckoutState::Failed`] and
    /// are reported as a failed [`CheckoutResult`]. The cart is only cleared
    /// after the backend confirmed the submission.
    #[instrument(skip(self, intent), fields(kind = intent.kind()))]
    pub async fn submit(&self, intent: CheckoutIntent) -> SubmitOutcome {
        let Some(token) = self.inner.store.session().token() else {
            info!("Checkout requires sign-in");
            return SubmitOutcome::LoginRequired;
        };

        {
            let mut machine = lock(&self.inner.machine);
            if machine.state == CheckoutState::Submitting {
                info!("Checkout already in flight");
                return SubmitOutcome::AlreadySubmitting;
            }
            machine.state = CheckoutState::Submitting;
            machine.navigation = None;
        }
        let guard = SubmittingGuard {
            machine: &self.inner.machine,
        };

        let request = match self.snapshot(intent) {
            Ok(request) => request,
            Err(message) => {
                info!(reason = message, "Checkout refused before submission");
                return guard.fail(message.to_string());
            }
        };

        let idempotency_key = Uuid::new_v4();
        let key = idempotency_key.to_string();
        add_breadcrumb(
            "checkout",
            "Submitted checkout",
            Some(&[("idempotency_key", key.as_str())]),
        );

        let settled = match &request {
            CheckoutRequest::Order(body) => {
                self.place_order(&token, body, idempotency_key)
                    .await
                    .map(|confirmation| {
                        let order_id = confirmation.id.clone();
                        info!(order_id = %order_id, total = %confirmation.total_amount, "Order placed");
                        let mut machine = lock(&self.inner.machine);
                        machine.last_order = Some(confirmation);
                        machine.navigation = Some(Navigation::OrderConfirmation(order_id.clone()));
                        CheckoutResult::success(Some(order_id))
                    })
            }
            CheckoutRequest::Quote(body) => self
                .inner
                .store
                .gateway()
                .create_quote(&token, body, idempotency_key)
                .await
                .map_err(CartError::from)
                .map(|confirmation| {
                    info!(quote_id = %confirmation.id, "Quote submitted");
                    let mut machine = lock(&self.inner.machine);
                    machine.last_quote = Some(confirmation);
                    machine.navigation = Some(Navigation::QuoteSubmitted);
                    CheckoutResult::success(None)
                }),
        };

        match settled {
            Ok(result) => {
                self.inner.store.clear_cart();
                guard.settle(result)
            }
            Err(err) => {
                report("Checkout", &err);
                if err.kind() == ErrorKind::AuthRequired {
                    guard.abandon();
                    return SubmitOutcome::LoginRequired;
                }
                guard.fail(err.user_message())
            }
        }
    }

    /// Create an order from the server cart.
    ///
    /// The backend orders its own copy of the cart, so owed removals and
    /// clears are pushed first.
    async fn place_order(
        &self,
        token: &SecretString,
        body: &OrderRequest,
        idempotency_key: Uuid,
    ) -> Result<OrderConfirmation, CartError> {
        self.inner.store.push_pending_sync(token).await?;
        Ok(self
            .inner
            .store
            .gateway()
            .create_order(token, body, idempotency_key)
            .await?)
    }

    /// Capture the request body from the current cart.
    fn snapshot(&self, intent: CheckoutIntent) -> Result<CheckoutRequest, &'static str> {
        let items = self.inner.store.items();
        if items.is_empty() {
            return Err(EMPTY_CART_MESSAGE);
        }

        match intent {
            CheckoutIntent::Order { shipping_method } => {
                let shipping_method = shipping_method.trim();
                if shipping_method.is_empty() {
                    return Err(MISSING_SHIPPING_MESSAGE);
                }
                Ok(CheckoutRequest::Order(OrderRequest {
                    shipping_method: shipping_method.to_string(),
                }))
            }
            CheckoutIntent::Quote { notes } => Ok(CheckoutRequest::Quote(QuoteRequest {
                items: items
                    .iter()
                    .map(|item| QuoteItem {
                        product_id: item.product_id().clone(),
                        quantity: item.quantity(),
                    })
                    .collect(),
                notes: notes.trim().to_string(),
            })),
        }
    }
}

/// Owns the `Submitting` state. Dropping it without settling (the submit
/// future was cancelled) returns the orchestrator to `Idle`.
struct SubmittingGuard<'a> {
    machine: &'a Mutex<Machine>,
}

impl SubmittingGuard<'_> {
    fn settle(self, result: CheckoutResult) -> SubmitOutcome {
        lock(self.machine).state = CheckoutState::Settled(result.clone());
        SubmitOutcome::Completed(result)
    }

    fn fail(self, message: String) -> SubmitOutcome {
        lock(self.machine).state = CheckoutState::Failed(message.clone());
        SubmitOutcome::Completed(CheckoutResult::failure(message))
    }

    fn abandon(self) {
        lock(self.machine).state = CheckoutState::Idle;
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        let mut machine = lock(self.machine);
        if machine.state == CheckoutState::Submitting {
            warn!("Checkout cancelled while submitting");
            machine.state = CheckoutState::Idle;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use tradepost_core::{ProductId, VatRate};

    use super::*;
    use crate::cart::tests::{Call, FakeGateway, gateway, quantities, signed_in};
    use crate::gateway::GatewayError;
    use crate::session::Session;

    async fn filled(gateway: &FakeGateway, session: Session) -> Checkout<FakeGateway> {
        let store = CartStore::new(gateway.clone(), session, VatRate::default());
        store.add_item(ProductId::new("A"), 2).await.unwrap();
        store.add_item(ProductId::new("B"), 1).await.unwrap();
        Checkout::new(store)
    }

    fn order() -> CheckoutIntent {
        CheckoutIntent::Order {
            shipping_method: "standard".to_string(),
        }
    }

    fn is_order(call: &Call) -> bool {
        matches!(call, Call::Order(_))
    }

    #[tokio::test]
    async fn test_order_success_clears_cart() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;

        let outcome = checkout.submit(order()).await;
        let SubmitOutcome::Completed(result) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(result.is_success());
        let order_id = result.order_id.clone().unwrap();
        assert!(!order_id.as_str().is_empty());

        assert!(checkout.inner.store.items().is_empty());
        assert_eq!(checkout.inner.store.item_count(), 0);
        assert_eq!(checkout.state(), CheckoutState::Settled(result));
        assert_eq!(
            checkout.navigation(),
            Some(Navigation::OrderConfirmation(order_id))
        );
        // 25.00 + 21% VAT, computed by the backend
        assert_eq!(
            checkout.last_order().unwrap().total_amount,
            Decimal::new(3025, 2)
        );
    }

    #[tokio::test]
    async fn test_quote_success_has_no_order_id() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;

        let outcome = checkout
            .submit(CheckoutIntent::Quote {
                notes: "  Net 30 please ".to_string(),
            })
            .await;
        let SubmitOutcome::Completed(result) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(result.is_success());
        assert!(result.order_id.is_none());
        assert!(checkout.inner.store.items().is_empty());
        assert_eq!(checkout.navigation(), Some(Navigation::QuoteSubmitted));

        let quotes = gateway.quotes();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].notes, "Net 30 please");
        assert_eq!(quotes[0].items.len(), 2);
    }

    #[tokio::test]
    async fn test_signed_out_requires_login() {
        let gateway = gateway();
        let session = signed_in();
        let checkout = filled(&gateway, session.clone()).await;
        session.sign_out();

        assert_eq!(checkout.submit(order()).await, SubmitOutcome::LoginRequired);
        assert_eq!(checkout.state(), CheckoutState::Idle);
        assert_eq!(gateway.count(is_order), 0);
        assert_eq!(checkout.inner.store.item_count(), 3);
    }

    #[tokio::test]
    async fn test_rejected_token_requires_login() {
        let gateway = gateway();
        let session = signed_in();
        let checkout = filled(&gateway, session.clone()).await;
        session.sign_in(SecretString::from("tok_expired"));

        assert_eq!(checkout.submit(order()).await, SubmitOutcome::LoginRequired);
        assert_eq!(checkout.state(), CheckoutState::Idle);
        assert_eq!(checkout.inner.store.item_count(), 3);
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_sends_nothing() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        let gate = gateway.gate();

        let second = async {
            gate.entered().await;
            assert_eq!(checkout.state(), CheckoutState::Submitting);
            let outcome = checkout.submit(order()).await;
            gate.release();
            outcome
        };
        let (first, second) = tokio::join!(checkout.submit(order()), second);

        assert!(matches!(first, SubmitOutcome::Completed(ref r) if r.is_success()));
        assert_eq!(second, SubmitOutcome::AlreadySubmitting);
        assert_eq!(gateway.count(is_order), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_cart_and_allows_retry() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        let before = quantities(&checkout.inner.store.items());

        gateway.fail_with(GatewayError::Network("connection refused".to_string()));
        let outcome = checkout.submit(order()).await;
        let SubmitOutcome::Completed(result) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(!result.is_success());
        assert!(result.error.as_deref().unwrap().contains("couldn't reach the store"));
        assert!(matches!(checkout.state(), CheckoutState::Failed(_)));
        assert_eq!(quantities(&checkout.inner.store.items()), before);

        gateway.recover();
        assert!(checkout.retry());
        assert_eq!(checkout.state(), CheckoutState::Idle);
        let outcome = checkout.submit(order()).await;
        assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if r.is_success()));
    }

    #[tokio::test]
    async fn test_order_excludes_locally_removed_lines() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        checkout.inner.store.remove_from_cart(&ProductId::new("B"));

        let outcome = checkout.submit(order()).await;
        assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if r.is_success()));

        let placed = checkout.last_order().unwrap();
        let ordered: Vec<&str> = placed.items.iter().map(|l| l.product_id.as_str()).collect();
        assert_eq!(ordered, vec!["A"]);
        // 20.00 + 21% VAT
        assert_eq!(placed.total_amount, Decimal::new(2420, 2));
        assert!(checkout.inner.store.pending_sync().is_empty());
    }

    #[tokio::test]
    async fn test_unpushed_removal_fails_order_without_placing_it() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        checkout.inner.store.remove_from_cart(&ProductId::new("B"));
        let before = quantities(&checkout.inner.store.items());

        gateway.fail_with(GatewayError::Network("connection reset".to_string()));
        let outcome = checkout.submit(order()).await;

        assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if !r.is_success()));
        assert!(matches!(checkout.state(), CheckoutState::Failed(_)));
        assert_eq!(gateway.count(is_order), 0);
        assert_eq!(quantities(&checkout.inner.store.items()), before);
        assert_eq!(
            checkout.inner.store.pending_sync().removals,
            vec![ProductId::new("B")]
        );
    }

    #[tokio::test]
    async fn test_business_rejection_is_verbatim() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        gateway.fail_with(GatewayError::Rejected {
            status: 422,
            message: "Shipping method not available".to_string(),
        });

        checkout.submit(order()).await;
        assert_eq!(
            checkout.state(),
            CheckoutState::Failed("Shipping method not available".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_cart_fails_without_call() {
        let gateway = gateway();
        let store = CartStore::new(gateway.clone(), signed_in(), VatRate::default());
        let checkout = Checkout::new(store);

        let outcome = checkout.submit(order()).await;
        assert_eq!(
            outcome,
            SubmitOutcome::Completed(CheckoutResult::failure(EMPTY_CART_MESSAGE))
        );
        assert_eq!(
            checkout.state(),
            CheckoutState::Failed(EMPTY_CART_MESSAGE.to_string())
        );
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_shipping_method_fails_without_call() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;

        checkout
            .submit(CheckoutIntent::Order {
                shipping_method: "   ".to_string(),
            })
            .await;
        assert_eq!(
            checkout.state(),
            CheckoutState::Failed(MISSING_SHIPPING_MESSAGE.to_string())
        );
        assert_eq!(gateway.count(is_order), 0);
    }

    #[tokio::test]
    async fn test_each_submission_has_fresh_idempotency_key() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        gateway.fail_with(GatewayError::Network("timeout".to_string()));

        checkout.submit(order()).await;
        // Submitting from Failed is an implicit retry
        checkout.submit(order()).await;

        let keys: Vec<Uuid> = gateway
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Order(key) => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn test_reset_only_from_settled() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        assert!(!checkout.reset());
        assert!(!checkout.retry());

        checkout.submit(order()).await;
        assert!(checkout.reset());
        assert_eq!(checkout.state(), CheckoutState::Idle);
        assert!(checkout.navigation().is_none());
        assert!(checkout.last_order().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_submit_returns_to_idle() {
        let gateway = gateway();
        let checkout = filled(&gateway, signed_in()).await;
        let gate = gateway.gate();

        {
            let submit = checkout.submit(order());
            tokio::pin!(submit);
            tokio::select! {
                _ = &mut submit => panic!("gated submit settled"),
                () = gate.entered() => {}
            }
            assert_eq!(checkout.state(), CheckoutState::Submitting);
        }

        assert_eq!(checkout.state(), CheckoutState::Idle);
        assert_eq!(checkout.inner.store.item_count(), 3);
    }

    #[test]
    fn test_result_serializes_lowercase_status() {
        let json = serde_json::to_value(CheckoutResult::success(Some(OrderId::new("ord_1")))).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["order_id"], "ord_1");
        assert!(json["error"].is_null());

        let json = serde_json::to_value(CheckoutResult::failure("nope")).unwrap();
        assert_eq!(json["status"], "failure");
    }
}
