//! `Checkout` over real HTTP: order and quote paths, idempotency keys.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use secrecy::SecretString;
use tradepost_core::{OrderStatus, ProductId, VatRate};
use tradepost_integration_tests::{MockBackend, MockServer, TEST_TOKEN};
use tradepost_storefront::checkout::{CheckoutIntent, CheckoutState, Navigation};
use tradepost_storefront::{Checkout, CartStore, HttpGateway, Session, SubmitOutcome};

async fn setup() -> (MockServer, Checkout<HttpGateway>, CartStore<HttpGateway>) {
    let server = MockServer::spawn(MockBackend::new()).await;
    let gateway = HttpGateway::new(&server.config(None).api).unwrap();
    let session = Session::with_token(SecretString::from(TEST_TOKEN));
    let store = CartStore::new(gateway, session, VatRate::default());
    store.add_item(ProductId::new("W"), 2).await.unwrap();
    store.add_item(ProductId::new("G"), 1).await.unwrap();
    (server, Checkout::new(store.clone()), store)
}

fn order() -> CheckoutIntent {
    CheckoutIntent::Order {
        shipping_method: "express".to_string(),
    }
}

#[tokio::test]
async fn test_order_checkout() {
    let (server, checkout, store) = setup().await;

    let SubmitOutcome::Completed(result) = checkout.submit(order()).await else {
        panic!("checkout did not complete");
    };
    assert!(result.is_success());
    let order_id = result.order_id.unwrap();
    assert_eq!(order_id.as_str(), "ord_1");

    assert!(store.items().is_empty());
    assert_eq!(
        checkout.navigation(),
        Some(Navigation::OrderConfirmation(order_id))
    );

    let confirmation = checkout.last_order().unwrap();
    assert_eq!(confirmation.status, OrderStatus::Confirmed);
    assert_eq!(confirmation.total_amount, Decimal::new(11553, 2));
    assert_eq!(confirmation.items.len(), 2);

    let requests = server.backend.requests_to("POST", "/orders");
    assert_eq!(requests.len(), 1);
    let key = requests[0].idempotency_key.as_deref().unwrap();
    assert!(uuid_like(key));
}

#[tokio::test]
async fn test_order_after_local_removal() {
    let (server, checkout, store) = setup().await;
    store.remove_from_cart(&ProductId::new("G"));

    let outcome = checkout.submit(order()).await;
    assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if r.is_success()));

    let confirmation = checkout.last_order().unwrap();
    assert_eq!(confirmation.items.len(), 1);
    assert_eq!(confirmation.items[0].product_id, ProductId::new("W"));
    // 49.98 + 10.50 VAT
    assert_eq!(confirmation.total_amount, Decimal::new(6048, 2));
    assert_eq!(server.backend.requests_to("DELETE", "/cart/items/G").len(), 1);
}

#[tokio::test]
async fn test_quote_checkout() {
    let (server, checkout, store) = setup().await;

    let outcome = checkout
        .submit(CheckoutIntent::Quote {
            notes: "Pallet delivery".to_string(),
        })
        .await;
    let SubmitOutcome::Completed(result) = outcome else {
        panic!("checkout did not complete");
    };
    assert!(result.is_success());
    assert!(result.order_id.is_none());
    assert!(store.items().is_empty());
    assert_eq!(checkout.navigation(), Some(Navigation::QuoteSubmitted));

    let quotes = server.backend.quotes();
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0]["notes"], "Pallet delivery");
    assert_eq!(quotes[0]["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_order_leaves_cart() {
    let (server, checkout, store) = setup().await;
    server
        .backend
        .respond_next(422, r#"{"error":{"message":"Express shipping unavailable"}}"#);

    checkout.submit(order()).await;
    assert_eq!(
        checkout.state(),
        CheckoutState::Failed("Express shipping unavailable".to_string())
    );
    assert_eq!(store.item_count(), 3);
    assert_eq!(server.backend.order_count(), 0);

    assert!(checkout.retry());
    let outcome = checkout.submit(order()).await;
    assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if r.is_success()));
    assert_eq!(server.backend.order_count(), 1);
}

#[tokio::test]
async fn test_concurrent_submissions_send_one_order() {
    let (server, checkout, _store) = setup().await;

    let (first, second) = tokio::join!(checkout.submit(order()), checkout.submit(order()));

    let outcomes = [first, second];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == SubmitOutcome::AlreadySubmitting)
            .count(),
        1
    );
    assert_eq!(server.backend.requests_to("POST", "/orders").len(), 1);
    assert_eq!(server.backend.order_count(), 1);
}

#[tokio::test]
async fn test_signed_out_checkout_requires_login() {
    let (server, _, _) = setup().await;
    let gateway = HttpGateway::new(&server.config(None).api).unwrap();
    let store = CartStore::new(gateway, Session::anonymous(), VatRate::default());
    let checkout = Checkout::new(store);

    assert_eq!(checkout.submit(order()).await, SubmitOutcome::LoginRequired);
    assert!(server.backend.requests_to("POST", "/orders").is_empty());
}

fn uuid_like(key: &str) -> bool {
    key.len() == 36 && key.chars().filter(|c| *c == '-').count() == 4
}
