//! Integration test support for Tradepost.
//!
//! Spins up an in-process mock of the backend REST API on an ephemeral port
//! so the real [`HttpGateway`](tradepost_storefront::HttpGateway),
//! [`CartStore`](tradepost_storefront::CartStore) and
//! [`Checkout`](tradepost_storefront::Checkout) can be exercised over HTTP.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tradepost-integration-tests
//! ```
//!
//! # Mock API
//!
//! ```text
//! POST   /api/cart/items               - Add item, returns cart
//! DELETE /api/cart/items/{product_id}  - Remove item, returns cart
//! GET    /api/cart                     - Fetch cart
//! DELETE /api/cart                     - Empty cart (204)
//! POST   /api/orders                   - Create order (requires Idempotency-Key)
//! POST   /api/quotes                   - Create quote
//! ```
//!
//! Every route requires `Authorization: Bearer` [`TEST_TOKEN`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use tradepost_core::{CartLineItem, ProductId, VatRate, compute_totals};
use tradepost_storefront::config::StorefrontConfig;

/// The only bearer token the mock accepts.
pub const TEST_TOKEN: &str = "tok_integration";

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// =============================================================================
// Backend state
// =============================================================================

#[derive(Debug, Clone)]
struct Product {
    name: String,
    price: Decimal,
}

/// A request the mock received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default)]
struct Backend {
    catalog: HashMap<String, Product>,
    cart: Vec<(String, u32)>,
    canned: Option<(StatusCode, String)>,
    requests: Vec<RecordedRequest>,
    orders_by_key: HashMap<String, Value>,
    order_seq: u64,
    quotes: Vec<Value>,
}

impl Backend {
    fn line_items(&self) -> Vec<CartLineItem> {
        self.cart
            .iter()
            .filter_map(|(id, quantity)| {
                let product = self.catalog.get(id)?;
                CartLineItem::new(ProductId::new(id.as_str()), &product.name, product.price, *quantity)
                    .ok()
            })
            .collect()
    }

    fn cart_json(&self) -> Value {
        let items: Vec<Value> = self
            .line_items()
            .iter()
            .map(|item| {
                json!({
                    "product_id": item.product_id(),
                    "name": item.name(),
                    "sku": null,
                    "price": item.price().to_string(),
                    "quantity": item.quantity(),
                })
            })
            .collect();
        json!({ "items": items })
    }
}

/// Handle to the mock backend's state, shared with the running server.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<Backend>>,
}

impl MockBackend {
    /// Backend with a small catalog: `W` Widget 24.99, `G` Gadget 45.50,
    /// `S` Sprocket 3.00.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
            .with_product("W", "Widget", Decimal::new(2499, 2))
            .with_product("G", "Gadget", Decimal::new(4550, 2))
            .with_product("S", "Sprocket", Decimal::new(300, 2))
    }

    #[must_use]
    pub fn with_product(self, id: &str, name: &str, price: Decimal) -> Self {
        self.lock().catalog.insert(
            id.to_string(),
            Product {
                name: name.to_string(),
                price,
            },
        );
        self
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a line straight into the server cart.
    pub fn seed(&self, id: &str, quantity: u32) {
        self.lock().cart.push((id.to_string(), quantity));
    }

    /// Answer the next authorized request with `status` and a raw `body`.
    pub fn respond_next(&self, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.lock().canned = Some((status, body.to_string()));
    }

    /// Server cart as `(product, quantity)` sorted by product.
    #[must_use]
    pub fn cart(&self) -> Vec<(String, u32)> {
        let mut cart = self.lock().cart.clone();
        cart.sort();
        cart
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Recorded requests whose path ends with `suffix`.
    #[must_use]
    pub fn requests_to(&self, method: &str, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.ends_with(suffix))
            .collect()
    }

    /// Distinct orders created.
    #[must_use]
    pub fn order_count(&self) -> u64 {
        self.lock().order_seq
    }

    #[must_use]
    pub fn quotes(&self) -> Vec<Value> {
        self.lock().quotes.clone()
    }
}

// =============================================================================
// Auth extractor
// =============================================================================

/// Extractor that records the request, enforces the bearer token and serves
/// any canned response.
pub struct Authorized;

impl FromRequestParts<MockBackend> for Authorized {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        backend: &MockBackend,
    ) -> Result<Self, Self::Rejection> {
        let mut state = backend.lock();
        state.requests.push(RecordedRequest {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            idempotency_key: header(&parts.headers, IDEMPOTENCY_KEY_HEADER),
        });

        let expected = format!("Bearer {TEST_TOKEN}");
        if header(&parts.headers, AUTHORIZATION.as_str()).as_deref() != Some(expected.as_str()) {
            return Err(error(StatusCode::UNAUTHORIZED, json!({"error": "Invalid or expired token"})));
        }

        if let Some((status, body)) = state.canned.take() {
            return Err((status, body).into_response());
        }
        Ok(Self)
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct AddItemBody {
    product_id: String,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    shipping_method: String,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    items: Vec<Value>,
    #[serde(default)]
    notes: String,
}

async fn add_item(
    _: Authorized,
    State(backend): State<MockBackend>,
    Json(body): Json<AddItemBody>,
) -> Response {
    let mut state = backend.lock();
    if body.quantity == 0 {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"details": ["quantity must be positive"]}),
        );
    }
    if !state.catalog.contains_key(&body.product_id) {
        return error(StatusCode::NOT_FOUND, json!({"message": "Product not found"}));
    }

    match state.cart.iter_mut().find(|(id, _)| *id == body.product_id) {
        Some((_, quantity)) => *quantity += body.quantity,
        None => state.cart.push((body.product_id, body.quantity)),
    }
    Json(state.cart_json()).into_response()
}

async fn remove_item(
    _: Authorized,
    State(backend): State<MockBackend>,
    Path(product_id): Path<String>,
) -> Response {
    let mut state = backend.lock();
    let before = state.cart.len();
    state.cart.retain(|(id, _)| *id != product_id);
    if state.cart.len() == before {
        return error(StatusCode::NOT_FOUND, json!({"error": "Item not in cart"}));
    }
    Json(state.cart_json()).into_response()
}

async fn fetch_cart(_: Authorized, State(backend): State<MockBackend>) -> Response {
    Json(backend.lock().cart_json()).into_response()
}

async fn clear_cart(_: Authorized, State(backend): State<MockBackend>) -> StatusCode {
    backend.lock().cart.clear();
    StatusCode::NO_CONTENT
}

async fn create_order(
    _: Authorized,
    State(backend): State<MockBackend>,
    headers: HeaderMap,
    Json(body): Json<OrderBody>,
) -> Response {
    let Some(key) = header(&headers, IDEMPOTENCY_KEY_HEADER) else {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"message": "Idempotency-Key header is required"}),
        );
    };

    let mut state = backend.lock();
    if let Some(order) = state.orders_by_key.get(&key) {
        return (StatusCode::CREATED, Json(order.clone())).into_response();
    }
    if body.shipping_method.trim().is_empty() {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"error": {"code": "shipping", "message": "Shipping method is required"}}),
        );
    }

    let items = state.line_items();
    if items.is_empty() {
        return error(StatusCode::UNPROCESSABLE_ENTITY, json!({"message": "Cart is empty"}));
    }

    state.order_seq += 1;
    let totals = compute_totals(&items, VatRate::default());
    let order = json!({
        "id": format!("ord_{}", state.order_seq),
        "status": "confirmed",
        "total_amount": totals.grand_total.to_string(),
        "created_at": chrono::Utc::now().to_rfc3339(),
        "items": items.iter().map(|item| json!({
            "product_id": item.product_id(),
            "quantity": item.quantity(),
            "name": item.name(),
            "price": item.price().to_string(),
        })).collect::<Vec<_>>(),
    });
    state.orders_by_key.insert(key, order.clone());
    state.cart.clear();

    (StatusCode::CREATED, Json(order)).into_response()
}

async fn create_quote(
    _: Authorized,
    State(backend): State<MockBackend>,
    Json(body): Json<QuoteBody>,
) -> Response {
    if body.items.is_empty() {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"details": "A quote needs at least one item"}),
        );
    }

    let mut state = backend.lock();
    state.quotes.push(json!({ "items": body.items, "notes": body.notes }));
    let id = format!("quo_{}", state.quotes.len());
    (
        StatusCode::CREATED,
        Json(json!({ "id": id, "status": "pending" })),
    )
        .into_response()
}

/// Routes of the mock backend, mounted under `/api`.
pub fn router(backend: MockBackend) -> Router {
    let api = Router::new()
        .route("/cart", get(fetch_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/{product_id}", delete(remove_item))
        .route("/orders", post(create_order))
        .route("/quotes", post(create_quote));

    Router::new().nest("/api", api).with_state(backend)
}

// =============================================================================
// Server
// =============================================================================

/// A running mock backend.
pub struct MockServer {
    pub backend: MockBackend,
    pub addr: SocketAddr,
}

impl MockServer {
    /// Serve `backend` on an ephemeral localhost port.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn spawn(backend: MockBackend) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to read local address");

        let app = router(backend.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { backend, addr }
    }

    /// Base URL of the API, with a trailing slash.
    ///
    /// # Panics
    ///
    /// Panics if the address does not form a valid URL.
    #[must_use]
    pub fn api_url(&self) -> Url {
        Url::parse(&format!("http://{}/api/", self.addr)).expect("valid mock URL")
    }

    /// Storefront configuration pointing at this server.
    #[must_use]
    pub fn config(&self, token: Option<&str>) -> StorefrontConfig {
        config_for(&self.api_url(), token)
    }
}

/// Storefront configuration for `api_url` with a short request timeout.
///
/// # Panics
///
/// Panics if the generated configuration is rejected.
#[must_use]
pub fn config_for(api_url: &Url, token: Option<&str>) -> StorefrontConfig {
    let mut config = StorefrontConfig::from_lookup(|key| match key {
        "TRADEPOST_API_URL" => Some(api_url.to_string()),
        "TRADEPOST_HTTP_TIMEOUT_SECS" => Some("5".to_string()),
        _ => None,
    })
    .expect("valid test configuration");
    config.api_token = token.map(SecretString::from);
    config
}

/// A localhost URL with nothing listening on it.
///
/// # Panics
///
/// Panics if no local port can be bound.
pub async fn unreachable_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe port");
    let addr = listener.local_addr().expect("Failed to read local address");
    drop(listener);
    Url::parse(&format!("http://{addr}/api/")).expect("valid URL")
}
