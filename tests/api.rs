mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower::ServiceExt;

use adress_storefront::domain::events::EventPublisher;
use adress_storefront::persistence::{MemoryRowStore, RowStore};
use adress_storefront::services::auth::PROFILES_TABLE;
use adress_storefront::services::orders::ORDERS_TABLE;
use adress_storefront::session::SessionRegistry;
use adress_storefront::{router, AppState};
use common::ScriptedGateway;

struct TestApp {
    app: Router,
    store: Arc<MemoryRowStore>,
    sessions: Arc<SessionRegistry>,
}

async fn setup() -> TestApp {
    let store = Arc::new(
        MemoryRowStore::new()
            .with_unique("adezive", "sku")
            .with_unique(PROFILES_TABLE, "email")
            .with_unique(ORDERS_TABLE, "pay_id"),
    );
    let lashes = json!({"id": "G1", "name": "Gene Mink 0.07", "sale_price": 45, "store_stock": 10, "total_stock": 10, "image_url": "https://cdn.example.com/g1.jpg"});
    store.seed("gene", vec![lashes.as_object().cloned().unwrap()]).await;
    let state = AppState::new(store.clone(), Arc::new(ScriptedGateway::approving("pay-1")), EventPublisher::disabled());
    let sessions = state.sessions.clone();
    TestApp { app: router(state), store, sessions }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                request = request.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = self.app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, session: &str, email: &str) -> Value {
        let registration = json!({ "name": "Ana Popescu", "email": email, "phone": "+37360000000", "password": "parola-sigura" });
        let (status, body) = self.call(Method::POST, &format!("/api/v1/sessions/{session}/register"), Some(registration)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn promote(&self, session: &str, email: &str) {
        let mut patch = Map::new();
        patch.insert("is_admin".into(), json!(true));
        self.store.update(PROFILES_TABLE, patch, "email", &json!(email)).await.unwrap();
        let login = json!({ "email": email, "password": "parola-sigura" });
        let (status, body) = self.call(Method::POST, &format!("/api/v1/sessions/{session}/login"), Some(login)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["isAdmin"], true);
    }

    async fn add_item(&self, session: &str, product_id: &str) -> Value {
        let item = json!({ "productId": product_id });
        let (status, body) = self.call(Method::POST, &format!("/api/v1/sessions/{session}/cart/items"), Some(item)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }
}

fn checkout_form(payment: &str) -> Value {
    json!({
        "firstName": "Ana", "lastName": "Popescu", "email": "ana@example.com", "phone": "+37360000000",
        "address": "Str. Test 1", "city": "Chișinău", "postalCode": "MD-2001",
        "deliveryMethod": "standard", "paymentMethod": payment, "acceptTerms": true
    })
}

#[tokio::test]
async fn test_health() {
    let t = setup().await;
    let (status, body) = t.call(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_cart_merges_repeated_adds() {
    let t = setup().await;
    t.add_item("s1", "G1").await;
    let body = t.add_item("s1", "G1").await;
    assert_eq!(body["totalItems"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (_, other) = t.call(Method::GET, "/api/v1/sessions/s2/cart", None).await;
    assert_eq!(other["totalItems"], 0);
}

#[tokio::test]
async fn test_cart_prices_come_from_catalog() {
    let t = setup().await;
    let forged = json!({ "productId": "G1", "name": "Free", "unitPrice": "0.01" });
    let (status, body) = t.call(Method::POST, "/api/v1/sessions/s1/cart/items", Some(forged)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["totalPrice"], "45");
    assert_eq!(body["items"][0]["name"], "Gene Mink 0.07");

    let (status, body) = t.call(Method::POST, "/api/v1/sessions/s1/cart/items", Some(json!({ "productId": "X9" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "product_not_found");
}

#[tokio::test]
async fn test_quantity_is_bounded() {
    let t = setup().await;
    t.add_item("s1", "G1").await;
    let huge = json!({ "productId": "G1", "quantity": 79_228_162_514_264_337_i64 });
    let (status, body) = t.call(Method::PUT, "/api/v1/sessions/s1/cart/items", Some(huge)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "quantity_out_of_range");

    let (status, body) = t.call(Method::PUT, "/api/v1/sessions/s1/cart/items", Some(json!({ "productId": "G1", "quantity": 3 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPrice"], "135");
}

#[tokio::test]
async fn test_reads_do_not_open_sessions() {
    let t = setup().await;
    for uri in ["/api/v1/sessions/ghost", "/api/v1/sessions/ghost/cart", "/api/v1/sessions/ghost/orders"] {
        let (status, _) = t.call(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
    let (status, _) = t.call(Method::GET, "/api/v1/sessions/ghost/loyalty", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.call(Method::POST, "/api/v1/sessions/ghost/logout", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(t.sessions.len().await, 0);

    t.add_item("s1", "G1").await;
    assert_eq!(t.sessions.len().await, 1);
}

#[tokio::test]
async fn test_checkout_requires_sign_in() {
    let t = setup().await;
    t.add_item("s1", "G1").await;
    let (status, body) = t.call(Method::POST, "/api/v1/sessions/s1/checkout", Some(checkout_form("cash"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "sign_in_required");
    assert!(body["messages"]["RO"].is_string());
    assert!(body["messages"]["RU"].is_string());
}

#[tokio::test]
async fn test_cash_checkout_places_order_and_records_history() {
    let t = setup().await;
    t.register("s1", "ana@example.com").await;
    t.add_item("s1", "G1").await;

    let (status, body) = t.call(Method::POST, "/api/v1/sessions/s1/checkout", Some(checkout_form("cash"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "placed");
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let (_, cart) = t.call(Method::GET, "/api/v1/sessions/s1/cart", None).await;
    assert_eq!(cart["totalItems"], 0);

    let (status, order) = t.call(Method::GET, &format!("/api/v1/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "pending");

    let (_, history) = t.call(Method::GET, "/api/v1/sessions/s1/orders", None).await;
    assert_eq!(history[0]["id"], order_id.as_str());
}

#[tokio::test]
async fn test_card_checkout_redirects_to_gateway() {
    let t = setup().await;
    t.register("s1", "ana@example.com").await;
    t.add_item("s1", "G1").await;

    let (status, body) = t.call(Method::POST, "/api/v1/sessions/s1/checkout", Some(checkout_form("card"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "redirect_to_payment");
    assert_eq!(body["payId"], "pay-1");

    let (status, outcome) = t.call(Method::GET, "/api/v1/sessions/s1/payment/return?payId=pay-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["state"], "success");
    assert!(outcome["orderId"].is_string());
}

#[tokio::test]
async fn test_missing_checkout_field_is_reported() {
    let t = setup().await;
    t.register("s1", "ana@example.com").await;
    t.add_item("s1", "G1").await;
    let mut form = checkout_form("cash");
    form["city"] = json!("  ");

    let (status, body) = t.call(Method::POST, "/api/v1/sessions/s1/checkout", Some(form)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "field_required");
    assert_eq!(body["fields"][0]["field"], "city");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let t = setup().await;
    t.register("s1", "ana@example.com").await;
    let registration = json!({ "name": "Ana", "email": "ANA@example.com", "phone": "+37360000000", "password": "parola-sigura" });
    let (status, body) = t.call(Method::POST, "/api/v1/sessions/s2/register", Some(registration)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "user_exists");
}

#[tokio::test]
async fn test_admin_routes_are_guarded() {
    let t = setup().await;
    let uri = "/api/v1/sessions/s1/admin/categories/gene/products";
    let (status, _) = t.call(Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    t.register("s1", "ana@example.com").await;
    let (status, body) = t.call(Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "admin_required");
}

#[tokio::test]
async fn test_admin_creates_and_deletes_adhesive() {
    let t = setup().await;
    t.register("admin", "admin@example.com").await;
    t.promote("admin", "admin@example.com").await;
    let product = json!({
        "name": "Adeziv Premium", "sale_price": 320, "discount": 0, "store_stock": 3, "total_stock": 10,
        "image_url": "https://cdn.example.com/adeziv.jpg", "sku": "ADZ-001"
    });
    let uri = "/api/v1/sessions/admin/admin/categories/adezive/products";

    let (status, created) = t.call(Method::POST, uri, Some(product.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let (status, body) = t.call(Method::POST, uri, Some(product)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_sku");

    let id = created["id"].as_str().unwrap();
    let (status, _) = t.call(Method::DELETE, &format!("{uri}/{id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = t.call(Method::DELETE, &format!("{uri}/{id}?confirm=true"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, listed) = t.call(Method::GET, "/api/v1/categories/adezive/products", None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_unknown_category_is_not_found() {
    let t = setup().await;
    let (status, body) = t.call(Method::GET, "/api/v1/categories/parfumuri/products", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_category");
}

#[tokio::test]
async fn test_callback_requires_identifiers() {
    let t = setup().await;
    let (status, body) = t.call(Method::POST, "/api/v1/payments/maib/callback", Some(json!({ "status": "OK" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let (status, body) = t.call(Method::POST, "/api/v1/payments/maib/callback?payId=p1&orderId=o1&status=OK", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(t.store.select("payment_events").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_currency_format() {
    let t = setup().await;
    let (status, body) = t.call(Method::GET, "/api/v1/currency/format?amount=100&currency=eur", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["formatted"], "€5.00");

    let (_, all) = t.call(Method::GET, "/api/v1/currency/format?amount=100", None).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (status, _) = t.call(Method::GET, "/api/v1/currency/format?amount=100&currency=usd", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
