//! Drives the router end to end over the in-memory stores.

use std::sync::Arc;

use agrohub::{Marketplace, MarketplaceConfig};
use agrohub::types::AdminUsername;
use agrohub::user::Registration;
use agrohub_memory::{InMemoryExpiringStore, InMemoryMarketStore};
use agrohub_server::{build_router, AppState};
use agrohub_testing::fixtures::{buyer_registration, farmer_registration};
use agrohub_testing::CapturingCodeSender;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_PASSWORD: &str = "mandi-admin-password";

struct TestApp {
    router: Router,
    marketplace: Marketplace,
    codes: Arc<CapturingCodeSender>,
}

struct Account {
    id: i64,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        let codes = Arc::new(CapturingCodeSender::new());
        let marketplace = Marketplace::new(
            Arc::new(InMemoryMarketStore::new()),
            Arc::new(InMemoryExpiringStore::new()),
            codes.clone(),
            MarketplaceConfig {
                admin_pepper: "test-pepper".to_string(),
                ..MarketplaceConfig::default()
            },
        );
        Self {
            router: build_router(AppState::new(marketplace.clone())),
            marketplace,
            codes,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be JSON")
        };
        (status, body)
    }

    async fn sign_up(&self, registration: Registration) -> Account {
        let email = registration.email.to_string();
        let (status, _) = self
            .call(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({
                    "email": email,
                    "aadhar_number": registration.aadhar_number.to_string(),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let code = self.codes.last_code(&email).expect("a code should be sent");
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/complete-signup",
                None,
                Some(json!({ "user": registration, "verification_code": code })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
        Account {
            id: body["user"]["id"].as_i64().expect("user id should be numeric"),
            token: body["token"].as_str().expect("token should be a string").to_string(),
        }
    }

    async fn admin_token(&self) -> String {
        self.marketplace
            .accounts
            .ensure_admin(
                AdminUsername::try_new("root").expect("valid username"),
                ADMIN_PASSWORD,
            )
            .await
            .expect("admin account should be created");
        let (status, body) = self
            .call(
                Method::POST,
                "/api/admin/login",
                None,
                Some(json!({ "username": "root", "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().expect("admin token").to_string()
    }

    /// An approved farmer with one verified listing.
    async fn listed_product(&self, stock_kg: i64, rate: &str) -> (Account, i64) {
        let farmer = self.sign_up(farmer_registration("http farmer")).await;
        let admin = self.admin_token().await;
        let (status, _) = self
            .call(
                Method::PUT,
                &format!("/api/admin/v1/users/{}/approve", farmer.id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = self
            .call(
                Method::POST,
                &format!("/api/v1/users/{}/products", farmer.id),
                Some(&farmer.token),
                Some(json!({
                    "name": "Oyster mushroom",
                    "type": "mushroom",
                    "image": "https://img.agrohub.test/oyster.jpg",
                    "quantity_kg": stock_kg,
                    "rate_per_kg": rate,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "product creation failed: {body}");
        let product_id = body["id"].as_i64().expect("product id");

        let (status, _) = self
            .call(
                Method::PUT,
                &format!("/api/admin/v1/products/{product_id}/approve"),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        (farmer, product_id)
    }
}

fn order_body(quantity_kg: i64) -> Value {
    json!({
        "quantity_kg": quantity_kg,
        "delivery_address": "Flat 7, Aundh",
        "delivery_city": "Pune",
        "delivery_pin_code": "411007",
        "mode_of_delivery": "courier",
    })
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(text) => text.parse().expect("decimal string"),
        Value::Number(number) => number.to_string().parse().expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn buyer_orders_thirty_of_a_hundred_kilograms() {
    // Given a verified listing of 100 kg at 50 per kg
    let app = TestApp::new();
    let (_, product_id) = app.listed_product(100, "50").await;
    let buyer = app.sign_up(buyer_registration("http buyer")).await;

    // When the buyer orders 30 kg
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/products/{product_id}/order"),
            Some(&buyer.token),
            Some(order_body(30)),
        )
        .await;

    // Then the order costs 1500 and 70 kg remain
    assert_eq!(status, StatusCode::CREATED, "order failed: {body}");
    assert_eq!(decimal(&body["total_price"]), dec!(1500));
    let (_, product) = app
        .call(Method::GET, &format!("/api/v1/products/{product_id}"), None, None)
        .await;
    assert_eq!(product["quantity_kg"], 70);

    let order_id = body["order_id"].as_i64().expect("order id");
    let (status, view) = app
        .call(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(&buyer.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["order"]["status"], "pending");
    assert_eq!(view["buyer"]["user_id"], buyer.id);
}

#[tokio::test]
async fn ordering_more_than_the_stock_is_a_conflict() {
    let app = TestApp::new();
    let (_, product_id) = app.listed_product(10, "20").await;
    let buyer = app.sign_up(buyer_registration("greedy buyer")).await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/products/{product_id}/order"),
            Some(&buyer.token),
            Some(order_body(11)),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    let (_, product) = app
        .call(Method::GET, &format!("/api/v1/products/{product_id}"), None, None)
        .await;
    assert_eq!(product["quantity_kg"], 10);
}

#[tokio::test]
async fn zero_kilograms_is_invalid_input() {
    let app = TestApp::new();
    let (_, product_id) = app.listed_product(10, "20").await;
    let buyer = app.sign_up(buyer_registration("zero buyer")).await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/products/{product_id}/order"),
            Some(&buyer.token),
            Some(order_body(0)),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn farmers_cannot_place_orders() {
    let app = TestApp::new();
    let (farmer, product_id) = app.listed_product(10, "20").await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/products/{product_id}/order"),
            Some(&farmer.token),
            Some(order_body(1)),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn requests_without_a_valid_token_are_unauthorized() {
    let app = TestApp::new();

    let (missing, body) = app.call(Method::GET, "/api/v1/users/1", None, None).await;
    assert_eq!(missing, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (garbage, _) = app
        .call(Method::GET, "/api/v1/users/1", Some("not-a-token"), None)
        .await;
    assert_eq!(garbage, StatusCode::UNAUTHORIZED);

    let (unknown, _) = app
        .call(
            Method::GET,
            "/api/v1/users/1",
            Some("0190f3c4-8d2a-7c4e-9b1a-3f5e6d7c8b9a"),
            None,
        )
        .await;
    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logged_out_tokens_stop_working() {
    let app = TestApp::new();
    let buyer = app.sign_up(buyer_registration("leaving buyer")).await;
    let profile = format!("/api/v1/users/{}", buyer.id);

    let (status, _) = app.call(Method::GET, &profile, Some(&buyer.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(Method::POST, "/api/auth/logout", Some(&buyer.token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::GET, &profile, Some(&buyer.token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_status_is_rejected_and_known_status_is_saved() {
    let app = TestApp::new();
    let (farmer, product_id) = app.listed_product(10, "20").await;
    let buyer = app.sign_up(buyer_registration("status buyer")).await;
    let (_, placed) = app
        .call(
            Method::POST,
            &format!("/api/v1/products/{product_id}/order"),
            Some(&buyer.token),
            Some(order_body(2)),
        )
        .await;
    let status_uri = format!(
        "/api/v1/orders/{}/status",
        placed["order_id"].as_i64().expect("order id")
    );

    let (status, body) = app
        .call(
            Method::PUT,
            &status_uri,
            Some(&farmer.token),
            Some(json!({ "status": "teleported" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_status");

    let (status, body) = app
        .call(
            Method::PUT,
            &status_uri,
            Some(&farmer.token),
            Some(json!({ "status": "SHIPPED" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_status");

    let (status, body) = app
        .call(
            Method::PUT,
            &status_uri,
            Some(&farmer.token),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "shipped");
}

#[tokio::test]
async fn listings_hide_unverified_products() {
    let app = TestApp::new();
    let farmer = app.sign_up(farmer_registration("unverified farmer")).await;
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/users/{}/products", farmer.id),
            Some(&farmer.token),
            Some(json!({
                "name": "Jari bundle",
                "type": "jari",
                "image": "https://img.agrohub.test/jari.jpg",
                "quantity_kg": 5,
                "rate_per_kg": 12.5,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, listings) = app.call(Method::GET, "/api/v1/products/jari", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listings, json!([]));

    let (_, own) = app
        .call(
            Method::GET,
            &format!("/api/v1/products/farmer/{}", farmer.id),
            None,
            None,
        )
        .await;
    assert_eq!(own.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn admin_dashboard_lists_unapproved_farmers_only_for_admins() {
    let app = TestApp::new();
    let farmer = app.sign_up(farmer_registration("waiting farmer")).await;
    let admin = app.admin_token().await;

    let (status, body) = app
        .call(Method::GET, "/api/admin/v1/dashboard", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body
        .as_array()
        .expect("dashboard returns a list")
        .iter()
        .filter_map(|user| user["id"].as_i64())
        .collect();
    assert!(ids.contains(&farmer.id));

    let (status, _) = app
        .call(Method::GET, "/api/admin/v1/dashboard", Some(&farmer.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn wrong_admin_password_is_unauthorized() {
    let app = TestApp::new();
    app.admin_token().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/admin/login",
            None,
            Some(json!({ "username": "root", "password": "guess" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn malformed_bodies_and_ids_are_invalid_input() {
    let app = TestApp::new();

    let (status, body) = app
        .call(Method::POST, "/api/auth/login", None, Some(json!({ "mail": "x" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, body) = app.call(Method::GET, "/api/v1/products/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, _) = app.call(Method::GET, "/api/v1/products/0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_products_are_not_found() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/api/v1/products/424242", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn signing_up_twice_is_a_conflict() {
    let app = TestApp::new();
    let registration = buyer_registration("twice buyer");
    app.sign_up(registration.clone()).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({
                "email": registration.email.to_string(),
                "aadhar_number": registration.aadhar_number.to_string(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn login_with_emailed_code_returns_a_session() {
    let app = TestApp::new();
    let registration = buyer_registration("returning buyer");
    let email = registration.email.to_string();
    let account = app.sign_up(registration).await;

    let (status, _) = app
        .call(Method::POST, "/api/auth/login", None, Some(json!({ "email": email })))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let code = app.codes.last_code(&email).expect("login code sent");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/complete-login",
            None,
            Some(json!({ "email": email, "verification_code": code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], account.id);
    assert!(body["user"]["last_login_at"].is_string());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/complete-login",
            None,
            Some(json!({ "email": email, "verification_code": code })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
