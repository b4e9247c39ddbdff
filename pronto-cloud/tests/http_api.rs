//! HTTP surface: routes, auth, rate limits and error envelopes

mod common;

use axum::Router;
use axum::body::Body;
use common::Harness;
use http::{Request, StatusCode, header};
use pronto_cloud::api::create_router;
use serde_json::{Value, json};
use shared::error::ErrorCode;
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    create_router(h.state.clone(), &[])
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn signup(app: &Router, email: &str, name: &str) -> (String, String) {
    let (status, body) = call(
        app,
        "POST",
        "/api/owner/signup",
        None,
        Some(json!({ "email": email, "password": "hunter2hunter2", "business_name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["slug"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new();
    let (status, body) = call(&app(&h), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "pronto-cloud");
}

#[tokio::test]
async fn customer_orders_through_the_public_page() {
    let h = Harness::new();
    let app = app(&h);
    let (token, slug) = signup(&app, "owner@example.com", "Corner Cafe").await;
    assert_eq!(slug, "corner-cafe");

    let (status, latte) = call(
        &app,
        "POST",
        "/api/owner/products",
        Some(&token),
        Some(json!({ "name": "Latte", "price": "4.50" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{latte}");
    let (_, muffin) = call(
        &app,
        "POST",
        "/api/owner/products",
        Some(&token),
        Some(json!({ "name": "Muffin", "price": "3.00", "category": "Bakery" })),
    )
    .await;

    let (status, menu) = call(&app, "GET", "/api/public/corner-cafe", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(menu["business"]["name"], "Corner Cafe");
    assert_eq!(menu["products"].as_array().unwrap().len(), 2);
    assert!(menu["business"].get("owner_id").is_none());

    let (status, placed) = call(
        &app,
        "POST",
        "/api/public/corner-cafe/orders",
        None,
        Some(json!({
            "customer_name": "Jamie",
            "note": "extra hot",
            "items": [
                { "product_id": latte["id"], "quantity": 2 },
                { "product_id": muffin["id"], "quantity": 1 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{placed}");
    assert_eq!(placed["total"], "12.00");
    assert_eq!(placed["status"], "pending");
    let order_id = placed["order_id"].as_i64().unwrap();

    let (status, orders) = call(&app, "GET", "/api/owner/orders?status=pending", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["customer_note"], "extra hot");
    assert_eq!(orders[0]["items"].as_array().unwrap().len(), 2);

    let (status, advanced) = call(
        &app,
        "POST",
        &format!("/api/owner/orders/{order_id}/advance"),
        Some(&token),
        Some(json!({ "expected_status": "pending" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{advanced}");
    assert_eq!(advanced["status"], "preparing");

    // A second device still showing `pending` gets a conflict, not a skip to `ready`
    let (status, err) = call(
        &app,
        "POST",
        &format!("/api/owner/orders/{order_id}/advance"),
        Some(&token),
        Some(json!({ "expected_status": "pending" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], ErrorCode::StatusConflict.code());

    // A change that does not say what the screen showed is refused
    for body in [None, Some(json!({}))] {
        let (status, err) = call(
            &app,
            "POST",
            &format!("/api/owner/orders/{order_id}/cancel"),
            Some(&token),
            body,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], ErrorCode::RequiredField.code());
        assert_eq!(err["details"]["field"], "expected_status");
    }

    let (status, cancelled) = call(
        &app,
        "POST",
        &format!("/api/owner/orders/{order_id}/cancel"),
        Some(&token),
        Some(json!({ "expected_status": "preparing" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["status"], "cancelled");

    let (status, err) = call(
        &app,
        "POST",
        &format!("/api/owner/orders/{order_id}/advance"),
        Some(&token),
        Some(json!({ "expected_status": "preparing" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], ErrorCode::InvalidTransition.code());
}

#[tokio::test]
async fn intake_errors_use_the_error_envelope() {
    let h = Harness::new();
    let app = app(&h);
    let (token, _) = signup(&app, "owner@example.com", "Corner Cafe").await;
    let (_, latte) = call(
        &app,
        "POST",
        "/api/owner/products",
        Some(&token),
        Some(json!({ "name": "Latte", "price": "4.50" })),
    )
    .await;

    let (status, err) = call(
        &app,
        "POST",
        "/api/public/corner-cafe/orders",
        None,
        Some(json!({ "customer_name": " ", "items": [{ "product_id": latte["id"], "quantity": 1 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], ErrorCode::CustomerNameRequired.code());

    let (status, err) = call(
        &app,
        "POST",
        "/api/public/nowhere/orders",
        None,
        Some(json!({ "customer_name": "Jamie", "items": [{ "product_id": latte["id"], "quantity": 1 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], ErrorCode::BusinessNotFound.code());
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn owner_routes_require_a_valid_token() {
    let h = Harness::new();
    let app = app(&h);

    let (status, err) = call(&app, "GET", "/api/owner/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["code"], ErrorCode::NotAuthenticated.code());

    let (status, err) = call(&app, "GET", "/api/owner/orders", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["code"], ErrorCode::TokenInvalid.code());
}

#[tokio::test]
async fn owners_are_isolated_from_each_other() {
    let h = Harness::new();
    let app = app(&h);
    let (alpha, _) = signup(&app, "a@example.com", "Cafe Alpha").await;
    let (beta, _) = signup(&app, "b@example.com", "Cafe Beta").await;

    let (_, latte) = call(
        &app,
        "POST",
        "/api/owner/products",
        Some(&alpha),
        Some(json!({ "name": "Latte", "price": "4.50" })),
    )
    .await;
    let (_, placed) = call(
        &app,
        "POST",
        "/api/public/cafe-alpha/orders",
        None,
        Some(json!({ "customer_name": "Jamie", "items": [{ "product_id": latte["id"], "quantity": 1 }] })),
    )
    .await;
    let order_id = placed["order_id"].as_i64().unwrap();

    let (status, _) = call(&app, "GET", &format!("/api/owner/orders/{order_id}"), Some(&beta), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/owner/orders/{order_id}/advance"),
        Some(&beta),
        Some(json!({ "expected_status": "pending" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/api/owner/products/{}", latte["id"]),
        Some(&beta),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, orders) = call(&app, "GET", "/api/owner/orders", Some(&beta), None).await;
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn push_registration_over_http() {
    let h = Harness::new();
    let app = app(&h);
    let (token, _) = signup(&app, "owner@example.com", "Corner Cafe").await;

    // No VAPID identity configured in tests
    let (status, err) = call(&app, "GET", "/api/owner/push/vapid-key", Some(&token), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err["code"], ErrorCode::PushUnavailable.code());

    let (status, err) = call(
        &app,
        "POST",
        "/api/owner/push/subscriptions",
        Some(&token),
        Some(json!({ "endpoint": "not a url", "keys": { "p256dh": "x", "auth": "y" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], ErrorCode::PushEndpointInvalid.code());

    let p256dh = "A".repeat(87);
    let auth = "A".repeat(22);
    let (status, sub) = call(
        &app,
        "POST",
        "/api/owner/push/subscriptions",
        Some(&token),
        Some(json!({ "endpoint": "https://push.example.net/x", "keys": { "p256dh": p256dh, "auth": auth } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{sub}");

    let (_, subs) = call(&app, "GET", "/api/owner/push/subscriptions", Some(&token), None).await;
    assert_eq!(subs.as_array().unwrap().len(), 1);
    assert_eq!(subs[0]["endpoint"], "https://push.example.net/x");
}

#[tokio::test]
async fn login_is_rate_limited() {
    let h = Harness::new();
    let app = app(&h);
    signup(&app, "owner@example.com", "Corner Cafe").await;

    let attempt = json!({ "email": "owner@example.com", "password": "wrong-password" });
    for _ in 0..5 {
        let (status, err) = call(&app, "POST", "/api/owner/login", None, Some(attempt.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["code"], ErrorCode::InvalidCredentials.code());
    }
    let (status, err) = call(&app, "POST", "/api/owner/login", None, Some(attempt)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err["code"], ErrorCode::TooManyRequests.code());
}
