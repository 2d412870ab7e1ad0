#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use delivery_relay::api::rest::router;
use delivery_relay::auth::Session;
use delivery_relay::config::Config;
use delivery_relay::state::AppState;
use delivery_relay::auth::Claims;
use delivery_relay::models::account::Role;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

pub struct Actor {
    pub account_id: i64,
    pub token: String,
    /// Vendor or partner profile id, when the role has one.
    pub profile_id: Option<i64>,
}

impl Actor {
    pub fn session(&self, state: &AppState) -> Session {
        state
            .authenticator
            .verify(&state.store, &self.token)
            .unwrap()
    }
}

/// A correctly signed token for `account_id` whose `exp` is `seconds_ago` in the past.
pub fn expired_token(account_id: i64, role: Role, seconds_ago: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: account_id.to_string(),
        role,
        iat: now - 3600,
        exp: now - seconds_ago,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(Config::default().jwt_secret.as_bytes()),
    )
    .unwrap()
}

pub fn setup() -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::new(Config::default()));
    let app = router(state.clone());
    (state, app)
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

pub async fn account(app: &Router, email: &str, role: &str) -> Actor {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/accounts",
            None,
            Some(json!({ "email": email, "name": "Test Account", "role": role })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    Actor {
        account_id: body["account"]["id"].as_i64().unwrap(),
        token: body["token"].as_str().unwrap().to_string(),
        profile_id: None,
    }
}

pub async fn customer(app: &Router, email: &str) -> Actor {
    account(app, email, "customer").await
}

pub async fn vendor(app: &Router, email: &str) -> Actor {
    let mut actor = account(app, email, "vendor").await;
    let (status, body) = send(
        app,
        request(
            "POST",
            "/vendors",
            Some(&actor.token),
            Some(json!({ "businessName": "Corner Deli", "address": "1 Market St" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    actor.profile_id = body["id"].as_i64();
    actor
}

pub async fn partner(app: &Router, email: &str, online: bool) -> Actor {
    let mut actor = account(app, email, "delivery").await;
    let (status, body) = send(
        app,
        request(
            "POST",
            "/partners",
            Some(&actor.token),
            Some(json!({ "vehicleType": "motorcycle" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    actor.profile_id = body["id"].as_i64();

    if online {
        set_online(app, &actor, true).await;
    }
    actor
}

pub async fn set_online(app: &Router, partner: &Actor, online: bool) -> Value {
    let (status, body) = send(
        app,
        request(
            "PATCH",
            "/partners/me/status",
            Some(&partner.token),
            Some(json!({ "online": online })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

/// A pending order placed by `customer` with `vendor`.
pub async fn order(app: &Router, customer: &Actor, vendor: &Actor) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/orders",
            Some(&customer.token),
            Some(json!({
                "vendorId": vendor.profile_id.unwrap(),
                "pickupAddress": "1 Market St",
                "deliveryAddress": "9 Elm St",
                "totalAmount": 24.5
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

pub async fn assign(app: &Router, vendor: &Actor, order_id: i64, partner: &Actor) -> (StatusCode, Value) {
    send(
        app,
        request(
            "POST",
            &format!("/orders/{order_id}/assign"),
            Some(&vendor.token),
            Some(json!({ "partnerId": partner.profile_id.unwrap() })),
        ),
    )
    .await
}

pub async fn update_status(app: &Router, actor: &Actor, order_id: i64, status: &str) -> (StatusCode, Value) {
    send(
        app,
        request(
            "PATCH",
            &format!("/orders/{order_id}/status"),
            Some(&actor.token),
            Some(json!({ "status": status })),
        ),
    )
    .await
}

pub async fn get_order(app: &Router, actor: &Actor, order_id: i64) -> (StatusCode, Value) {
    send(
        app,
        request("GET", &format!("/orders/{order_id}"), Some(&actor.token), None),
    )
    .await
}
