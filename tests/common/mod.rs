// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::Response;
use chrono::Utc;
use studylens_entitlements::config::Config;
use studylens_entitlements::db::FirestoreDb;
use studylens_entitlements::middleware::auth::create_jwt;
use studylens_entitlements::models::Role;
use studylens_entitlements::routes::create_router;
use studylens_entitlements::services::stripe::compute_signature;
use studylens_entitlements::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app backed by the in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        Config::test_default(),
        FirestoreDb::new_in_memory(),
    ));
    (create_router(state.clone()), state)
}

/// Session token for a test user.
#[allow(dead_code)]
pub fn test_token(state: &AppState, user_id: &str, email: Option<&str>, role: Role) -> String {
    create_jwt(user_id, email, role, &state.config.jwt_signing_key).unwrap()
}

/// `Stripe-Signature` header value for a payload signed now.
#[allow(dead_code)]
pub fn sign_payload(state: &AppState, payload: &[u8]) -> String {
    let timestamp = Utc::now().timestamp();
    let signature = compute_signature(&state.config.stripe_webhook_secret, timestamp, payload);
    format!("t={},v1={}", timestamp, signature)
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
