// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{EntitlementSnapshot, Role};
use crate::services::stripe::CheckoutParams;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/entitlements", get(get_entitlements))
        .route("/api/usage/prompts", post(record_prompt))
        .route("/api/checkout", post(create_checkout))
}

// ─── Entitlements ────────────────────────────────────────────

/// Current tier, trial, quota and subscription state.
async fn get_entitlements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<EntitlementSnapshot>> {
    tracing::debug!(user_id = %user.user_id, "Fetching entitlements");
    Ok(Json(state.entitlements.snapshot(&user).await?))
}

/// Count one AI prompt. Called by the dashboard after each prompt.
async fn record_prompt(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<EntitlementSnapshot>> {
    Ok(Json(state.entitlements.update_prompt_usage(&user).await?))
}

// ─── Checkout ────────────────────────────────────────────────

/// Checkout request body. User id and email come from the session.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(alias = "price_id")]
    #[validate(length(min = 1, max = 255))]
    pub price_id: String,
    #[serde(default, alias = "yearly_upsell")]
    pub yearly_upsell: bool,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Start a Stripe checkout for one of the pro plans.
async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(format!("Invalid checkout request: {}", e)))?;

    if !state.config.is_known_price(&body.price_id) {
        return Err(AppError::BadRequest(format!(
            "Unknown price '{}'",
            body.price_id
        )));
    }

    let is_founder = user.role == Role::Founder
        || user
            .email
            .as_deref()
            .is_some_and(|e| state.entitlements.policy().is_founder_email(e));
    if is_founder {
        return Err(AppError::BadRequest(
            "Founder accounts already have unlimited access".to_string(),
        ));
    }

    let record = state.db.get_entitlement(&user.user_id).await?;
    let customer_id = record.as_ref().and_then(|r| r.stripe_customer_id.clone());

    let success_url = format!(
        "{}/dashboard?checkout=success&session_id={{CHECKOUT_SESSION_ID}}",
        state.config.frontend_url
    );
    let cancel_url = format!("{}/pricing?checkout=cancelled", state.config.frontend_url);

    tracing::info!(
        user_id = %user.user_id,
        price_id = %body.price_id,
        yearly_upsell = body.yearly_upsell,
        "Starting checkout"
    );

    let session = state
        .stripe
        .create_checkout_session(&CheckoutParams {
            price_id: &body.price_id,
            user_id: &user.user_id,
            email: user.email.as_deref(),
            customer_id: customer_id.as_deref(),
            yearly_upsell: body.yearly_upsell,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await?;

    let url = session
        .url
        .ok_or_else(|| AppError::StripeApi("Checkout session has no URL".to_string()))?;

    Ok(Json(CheckoutResponse { url }))
}
