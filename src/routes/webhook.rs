// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for Stripe billing events.

use crate::error::{AppError, Result};
use crate::models::StripeEvent;
use crate::services::billing::{sync_stripe_event, SyncOutcome};
use crate::services::stripe::{verify_webhook_signature, SIGNATURE_TOLERANCE_SECS};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Header carrying `t=<unix>,v1=<hex hmac>`.
const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/stripe", post(handle_event))
}

#[derive(Serialize, Debug)]
struct WebhookAck {
    received: bool,
    outcome: SyncOutcome,
}

/// Handle a Stripe event (POST).
///
/// The signature covers the raw body, so the payload is only parsed after
/// verification. Events for users we cannot resolve are still acknowledged
/// so Stripe stops retrying them.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("missing Stripe-Signature header".into()))?;

    let now = Utc::now();
    if let Err(e) = verify_webhook_signature(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        now.timestamp(),
        SIGNATURE_TOLERANCE_SECS,
    ) {
        tracing::warn!(error = %e, "Security Alert: Stripe webhook signature rejected");
        return Err(e.into());
    }

    let event: StripeEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Stripe event");
        AppError::BadRequest(format!("Invalid event payload: {}", e))
    })?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Stripe event received"
    );

    let outcome =
        sync_stripe_event(&state.db, state.entitlements.policy(), &event, now).await?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
