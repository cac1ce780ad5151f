// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe API client and webhook signature verification.
//!
//! Handles:
//! - Checkout session creation for the pro plans
//! - `Stripe-Signature` header verification (HMAC-SHA256, `v1` scheme)

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook before it is rejected as a replay.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

/// Parameters for a subscription checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutParams<'a> {
    pub price_id: &'a str,
    pub user_id: &'a str,
    pub email: Option<&'a str>,
    /// Reuse an existing Stripe customer instead of creating one by email.
    pub customer_id: Option<&'a str>,
    pub yearly_upsell: bool,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// The parts of a checkout session we use.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.stripe.com/v1".to_string(),
            secret_key,
        }
    }

    /// Create a hosted checkout session for a subscription.
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutParams<'_>,
    ) -> Result<CheckoutSession, AppError> {
        let form = checkout_form(params);

        let response = self
            .http
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::StripeApi(format!("Checkout request failed: {}", e)))?;

        let session: CheckoutSession = self.check_response_json(response).await?;

        tracing::info!(
            session_id = %session.id,
            user_id = params.user_id,
            price_id = params.price_id,
            "Created checkout session"
        );

        Ok(session)
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .map(|b| {
                    format!(
                        "{}: {}",
                        b.error.kind.unwrap_or_else(|| "error".to_string()),
                        b.error.message.unwrap_or_default()
                    )
                })
                .unwrap_or(body);
            return Err(AppError::StripeApi(format!("HTTP {}: {}", status, detail)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::StripeApi(format!("Failed to parse response: {}", e)))
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn checkout_form(params: &CheckoutParams<'_>) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("mode", "subscription".to_string()),
        ("line_items[0][price]", params.price_id.to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("client_reference_id", params.user_id.to_string()),
        ("metadata[userId]", params.user_id.to_string()),
        ("metadata[yearlyUpsell]", params.yearly_upsell.to_string()),
        ("subscription_data[metadata][userId]", params.user_id.to_string()),
        ("success_url", params.success_url.to_string()),
        ("cancel_url", params.cancel_url.to_string()),
    ];

    match (params.customer_id, params.email) {
        (Some(customer_id), _) => form.push(("customer", customer_id.to_string())),
        (None, Some(email)) => form.push(("customer_email", email.to_string())),
        (None, None) => {}
    }

    form
}

/// Webhook signature failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed Stripe-Signature header")]
    Malformed,

    #[error("timestamp outside tolerance")]
    Expired,

    #[error("no matching v1 signature")]
    Mismatch,
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        AppError::InvalidSignature(err.to_string())
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`, as Stripe computes `v1`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    signature_bytes(secret, timestamp, payload)
        .map(hex::encode)
        .unwrap_or_default()
}

fn signature_bytes(secret: &str, timestamp: i64, payload: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Verify a `Stripe-Signature` header against the raw request body.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let expected = signature_bytes(secret, timestamp, payload).ok_or(SignatureError::Mismatch)?;
    let matched = candidates
        .iter()
        .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate.as_slice())));
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn header_for(payload: &[u8], timestamp: i64) -> String {
        format!(
            "t={},v1={},v0=ignored",
            timestamp,
            compute_signature(SECRET, timestamp, payload)
        )
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = header_for(payload, NOW);
        assert_eq!(
            verify_webhook_signature(payload, &header, SECRET, NOW + 10, SIGNATURE_TOLERANCE_SECS),
            Ok(())
        );
    }

    #[test]
    fn test_any_v1_may_match_during_secret_rotation() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = format!(
            "t={},v1={},v1={}",
            NOW,
            compute_signature("whsec_old", NOW, payload),
            compute_signature(SECRET, NOW, payload)
        );
        assert_eq!(
            verify_webhook_signature(payload, &header, SECRET, NOW, SIGNATURE_TOLERANCE_SECS),
            Ok(())
        );
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let header = header_for(br#"{"id":"evt_1"}"#, NOW);
        assert_eq!(
            verify_webhook_signature(
                br#"{"id":"evt_2"}"#,
                &header,
                SECRET,
                NOW,
                SIGNATURE_TOLERANCE_SECS
            ),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_old_timestamp_is_rejected() {
        let payload = b"{}";
        let header = header_for(payload, NOW - 301);
        assert_eq!(
            verify_webhook_signature(payload, &header, SECRET, NOW, SIGNATURE_TOLERANCE_SECS),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_malformed_headers() {
        for header in ["", "v1=abcd", "t=notanumber,v1=abcd", "t=1700000000"] {
            assert_eq!(
                verify_webhook_signature(b"{}", header, SECRET, NOW, SIGNATURE_TOLERANCE_SECS),
                Err(SignatureError::Malformed),
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_checkout_form_prefers_existing_customer() {
        let params = CheckoutParams {
            price_id: "price_1",
            user_id: "u1",
            email: Some("a@example.com"),
            customer_id: Some("cus_1"),
            yearly_upsell: true,
            success_url: "https://app/success",
            cancel_url: "https://app/cancel",
        };
        let form = checkout_form(&params);

        assert!(form.contains(&("customer", "cus_1".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "customer_email"));
        assert!(form.contains(&("metadata[yearlyUpsell]", "true".to_string())));
        assert!(form.contains(&("subscription_data[metadata][userId]", "u1".to_string())));

        let by_email = checkout_form(&CheckoutParams {
            customer_id: None,
            ..params
        });
        assert!(by_email.contains(&("customer_email", "a@example.com".to_string())));
    }
}
