// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe webhook event payloads.
//!
//! Only the handful of fields the entitlement sync needs are extracted;
//! the event object is kept as raw JSON because its shape depends on the
//! event type and the account's API version.

use serde::Deserialize;
use serde_json::Value;

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp of event creation
    #[serde(default)]
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

/// What a billing event does to a user's entitlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAction {
    /// `checkout.session.completed`
    CheckoutCompleted,
    /// `customer.subscription.created` / `.updated` with Stripe's status string
    SubscriptionStatus(String),
    /// `customer.subscription.deleted`
    SubscriptionDeleted,
    /// `invoice.payment_succeeded` / `invoice.paid`
    PaymentSucceeded,
    /// `invoice.payment_failed`
    PaymentFailed,
}

/// A Stripe event reduced to the fields the entitlement sync uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEvent {
    pub event_id: String,
    pub created: i64,
    pub action: BillingAction,
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

impl BillingEvent {
    /// Interpret a webhook event. Returns `None` for event types we ignore.
    pub fn from_stripe(event: &StripeEvent) -> Option<Self> {
        let object = &event.data.object;

        let action = match event.event_type.as_str() {
            "checkout.session.completed" => BillingAction::CheckoutCompleted,
            "customer.subscription.created" | "customer.subscription.updated" => {
                BillingAction::SubscriptionStatus(str_field(object, &["status"])?.to_string())
            }
            "customer.subscription.deleted" => BillingAction::SubscriptionDeleted,
            "invoice.payment_succeeded" | "invoice.paid" => BillingAction::PaymentSucceeded,
            "invoice.payment_failed" => BillingAction::PaymentFailed,
            _ => return None,
        };

        let subscription_id = match &action {
            BillingAction::SubscriptionStatus(_) | BillingAction::SubscriptionDeleted => {
                str_field(object, &["id"])
            }
            _ => id_field(object, &["subscription"]).or_else(|| {
                str_field(
                    object,
                    &["parent", "subscription_details", "subscription"],
                )
            }),
        };

        let user_id = str_field(object, &["metadata", "userId"])
            .or_else(|| str_field(object, &["client_reference_id"]))
            .or_else(|| str_field(object, &["subscription_details", "metadata", "userId"]))
            .or_else(|| {
                str_field(
                    object,
                    &["parent", "subscription_details", "metadata", "userId"],
                )
            });

        Some(Self {
            event_id: event.id.clone(),
            created: event.created,
            action,
            user_id: user_id.map(str::to_string),
            customer_id: id_field(object, &["customer"]).map(str::to_string),
            subscription_id: subscription_id.map(str::to_string),
        })
    }
}

/// Non-empty string at a nested path.
fn str_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// Stripe id that may be a bare string or an expanded object with an `id`.
fn id_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let field = path.iter().try_fold(value, |v, key| v.get(*key))?;
    field
        .as_str()
        .or_else(|| field.get("id").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}
