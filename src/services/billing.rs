// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe event application.
//!
//! Stripe delivers webhooks at least once and in no particular order. Each
//! record keeps the ids of recently applied events (replays are no-ops) and
//! the `created` time of the newest applied event (older events may only
//! fill in missing Stripe ids, never change access).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EntitlementPolicy;
use crate::db::FirestoreDb;
use crate::error::Result;
use crate::models::stripe_event::BillingAction;
use crate::models::{BillingEvent, EntitlementRecord, StripeEvent};
use crate::time_utils::format_utc_rfc3339;

/// What happened to a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Applied,
    /// Already applied earlier.
    Duplicate,
    /// Older than state already applied; only ids were recorded.
    Stale,
    /// No user could be matched to the event.
    UnknownUser,
    /// Event type carries nothing we track.
    Ignored,
}

/// Apply a billing event to one record.
pub fn apply_billing_event(
    record: &mut EntitlementRecord,
    event: &BillingEvent,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> SyncOutcome {
    if record.has_applied_event(&event.event_id) {
        return SyncOutcome::Duplicate;
    }
    record.remember_event(&event.event_id);

    if event.created < record.stripe_state_updated_at {
        fill_missing_ids(record, event);
        return SyncOutcome::Stale;
    }
    record.stripe_state_updated_at = event.created;

    if let Some(customer_id) = &event.customer_id {
        record.stripe_customer_id = Some(customer_id.clone());
    }
    if let Some(subscription_id) = &event.subscription_id {
        record.stripe_subscription_id = Some(subscription_id.clone());
    }

    match &event.action {
        BillingAction::CheckoutCompleted => {
            grant_pro(record);
            if record.stripe_subscription_status.is_none() {
                record.stripe_subscription_status = Some("active".to_string());
            }
        }
        BillingAction::SubscriptionStatus(status) => {
            match status.as_str() {
                "active" | "trialing" => grant_pro(record),
                "past_due" | "unpaid" => {
                    if !record.is_pro {
                        // A grace on a free record is the trial's, not a payment grace.
                        record.payment_grace_period_end = None;
                        record.is_pro = true;
                    }
                    open_grace(record, policy, now);
                }
                "canceled" | "incomplete_expired" => revoke_pro(record),
                _ => {}
            }
            record.stripe_subscription_status = Some(status.clone());
        }
        BillingAction::SubscriptionDeleted => {
            revoke_pro(record);
            record.stripe_subscription_status = Some("canceled".to_string());
        }
        BillingAction::PaymentSucceeded => grant_pro(record),
        BillingAction::PaymentFailed => {
            if record.is_pro {
                open_grace(record, policy, now);
            }
        }
    }

    SyncOutcome::Applied
}

fn grant_pro(record: &mut EntitlementRecord) {
    record.is_pro = true;
    record.payment_grace_period_end = None;
}

fn revoke_pro(record: &mut EntitlementRecord) {
    record.is_pro = false;
    record.payment_grace_period_end = None;
}

/// Start the payment grace window unless one is already running.
fn open_grace(record: &mut EntitlementRecord, policy: &EntitlementPolicy, now: DateTime<Utc>) {
    if record.payment_grace_period_end.is_none() {
        record.payment_grace_period_end = Some(format_utc_rfc3339(now + policy.grace_period()));
    }
}

fn fill_missing_ids(record: &mut EntitlementRecord, event: &BillingEvent) {
    if record.stripe_customer_id.is_none() {
        record.stripe_customer_id = event.customer_id.clone();
    }
    if record.stripe_subscription_id.is_none() {
        record.stripe_subscription_id = event.subscription_id.clone();
    }
}

/// Apply a verified webhook event to the store.
pub async fn sync_stripe_event(
    db: &FirestoreDb,
    policy: &EntitlementPolicy,
    event: &StripeEvent,
    now: DateTime<Utc>,
) -> Result<SyncOutcome> {
    let Some(billing) = BillingEvent::from_stripe(event) else {
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Ignoring unhandled event type"
        );
        return Ok(SyncOutcome::Ignored);
    };

    let user_id = match (&billing.user_id, &billing.customer_id) {
        (Some(user_id), _) => Some(user_id.clone()),
        (None, Some(customer_id)) => db.find_user_by_customer(customer_id).await?,
        (None, None) => None,
    };

    let Some(user_id) = user_id else {
        tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            customer_id = ?billing.customer_id,
            "No user matches Stripe event"
        );
        return Ok(SyncOutcome::UnknownUser);
    };

    let seed = EntitlementRecord::new(&user_id, None, now);
    let policy = policy.clone();
    let (record, outcome) = db
        .update_entitlement_atomic(&user_id, seed, move |record| {
            let outcome = apply_billing_event(record, &billing, &policy, now);
            if outcome != SyncOutcome::Duplicate {
                record.touch(now);
            }
            outcome
        })
        .await?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        user_id = %user_id,
        outcome = ?outcome,
        is_pro = record.is_pro,
        "Stripe event processed"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
    }

    fn billing(id: &str, created: i64, action: BillingAction) -> BillingEvent {
        BillingEvent {
            event_id: id.to_string(),
            created,
            action,
            user_id: Some("u1".to_string()),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
        }
    }

    #[test]
    fn test_checkout_grants_pro_and_clears_trial_grace() {
        let policy = EntitlementPolicy::default();
        let mut record = EntitlementRecord {
            payment_grace_period_end: Some(format_utc_rfc3339(now())),
            ..Default::default()
        };

        let outcome = apply_billing_event(
            &mut record,
            &billing("evt_1", 100, BillingAction::CheckoutCompleted),
            &policy,
            now(),
        );

        assert_eq!(outcome, SyncOutcome::Applied);
        assert!(record.is_pro);
        assert_eq!(record.payment_grace_period_end, None);
        assert_eq!(record.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(record.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn test_replayed_event_is_applied_once() {
        let policy = EntitlementPolicy::default();
        let mut record = EntitlementRecord::default();
        let event = billing("evt_1", 100, BillingAction::CheckoutCompleted);

        apply_billing_event(&mut record, &event, &policy, now());
        // Downgrade through another event, then replay the first.
        apply_billing_event(
            &mut record,
            &billing("evt_2", 200, BillingAction::SubscriptionDeleted),
            &policy,
            now(),
        );
        let outcome = apply_billing_event(&mut record, &event, &policy, now());

        assert_eq!(outcome, SyncOutcome::Duplicate);
        assert!(!record.is_pro);
    }

    #[test]
    fn test_stale_event_does_not_override_newer_state() {
        let policy = EntitlementPolicy::default();
        let mut record = EntitlementRecord::default();

        apply_billing_event(
            &mut record,
            &billing("evt_new", 200, BillingAction::SubscriptionDeleted),
            &policy,
            now(),
        );
        let outcome = apply_billing_event(
            &mut record,
            &billing(
                "evt_old",
                100,
                BillingAction::SubscriptionStatus("active".to_string()),
            ),
            &policy,
            now(),
        );

        assert_eq!(outcome, SyncOutcome::Stale);
        assert!(!record.is_pro);
        assert!(record.has_applied_event("evt_old"));
    }

    #[test]
    fn test_payment_failure_opens_single_grace_window() {
        let policy = EntitlementPolicy::default();
        let mut record = EntitlementRecord::default();
        apply_billing_event(
            &mut record,
            &billing("evt_1", 100, BillingAction::CheckoutCompleted),
            &policy,
            now(),
        );

        apply_billing_event(
            &mut record,
            &billing("evt_2", 200, BillingAction::PaymentFailed),
            &policy,
            now(),
        );
        let first_grace = record.grace_period_end_at();
        assert_eq!(first_grace, Some(now() + Duration::hours(24)));

        apply_billing_event(
            &mut record,
            &billing("evt_3", 300, BillingAction::PaymentFailed),
            &policy,
            now() + Duration::hours(5),
        );
        assert_eq!(record.grace_period_end_at(), first_grace);
        assert!(record.is_pro);

        apply_billing_event(
            &mut record,
            &billing("evt_4", 400, BillingAction::PaymentSucceeded),
            &policy,
            now(),
        );
        assert_eq!(record.payment_grace_period_end, None);
    }

    #[test]
    fn test_subscription_statuses() {
        let policy = EntitlementPolicy::default();
        let mut record = EntitlementRecord::default();

        apply_billing_event(
            &mut record,
            &billing(
                "evt_1",
                100,
                BillingAction::SubscriptionStatus("past_due".to_string()),
            ),
            &policy,
            now(),
        );
        assert!(record.is_pro);
        assert!(record.payment_grace_period_end.is_some());
        assert_eq!(record.stripe_subscription_status.as_deref(), Some("past_due"));

        apply_billing_event(
            &mut record,
            &billing(
                "evt_2",
                200,
                BillingAction::SubscriptionStatus("canceled".to_string()),
            ),
            &policy,
            now(),
        );
        assert!(!record.is_pro);
        assert!(record.payment_grace_period_end.is_none());
    }

    #[test]
    fn test_past_due_after_expired_trial_opens_payment_grace() {
        use crate::models::{Role, Tier};
        use crate::services::tier::resolve_tier;
        use crate::services::trial::evaluate_trial;

        let policy = EntitlementPolicy::default();
        let trial_end = now() - Duration::days(10);
        let mut record = EntitlementRecord {
            had_trial: true,
            trial_start: Some(format_utc_rfc3339(trial_end - Duration::days(3))),
            trial_end: Some(format_utc_rfc3339(trial_end)),
            ..Default::default()
        };
        evaluate_trial(&mut record, &policy, now());
        assert!(record.grace_period_end_at().is_some_and(|end| end < now()));

        apply_billing_event(
            &mut record,
            &billing(
                "evt_1",
                100,
                BillingAction::SubscriptionStatus("past_due".to_string()),
            ),
            &policy,
            now(),
        );

        assert!(record.is_pro);
        assert_eq!(
            record.grace_period_end_at(),
            Some(now() + policy.grace_period())
        );
        assert_eq!(
            resolve_tier(Role::Free, None, &record, &policy, now()),
            Tier::Pro
        );
    }

    #[tokio::test]
    async fn test_sync_resolves_user_by_customer() {
        let db = FirestoreDb::new_in_memory();
        let policy = EntitlementPolicy::default();
        let mut existing = EntitlementRecord::new("u7", None, now());
        existing.stripe_customer_id = Some("cus_7".to_string());
        db.upsert_entitlement(&existing).await.unwrap();

        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_7",
            "type": "invoice.payment_succeeded",
            "created": 1_700_000_000,
            "data": { "object": { "id": "in_7", "customer": "cus_7" } }
        }))
        .unwrap();

        let outcome = sync_stripe_event(&db, &policy, &event, now()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Applied);
        assert!(db.get_entitlement("u7").await.unwrap().unwrap().is_pro);

        let replay = sync_stripe_event(&db, &policy, &event, now()).await.unwrap();
        assert_eq!(replay, SyncOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_sync_unknown_customer() {
        let db = FirestoreDb::new_in_memory();
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_8",
            "type": "invoice.payment_failed",
            "created": 1_700_000_000,
            "data": { "object": { "id": "in_8", "customer": "cus_unknown" } }
        }))
        .unwrap();

        let outcome = sync_stripe_event(&db, &EntitlementPolicy::default(), &event, now())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::UnknownUser);
        assert_eq!(db.get_entitlement("cus_unknown").await.unwrap(), None);
    }
}
