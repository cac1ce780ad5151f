// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entitlement snapshots and prompt accounting.
//!
//! Ties the tier resolver, trial calculator and quota tracker together over
//! the store. Every call is a single atomic read-modify-write of the user's
//! record, so concurrent dashboard tabs cannot lose usage increments.

use chrono::{DateTime, Utc};

use crate::config::EntitlementPolicy;
use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    EntitlementRecord, EntitlementSnapshot, SubscriptionInfo, SubscriptionStatus, Tier, TrialInfo,
};
use crate::services::quota::{self, Consumption};
use crate::services::tier::resolve_tier;
use crate::services::trial::evaluate_trial;

/// Entitlement service backed by the record store.
#[derive(Clone)]
pub struct EntitlementService {
    db: FirestoreDb,
    policy: EntitlementPolicy,
}

impl EntitlementService {
    pub fn new(db: FirestoreDb, policy: EntitlementPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &EntitlementPolicy {
        &self.policy
    }

    /// Current entitlements, starting the trial on first sight.
    pub async fn snapshot(&self, user: &AuthUser) -> Result<EntitlementSnapshot> {
        self.snapshot_at(user, Utc::now()).await
    }

    pub async fn snapshot_at(
        &self,
        user: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<EntitlementSnapshot> {
        let seed = EntitlementRecord::new(&user.user_id, user.email.as_deref(), now);
        let (owner, policy) = (user.clone(), self.policy.clone());
        let (_, snapshot) = self
            .db
            .update_entitlement_atomic(&user.user_id, seed, move |record| {
                evaluate(record, &owner, &policy, now)
            })
            .await?;
        Ok(snapshot)
    }

    /// Count one AI prompt against the user's quota.
    ///
    /// Unlimited users are not counted. Returns [`AppError::QuotaExceeded`]
    /// when the period allowance is used up.
    pub async fn update_prompt_usage(&self, user: &AuthUser) -> Result<EntitlementSnapshot> {
        self.update_prompt_usage_at(user, Utc::now()).await
    }

    pub async fn update_prompt_usage_at(
        &self,
        user: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<EntitlementSnapshot> {
        let seed = EntitlementRecord::new(&user.user_id, user.email.as_deref(), now);
        let (owner, policy) = (user.clone(), self.policy.clone());
        let (_, (snapshot, consumption)) = self
            .db
            .update_entitlement_atomic(&user.user_id, seed, move |record| {
                let mut snapshot = evaluate(record, &owner, &policy, now);
                let consumption = quota::consume_prompt(record, snapshot.tier, &policy, now);
                if let Consumption::Counted(_) = consumption {
                    record.touch(now);
                    snapshot.prompt_usage = quota::usage(record, snapshot.tier, &policy);
                }
                (snapshot, consumption)
            })
            .await?;

        match consumption {
            Consumption::Unlimited => {
                tracing::debug!(user_id = %user.user_id, "Prompt not counted (unlimited)");
                Ok(snapshot)
            }
            Consumption::Counted(used) => {
                tracing::debug!(
                    user_id = %user.user_id,
                    used,
                    limit = ?snapshot.prompt_usage.limit,
                    "Prompt counted"
                );
                Ok(snapshot)
            }
            Consumption::Exhausted { used, limit } => {
                tracing::info!(
                    user_id = %user.user_id,
                    tier = snapshot.tier.as_str(),
                    used,
                    limit,
                    "Prompt quota exhausted"
                );
                Err(AppError::QuotaExceeded { used, limit })
            }
        }
    }
}

/// Derive the snapshot for `user`, applying the trial and quota-period
/// side effects to `record`.
pub fn evaluate(
    record: &mut EntitlementRecord,
    user: &AuthUser,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> EntitlementSnapshot {
    let before = record.clone();

    if user.email.is_some() && record.email != user.email {
        record.email = user.email.clone();
    }

    let tier = resolve_tier(user.role, user.email.as_deref(), record, policy, now);

    let (trial_info, status) = match tier {
        Tier::Founder => (TrialInfo::default(), SubscriptionStatus::Founder),
        Tier::Pro => (TrialInfo::default(), SubscriptionStatus::Active),
        Tier::Free => {
            let eval = evaluate_trial(record, policy, now);
            (eval.info, eval.status)
        }
    };

    if tier != Tier::Founder {
        quota::roll_over(record, policy, now);
    }

    if *record != before {
        record.touch(now);
    }

    let grace_end = record.grace_period_end_at();
    EntitlementSnapshot {
        user_id: record.user_id.clone(),
        email: record.email.clone(),
        tier,
        trial_info,
        prompt_usage: quota::usage(record, tier, policy),
        subscription: SubscriptionInfo {
            status,
            payment_grace_period_end: record.payment_grace_period_end.clone(),
            in_grace_period: grace_end.is_some_and(|end| now <= end),
            stripe_subscription_status: record.stripe_subscription_status.clone(),
        },
    }
}
