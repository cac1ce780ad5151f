// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trial window calculation.
//!
//! A free user gets exactly one trial, started automatically the first time
//! their entitlements are evaluated. Once the trial ends the subscription
//! status becomes `expired` and a grace window is recorded, anchored at the
//! trial end.

use chrono::{DateTime, Utc};

use crate::config::EntitlementPolicy;
use crate::models::{EntitlementRecord, SubscriptionStatus, TrialInfo};
use crate::time_utils::format_utc_rfc3339;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Outcome of evaluating the trial window for a free-tier user.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialEvaluation {
    pub info: TrialInfo,
    pub status: SubscriptionStatus,
    /// The record was mutated and must be persisted.
    pub changed: bool,
}

/// Evaluate (and if needed start) the trial for a free-tier user.
///
/// Must only be called for users that resolved to [`crate::models::Tier::Free`];
/// pro and founder users get [`TrialInfo::default`].
pub fn evaluate_trial(
    record: &mut EntitlementRecord,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> TrialEvaluation {
    let mut changed = false;

    // Former subscribers never get a trial; they already had full access.
    if record.trial_end_at().is_none()
        && !record.had_trial
        && record.stripe_subscription_id.is_none()
    {
        record.trial_start = Some(format_utc_rfc3339(now));
        record.trial_end = Some(format_utc_rfc3339(now + policy.trial_length()));
        record.had_trial = true;
        changed = true;
        tracing::info!(
            user_id = %record.user_id,
            trial_days = policy.trial_days,
            "Started trial"
        );
    }

    let Some(trial_end) = record.trial_end_at() else {
        let status = if record.had_trial {
            SubscriptionStatus::Expired
        } else {
            SubscriptionStatus::Inactive
        };
        return TrialEvaluation {
            info: expired_info(record),
            status,
            changed,
        };
    };

    if now >= trial_end {
        // Only a trial grace; an open payment grace on a pro record is kept.
        if !record.is_pro {
            let grace_end = format_utc_rfc3339(trial_end + policy.grace_period());
            if record.payment_grace_period_end.as_deref() != Some(grace_end.as_str()) {
                record.payment_grace_period_end = Some(grace_end);
                changed = true;
            }
        }
        return TrialEvaluation {
            info: expired_info(record),
            status: SubscriptionStatus::Expired,
            changed,
        };
    }

    TrialEvaluation {
        info: TrialInfo {
            is_in_trial: true,
            days_left: days_left(trial_end, now),
            trial_start_date: record.trial_start.clone(),
            trial_end_date: record.trial_end.clone(),
            had_trial_before: record.had_trial,
        },
        status: SubscriptionStatus::Trial,
        changed,
    }
}

/// Whole days remaining, rounded up and never negative.
pub fn days_left(trial_end: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let remaining = (trial_end - now).num_milliseconds();
    if remaining <= 0 {
        return 0;
    }
    let days = (remaining + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

fn expired_info(record: &EntitlementRecord) -> TrialInfo {
    TrialInfo {
        is_in_trial: false,
        days_left: 0,
        trial_start_date: record.trial_start.clone(),
        trial_end_date: record.trial_end.clone(),
        had_trial_before: record.had_trial,
    }
}
