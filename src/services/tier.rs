// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tier resolution from identity and billing state.

use chrono::{DateTime, Utc};

use crate::config::EntitlementPolicy;
use crate::models::{EntitlementRecord, Role, Tier};

/// Resolve the effective tier.
///
/// Founder (role claim or allowlisted email) wins over everything else.
/// Pro requires a complimentary pro role or a paid subscription whose
/// payment grace period, if one is open, has not run out. Everything else
/// is free, including users inside their trial.
pub fn resolve_tier(
    role: Role,
    email: Option<&str>,
    record: &EntitlementRecord,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> Tier {
    if role == Role::Founder || email.is_some_and(|e| policy.is_founder_email(e)) {
        return Tier::Founder;
    }

    if role == Role::Pro || has_paid_access(record, now) {
        return Tier::Pro;
    }

    Tier::Free
}

/// Whether billing state grants pro right now.
pub fn has_paid_access(record: &EntitlementRecord, now: DateTime<Utc>) -> bool {
    if !record.is_pro {
        return false;
    }
    match record.grace_period_end_at() {
        Some(grace_end) => now <= grace_end,
        None => true,
    }
}
