// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prompt quota tracking.

use chrono::{DateTime, Utc};

use crate::config::EntitlementPolicy;
use crate::models::{EntitlementRecord, PromptUsage, Tier};
use crate::time_utils::format_utc_rfc3339;

/// Prompt allowance for a tier. `None` means unlimited.
pub fn prompt_limit(tier: Tier, policy: &EntitlementPolicy) -> Option<u32> {
    match tier {
        Tier::Founder => None,
        Tier::Pro => Some(policy.pro_prompt_limit),
        Tier::Free => Some(policy.free_prompt_limit),
    }
}

/// Start a new period if the current one is over (or was never started).
///
/// Returns `true` if the record changed.
pub fn roll_over(
    record: &mut EntitlementRecord,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> bool {
    let expired = match record.prompt_reset_at() {
        Some(reset) => now > reset,
        None => true,
    };
    if !expired {
        return false;
    }

    record.prompts_used = 0;
    record.prompt_reset_date = Some(format_utc_rfc3339(now + policy.quota_period.duration()));
    true
}

/// Current usage view for a tier, without mutating anything.
pub fn usage(record: &EntitlementRecord, tier: Tier, policy: &EntitlementPolicy) -> PromptUsage {
    let limit = prompt_limit(tier, policy);
    PromptUsage {
        used: record.prompts_used,
        limit,
        unlimited: limit.is_none(),
        reset_date: record.prompt_reset_date.clone(),
        remaining: limit.map(|l| l.saturating_sub(record.prompts_used)),
    }
}

/// Result of trying to consume one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// Unlimited tier; nothing was recorded.
    Unlimited,
    /// Counted; carries the new usage count.
    Counted(u32),
    /// The period allowance is used up; nothing was recorded.
    Exhausted { used: u32, limit: u32 },
}

/// Consume one prompt from the current period.
///
/// Unlimited tiers leave the record untouched. Capped tiers roll the period
/// over first, then count the prompt unless the allowance is already spent.
pub fn consume_prompt(
    record: &mut EntitlementRecord,
    tier: Tier,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> Consumption {
    let Some(limit) = prompt_limit(tier, policy) else {
        return Consumption::Unlimited;
    };

    roll_over(record, policy, now);

    if record.prompts_used >= limit {
        return Consumption::Exhausted {
            used: record.prompts_used,
            limit,
        };
    }

    record.prompts_used += 1;
    Consumption::Counted(record.prompts_used)
}
