// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user entitlement record and the snapshot served to the dashboard.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::tier::{SubscriptionStatus, Tier};
use crate::time_utils::{format_utc_rfc3339, parse_stored_timestamp};

/// Number of recently applied Stripe event ids kept for duplicate detection.
pub const APPLIED_EVENT_HISTORY: usize = 100;

/// Entitlement state stored in Firestore.
///
/// Stored at: `entitlements/{user_id}`
///
/// Every field has a default and is read leniently, so that a partial or
/// corrupt document degrades to the free zero-state instead of failing the
/// request. Scalars stored as strings (`"true"`, `"5"`) by older clients are
/// still understood.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    /// Auth provider user id (also used as document ID)
    #[serde(default, deserialize_with = "lenient")]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub email: Option<String>,

    // ─── Trial ───────────────────────────────────────────────────
    /// Set the first time a trial starts; never cleared.
    #[serde(default, deserialize_with = "lenient")]
    pub had_trial: bool,
    /// Trial start (ISO 8601)
    #[serde(default, deserialize_with = "lenient")]
    pub trial_start: Option<String>,
    /// Trial end (ISO 8601)
    #[serde(default, deserialize_with = "lenient")]
    pub trial_end: Option<String>,

    // ─── Billing ─────────────────────────────────────────────────
    #[serde(default, deserialize_with = "lenient")]
    pub is_pro: bool,
    /// Access ends after this instant unless payment recovers (ISO 8601)
    #[serde(default, deserialize_with = "lenient")]
    pub payment_grace_period_end: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub stripe_customer_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub stripe_subscription_id: Option<String>,
    /// Raw Stripe subscription status (`active`, `past_due`, ...)
    #[serde(default, deserialize_with = "lenient")]
    pub stripe_subscription_status: Option<String>,
    /// `created` of the newest state-bearing Stripe event applied (Unix seconds)
    #[serde(default, deserialize_with = "lenient")]
    pub stripe_state_updated_at: i64,
    /// Most recent applied Stripe event ids, oldest first
    #[serde(default, deserialize_with = "lenient")]
    pub applied_event_ids: Vec<String>,

    // ─── Prompt usage ────────────────────────────────────────────
    #[serde(default, deserialize_with = "lenient")]
    pub prompts_used: u32,
    /// When the current quota period ends (ISO 8601)
    #[serde(default, deserialize_with = "lenient")]
    pub prompt_reset_date: Option<String>,

    // ─── Metadata ────────────────────────────────────────────────
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: String,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: String,
}

impl EntitlementRecord {
    /// Fresh record for a user seen for the first time.
    pub fn new(user_id: &str, email: Option<&str>, now: DateTime<Utc>) -> Self {
        let now = format_utc_rfc3339(now);
        Self {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
            created_at: now.clone(),
            updated_at: now,
            ..Self::default()
        }
    }

    pub fn trial_start_at(&self) -> Option<DateTime<Utc>> {
        parse_stored_timestamp(self.trial_start.as_deref())
    }

    pub fn trial_end_at(&self) -> Option<DateTime<Utc>> {
        parse_stored_timestamp(self.trial_end.as_deref())
    }

    pub fn grace_period_end_at(&self) -> Option<DateTime<Utc>> {
        parse_stored_timestamp(self.payment_grace_period_end.as_deref())
    }

    pub fn prompt_reset_at(&self) -> Option<DateTime<Utc>> {
        parse_stored_timestamp(self.prompt_reset_date.as_deref())
    }

    pub fn has_applied_event(&self, event_id: &str) -> bool {
        self.applied_event_ids.iter().any(|id| id == event_id)
    }

    /// Remember an applied event id, evicting the oldest past capacity.
    pub fn remember_event(&mut self, event_id: &str) {
        if self.has_applied_event(event_id) {
            return;
        }
        self.applied_event_ids.push(event_id.to_string());
        if self.applied_event_ids.len() > APPLIED_EVENT_HISTORY {
            let excess = self.applied_event_ids.len() - APPLIED_EVENT_HISTORY;
            self.applied_event_ids.drain(..excess);
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = format_utc_rfc3339(now);
    }
}

/// Deserialize a stored field, falling back to its default on a type
/// mismatch instead of rejecting the whole document.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if let Ok(parsed) = serde_json::from_value::<T>(value.clone()) {
        return Ok(parsed);
    }
    let coerced = match &value {
        serde_json::Value::String(raw) => serde_json::from_str::<T>(raw.trim()).ok(),
        _ => None,
    };
    Ok(coerced.unwrap_or_default())
}

/// Trial window as seen by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrialInfo {
    pub is_in_trial: bool,
    pub days_left: u32,
    pub trial_start_date: Option<String>,
    pub trial_end_date: Option<String>,
    pub had_trial_before: bool,
}

/// Prompt quota for the current period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PromptUsage {
    pub used: u32,
    /// `None` when unlimited
    pub limit: Option<u32>,
    pub unlimited: bool,
    pub reset_date: Option<String>,
    pub remaining: Option<u32>,
}

/// Subscription state as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SubscriptionInfo {
    pub status: SubscriptionStatus,
    pub payment_grace_period_end: Option<String>,
    pub in_grace_period: bool,
    pub stripe_subscription_status: Option<String>,
}

/// Everything the dashboard needs to gate features.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EntitlementSnapshot {
    pub user_id: String,
    pub email: Option<String>,
    pub tier: Tier,
    pub trial_info: TrialInfo,
    pub prompt_usage: PromptUsage,
    pub subscription: SubscriptionInfo,
}
