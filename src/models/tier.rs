// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tier, subscription status and role variants.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Effective plan tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Tier {
    Free,
    Pro,
    Founder,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Founder => "founder",
        }
    }
}

/// Subscription status shown to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SubscriptionStatus {
    Inactive,
    Active,
    Trial,
    Expired,
    Founder,
}

/// Role claim carried by the session token.
///
/// Anything other than a recognised elevated role is treated as `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Free,
    /// Complimentary pro access granted outside of billing.
    Pro,
    Founder,
}

impl Role {
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("founder") => Role::Founder,
            Some("pro") => Role::Pro,
            _ => Role::Free,
        }
    }

    pub fn as_claim(self) -> Option<&'static str> {
        match self {
            Role::Free => None,
            Role::Pro => Some("pro"),
            Role::Founder => Some("founder"),
        }
    }
}
