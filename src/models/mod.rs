// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod entitlement;
pub mod stripe_event;
pub mod tier;

pub use entitlement::{
    EntitlementRecord, EntitlementSnapshot, PromptUsage, SubscriptionInfo, TrialInfo,
};
pub use stripe_event::{BillingEvent, StripeEvent};
pub use tier::{Role, SubscriptionStatus, Tier};
