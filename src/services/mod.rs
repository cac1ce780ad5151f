// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod billing;
pub mod entitlements;
pub mod quota;
pub mod stripe;
pub mod tier;
pub mod trial;

pub use billing::{sync_stripe_event, SyncOutcome};
pub use entitlements::EntitlementService;
pub use stripe::StripeClient;
