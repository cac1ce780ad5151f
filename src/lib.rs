// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! StudyLens entitlements: tiers, trials and prompt quotas
//!
//! This crate provides the backend API that decides what a StudyLens user
//! may do (free, pro or founder), tracks free trials and AI prompt usage,
//! and keeps subscription state in sync with Stripe.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{EntitlementService, StripeClient};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub entitlements: EntitlementService,
    pub stripe: StripeClient,
}

impl AppState {
    /// Wire services around an already-connected store.
    pub fn new(config: Config, db: FirestoreDb) -> Self {
        let entitlements = EntitlementService::new(db.clone(), config.policy.clone());
        let stripe = StripeClient::new(config.stripe_secret_key.clone());
        Self {
            config,
            db,
            entitlements,
            stripe,
        }
    }
}
