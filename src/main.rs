// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! StudyLens Entitlements API Server
//!
//! Serves tier, trial and prompt-quota state to the StudyLens dashboard
//! and applies Stripe billing webhooks.

use studylens_entitlements::{
    config::{Config, StoreBackend},
    db::FirestoreDb,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        trial_days = config.policy.trial_days,
        free_prompt_limit = config.policy.free_prompt_limit,
        pro_prompt_limit = config.policy.pro_prompt_limit,
        "Starting StudyLens entitlements API"
    );

    let db = match config.store_backend {
        StoreBackend::Firestore => FirestoreDb::new(&config.gcp_project_id).await?,
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; entitlements are lost on restart");
            FirestoreDb::new_in_memory()
        }
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(config, db));

    // Build router
    let app = studylens_entitlements::routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("studylens_entitlements=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;
    Ok(())
}
