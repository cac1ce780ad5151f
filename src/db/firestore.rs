// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Entitlement records live in one collection keyed by user id. Every
//! mutation goes through [`FirestoreDb::update_entitlement_atomic`] so the
//! usage counter and billing flags are never written from a stale read.
//!
//! An in-memory backend with the same API serves tests and local runs.

use std::sync::Arc;

use dashmap::DashMap;
use firestore::errors::{BackoffError, FirestoreError};

use crate::db::collections;
use crate::error::AppError;
use crate::models::EntitlementRecord;

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<DashMap<String, EntitlementRecord>>),
}

/// Entitlement store.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a process-local store (tests, local development).
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
        }
    }

    // ─── Entitlement Operations ──────────────────────────────────

    /// Get the entitlement record for a user.
    pub async fn get_entitlement(
        &self,
        user_id: &str,
    ) -> Result<Option<EntitlementRecord>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::ENTITLEMENTS)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(map) => Ok(map.get(user_id).map(|r| r.value().clone())),
        }
    }

    /// Create or replace an entitlement record.
    pub async fn upsert_entitlement(&self, record: &EntitlementRecord) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::ENTITLEMENTS)
                    .document_id(&record.user_id)
                    .object(record)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
            Backend::Memory(map) => {
                map.insert(record.user_id.clone(), record.clone());
            }
        }
        Ok(())
    }

    /// Find the user that owns a Stripe customer.
    pub async fn find_user_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let records: Vec<EntitlementRecord> = client
                    .fluent()
                    .select()
                    .from(collections::ENTITLEMENTS)
                    .filter(|q| q.for_all([q.field("stripe_customer_id").eq(customer_id)]))
                    .limit(1)
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(records.into_iter().next().map(|r| r.user_id))
            }
            Backend::Memory(map) => Ok(map
                .iter()
                .find(|r| r.stripe_customer_id.as_deref() == Some(customer_id))
                .map(|r| r.key().clone())),
        }
    }

    // ─── Atomic Read-Modify-Write ────────────────────────────────

    /// Atomically read a user's record, apply `apply`, and write it back.
    ///
    /// `seed` is used when the user has no record yet. The write is skipped
    /// when `apply` leaves an existing record unchanged. Returns the record as
    /// stored after the update together with the closure's result.
    ///
    /// On Firestore the closure may run more than once: the read is bound to
    /// the transaction and a contended commit is retried from a fresh read.
    pub async fn update_entitlement_atomic<F, R>(
        &self,
        user_id: &str,
        seed: EntitlementRecord,
        apply: F,
    ) -> Result<(EntitlementRecord, R), AppError>
    where
        F: Fn(&mut EntitlementRecord) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        match &self.backend {
            Backend::Firestore(client) => {
                Self::update_firestore_atomic(client, user_id, seed, apply).await
            }
            Backend::Memory(map) => {
                // The entry guard holds the shard lock for the whole mutation.
                let mut entry = map.entry(user_id.to_string()).or_insert(seed);
                let result = apply(entry.value_mut());
                Ok((entry.value().clone(), result))
            }
        }
    }

    async fn update_firestore_atomic<F, R>(
        client: &firestore::FirestoreDb,
        user_id: &str,
        seed: EntitlementRecord,
        apply: F,
    ) -> Result<(EntitlementRecord, R), AppError>
    where
        F: Fn(&mut EntitlementRecord) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let apply = Arc::new(apply);
        let doc_id = user_id.to_string();

        let (record, result) = client
            .run_transaction(move |db, transaction| {
                let apply = Arc::clone(&apply);
                let seed = seed.clone();
                let doc_id = doc_id.clone();

                Box::pin(async move {
                    // `db` reads through the transaction, so a concurrent
                    // commit to this document aborts ours and we retry.
                    let current: Option<EntitlementRecord> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::ENTITLEMENTS)
                        .obj()
                        .one(&doc_id)
                        .await?;

                    let existed = current.is_some();
                    let mut record = current.unwrap_or(seed);
                    let before = record.clone();
                    let result = apply(&mut record);

                    if !existed || record != before {
                        db.fluent()
                            .update()
                            .in_col(collections::ENTITLEMENTS)
                            .document_id(&doc_id)
                            .object(&record)
                            .add_to_transaction(transaction)?;
                    }

                    Ok::<_, BackoffError<FirestoreError>>((record, result))
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Entitlement transaction failed: {}", e)))?;

        tracing::debug!(user_id, "Entitlement record committed");

        Ok((record, result))
    }
}
