//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// Entitlement records (keyed by user_id)
    pub const ENTITLEMENTS: &str = "entitlements";
}
