// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment
//! (Cloud Run secret bindings), so everything is read once at startup.

use chrono::Duration;
use std::env;
use std::ops::RangeInclusive;

/// Which storage backend holds entitlement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store for tests and local development.
    Memory,
}

/// Length of one prompt quota period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPeriod {
    Daily,
    Weekly,
}

impl QuotaPeriod {
    pub fn duration(self) -> Duration {
        match self {
            QuotaPeriod::Daily => Duration::days(1),
            QuotaPeriod::Weekly => Duration::weeks(1),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Some(QuotaPeriod::Daily),
            "weekly" | "week" => Some(QuotaPeriod::Weekly),
            _ => None,
        }
    }
}

/// Trial, grace and quota numbers shared by the entitlement services.
#[derive(Debug, Clone)]
pub struct EntitlementPolicy {
    /// Length of the automatic trial started on first sign-in.
    pub trial_days: i64,
    /// Grace window after trial expiry or a failed payment.
    pub grace_period_hours: i64,
    /// Prompts per period for the free tier (trial included).
    pub free_prompt_limit: u32,
    /// Prompts per period for the pro tier.
    pub pro_prompt_limit: u32,
    pub quota_period: QuotaPeriod,
    /// Emails that always resolve to the founder tier (lowercased).
    pub founder_emails: Vec<String>,
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self {
            trial_days: 3,
            grace_period_hours: 24,
            free_prompt_limit: 20,
            pro_prompt_limit: 50,
            quota_period: QuotaPeriod::Daily,
            founder_emails: Vec::new(),
        }
    }
}

impl EntitlementPolicy {
    pub fn trial_length(&self) -> Duration {
        Duration::days(self.trial_days)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::hours(self.grace_period_hours)
    }

    /// Case-insensitive founder allowlist check.
    pub fn is_founder_email(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        !email.is_empty() && self.founder_emails.iter().any(|f| *f == email)
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS and checkout redirects
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Stripe price id for the monthly plan
    pub stripe_price_monthly: String,
    /// Stripe price id for the yearly plan
    pub stripe_price_yearly: String,
    pub policy: EntitlementPolicy,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Stripe API secret key
    pub stripe_secret_key: String,
    /// Stripe webhook endpoint signing secret (`whsec_...`)
    pub stripe_webhook_secret: String,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            stripe_price_monthly: "price_test_monthly".to_string(),
            stripe_price_yearly: "price_test_yearly".to_string(),
            policy: EntitlementPolicy {
                founder_emails: vec!["founder@studylens.ai".to_string()],
                ..EntitlementPolicy::default()
            },
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            stripe_secret_key: "sk_test_dummy".to_string(),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = EntitlementPolicy::default();
        let policy = EntitlementPolicy {
            trial_days: parse_in_range("TRIAL_DAYS", defaults.trial_days, TRIAL_DAYS_RANGE)?,
            grace_period_hours: parse_in_range(
                "GRACE_PERIOD_HOURS",
                defaults.grace_period_hours,
                GRACE_PERIOD_HOURS_RANGE,
            )?,
            free_prompt_limit: parse_or("FREE_PROMPT_LIMIT", defaults.free_prompt_limit)?,
            pro_prompt_limit: parse_or("PRO_PROMPT_LIMIT", defaults.pro_prompt_limit)?,
            quota_period: match env::var("PROMPT_QUOTA_PERIOD") {
                Ok(raw) => QuotaPeriod::parse(&raw)
                    .ok_or(ConfigError::Invalid("PROMPT_QUOTA_PERIOD", raw))?,
                Err(_) => defaults.quota_period,
            },
            founder_emails: env::var("FOUNDER_EMAILS")
                .map(|v| parse_email_list(&v))
                .unwrap_or_default(),
        };

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("firestore") | Err(_) => StoreBackend::Firestore,
            Ok(other) => return Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store_backend,
            stripe_price_monthly: env::var("STRIPE_PRICE_MONTHLY").unwrap_or_default(),
            stripe_price_yearly: env::var("STRIPE_PRICE_YEARLY").unwrap_or_default(),
            policy,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRIPE_SECRET_KEY"))?,
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?,
        })
    }

    /// Whether `price_id` is one of the plans this service sells.
    pub fn is_known_price(&self, price_id: &str) -> bool {
        !price_id.is_empty()
            && (price_id == self.stripe_price_monthly || price_id == self.stripe_price_yearly)
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Accepted `TRIAL_DAYS` values.
const TRIAL_DAYS_RANGE: RangeInclusive<i64> = 1..=365;
/// Accepted `GRACE_PERIOD_HOURS` values.
const GRACE_PERIOD_HOURS_RANGE: RangeInclusive<i64> = 0..=24 * 90;

fn parse_in_range(
    name: &'static str,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, ConfigError> {
    let value = parse_or(name, default)?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(
            name,
            format!("{} (expected {}..={})", value, range.start(), range.end()),
        ));
    }
    Ok(value)
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
