//! Persistence for credentials, locations, daily metrics and reviews.
//!
//! The sync routine only sees the [`Store`] trait: single-row upserts and
//! filtered selects, no cross-table transactions. Foreign keys are the
//! storage layer's job.

pub mod db;
pub mod memory;

pub use db::PgStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::AppError;

#[async_trait]
pub trait Store: Send + Sync {
    /// The user's Google credential, if one was ever linked.
    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError>;

    /// Insert or update the credential keyed by user. A missing refresh token
    /// keeps the stored one. Returns the credential row id.
    async fn upsert_credential(&self, cred: &CredentialUpsert) -> Result<String, AppError>;

    /// Persist tokens obtained by a refresh (or recovered from a session).
    async fn update_refreshed_tokens(
        &self,
        credential_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;

    /// Upsert keyed by the external location id. Returns the location row id.
    async fn upsert_location(&self, location: &LocationUpsert) -> Result<String, AppError>;

    async fn list_locations(&self, user_id: &str) -> Result<Vec<Location>, AppError>;

    /// Upsert keyed by (location row id, date).
    async fn upsert_daily_metric(&self, metric: &DailyMetricUpsert) -> Result<(), AppError>;

    /// Rows on or after `since`, newest first.
    async fn daily_metrics_since(
        &self,
        location_ids: &[String],
        since: NaiveDate,
    ) -> Result<Vec<DailyMetric>, AppError>;

    /// Upsert keyed by the external review id.
    async fn upsert_review(&self, review: &ReviewUpsert) -> Result<(), AppError>;

    /// Reviews for the given locations, newest first.
    async fn list_reviews(&self, location_ids: &[String]) -> Result<Vec<Review>, AppError>;
}

/// Ratings are whole stars, 1 through 5.
pub fn validate_rating(rating: u8) -> Result<i32, AppError> {
    if (1..=5).contains(&rating) {
        Ok(i32::from(rating))
    } else {
        Err(AppError::BadRequest(format!(
            "rating must be between 1 and 5, got {rating}"
        )))
    }
}

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub google_account_id: String,
    #[serde(skip)]
    pub access_token: Option<String>,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// True only when a stored expiry exists and has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.token_expires_at, Some(exp) if exp <= now)
    }
}

#[derive(Debug, Clone)]
pub struct CredentialUpsert {
    pub user_id: String,
    pub email: String,
    pub google_account_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpsert {
    pub location_id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub website: String,
    /// Owning credential row id.
    pub google_account_id: String,
    pub group_type: String,
    pub department: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub location_id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub website: String,
    pub google_account_id: String,
    pub group_type: String,
    pub department: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyMetricUpsert {
    /// Location row id.
    pub location_id: String,
    pub date: NaiveDate,
    pub views: i64,
    pub searches: i64,
    pub calls: i64,
    pub direction_requests: i64,
    pub website_clicks: i64,
    pub actions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetric {
    pub location_id: String,
    pub date: NaiveDate,
    pub views: i64,
    pub searches: i64,
    pub calls: i64,
    pub direction_requests: i64,
    pub website_clicks: i64,
    pub actions: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewUpsert {
    pub google_review_id: String,
    /// Location row id.
    pub location_id: String,
    pub author_name: Option<String>,
    pub rating: u8,
    pub comment: Option<String>,
    pub review_date: DateTime<Utc>,
    pub response_text: Option<String>,
    pub response_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub google_review_id: String,
    pub location_id: String,
    pub author_name: Option<String>,
    pub rating: i32,
    pub comment: Option<String>,
    pub review_date: DateTime<Utc>,
    pub response_text: Option<String>,
    pub response_date: Option<DateTime<Utc>>,
}
