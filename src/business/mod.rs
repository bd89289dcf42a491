//! Google Business Profile APIs: accounts, locations, reviews and daily
//! performance metrics.
//!
//! - client: reqwest implementation of [`BusinessApi`]
//! - retry: bounded rate-limit retry with an injectable sleeper
//! - normalize: raw API records → store rows

pub mod client;
pub mod normalize;
pub mod retry;

pub use client::{BusinessEndpoints, GoogleBusinessClient};
pub use retry::{with_retry, RetryPolicy, Sleeper, TokioSleeper};

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::AppError;

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Inclusive date range for performance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Why a business API call failed, before it is mapped to an [`AppError`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiFailure {
    #[error("rate limited by Google")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Google rejected the access token")]
    Unauthorized,

    #[error("Google returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiFailure {
    pub fn into_app_error(self, default_retry_after: Duration) -> AppError {
        match self {
            ApiFailure::RateLimited { retry_after } => AppError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(default_retry_after).as_secs().max(1),
            },
            ApiFailure::Unauthorized => AppError::NoUsableToken(
                "Google API authentication failed. Please sign out and sign back in with Google."
                    .into(),
            ),
            ApiFailure::Status { status, body } => AppError::UpstreamFetch {
                status: Some(status),
                message: body,
            },
            ApiFailure::Transport(msg) | ApiFailure::Decode(msg) => AppError::UpstreamFetch {
                status: None,
                message: msg,
            },
        }
    }
}

#[async_trait]
pub trait BusinessApi: Send + Sync {
    async fn list_accounts(
        &self,
        access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<BusinessAccount>, ApiFailure>;

    /// `account` is a resource name such as `accounts/123`.
    async fn list_locations(
        &self,
        access_token: &str,
        account: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RawLocation>, ApiFailure>;

    /// `location` is a resource name such as `locations/456`.
    async fn list_reviews(
        &self,
        access_token: &str,
        account: &str,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RawReview>, ApiFailure>;

    async fn fetch_daily_metrics(
        &self,
        access_token: &str,
        location: &str,
        range: DateRange,
    ) -> Result<Vec<MetricSeries>, ApiFailure>;
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessAccount {
    /// Resource name, `accounts/{id}`.
    pub name: String,
    pub account_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocation {
    /// Resource name, `locations/{id}`.
    pub name: Option<String>,
    pub title: Option<String>,
    pub storefront_address: Option<PostalAddress>,
    pub phone_numbers: Option<PhoneNumbers>,
    /// Older API responses put the phone at the top level.
    pub primary_phone: Option<String>,
    pub website_uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    #[serde(default)]
    pub address_lines: Vec<String>,
    pub locality: Option<String>,
    pub administrative_area: Option<String>,
    pub postal_code: Option<String>,
    pub region_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumbers {
    pub primary_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReview {
    pub review_id: Option<String>,
    pub reviewer: Option<Reviewer>,
    /// `ONE` through `FIVE`, or `STAR_RATING_UNSPECIFIED`.
    pub star_rating: Option<String>,
    pub comment: Option<String>,
    pub create_time: Option<String>,
    pub review_reply: Option<ReviewReply>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReply {
    pub comment: Option<String>,
    pub update_time: Option<String>,
}

/// One metric's values over a date range.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    pub daily_metric: String,
    #[serde(default)]
    pub time_series: TimeSeries,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    #[serde(default)]
    pub dated_values: Vec<DatedValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatedValue {
    pub date: ApiDate,
    /// int64 encoded as a string; absent means zero.
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApiDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl ApiDate {
    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}
