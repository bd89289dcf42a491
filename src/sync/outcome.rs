use chrono::{DateTime, Utc};
use serde::Serialize;

use super::token::TokenSource;

pub const NO_LOCATIONS_NOTE: &str =
    "No locations found. Make sure you have Google Business Profile locations set up.";

/// Counters from the optional reviews/metrics phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsightsSummary {
    pub reviews: usize,
    pub metric_days: usize,
    pub failures: usize,
}

/// Success payload of a sync.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub accounts_count: usize,
    pub total_locations_found: usize,
    /// Locations actually written to the store.
    pub locations_count: usize,
    pub token_source: TokenSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_days_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights_failures: Option<usize>,
}

impl SyncOutcome {
    pub fn new(
        accounts_count: usize,
        total_locations_found: usize,
        locations_count: usize,
        token_source: TokenSource,
        insights: Option<InsightsSummary>,
    ) -> Self {
        Self {
            success: true,
            message: format!(
                "Successfully synced {locations_count} business locations from Google Business Profile"
            ),
            timestamp: Utc::now(),
            accounts_count,
            total_locations_found,
            locations_count,
            token_source,
            note: (total_locations_found == 0).then(|| NO_LOCATIONS_NOTE.to_string()),
            reviews_count: insights.map(|i| i.reviews),
            metric_days_count: insights.map(|i| i.metric_days),
            insights_failures: insights.map(|i| i.failures),
        }
    }
}
