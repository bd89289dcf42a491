use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    ApiFailure, BusinessAccount, BusinessApi, DateRange, MetricSeries, Page, RawLocation,
    RawReview,
};

/// Fields requested from the Business Information API.
const LOCATION_READ_MASK: &str = "name,title,storefrontAddress,phoneNumbers,websiteUri";

/// Metrics pulled for the dashboard. See `normalize::fold_daily_metrics`.
pub const DAILY_METRICS: &[&str] = &[
    "BUSINESS_IMPRESSIONS_DESKTOP_MAPS",
    "BUSINESS_IMPRESSIONS_DESKTOP_SEARCH",
    "BUSINESS_IMPRESSIONS_MOBILE_MAPS",
    "BUSINESS_IMPRESSIONS_MOBILE_SEARCH",
    "CALL_CLICKS",
    "BUSINESS_DIRECTION_REQUESTS",
    "WEBSITE_CLICKS",
];

/// Base URLs of the four Business Profile APIs. Overridable for tests.
#[derive(Debug, Clone)]
pub struct BusinessEndpoints {
    pub account_management: String,
    pub business_information: String,
    pub reviews: String,
    pub performance: String,
}

impl Default for BusinessEndpoints {
    fn default() -> Self {
        Self {
            account_management: "https://mybusinessaccountmanagement.googleapis.com/v1".into(),
            business_information: "https://mybusinessbusinessinformation.googleapis.com/v1".into(),
            reviews: "https://mybusiness.googleapis.com/v4".into(),
            performance: "https://businessprofileperformance.googleapis.com/v1".into(),
        }
    }
}

impl BusinessEndpoints {
    /// Every API served from one base URL, e.g. a local mock server.
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            account_management: base.into(),
            business_information: base.into(),
            reviews: base.into(),
            performance: base.into(),
        }
    }
}

pub struct GoogleBusinessClient {
    http: reqwest::Client,
    endpoints: BusinessEndpoints,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<BusinessAccount>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationsResponse {
    #[serde(default)]
    locations: Vec<RawLocation>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewsResponse {
    #[serde(default)]
    reviews: Vec<RawReview>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiDailyMetricsResponse {
    #[serde(default)]
    multi_daily_metric_time_series: Vec<MultiDailyMetricTimeSeries>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiDailyMetricTimeSeries {
    #[serde(default)]
    daily_metric_time_series: Vec<MetricSeries>,
}

impl GoogleBusinessClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_endpoints(http, BusinessEndpoints::default())
    }

    pub fn with_endpoints(http: reqwest::Client, endpoints: BusinessEndpoints) -> Self {
        Self { http, endpoints }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiFailure> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(format!("GET {url}: {e}")))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ApiFailure::RateLimited { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiFailure::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiFailure::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        resp.json()
            .await
            .map_err(|e| ApiFailure::Decode(format!("GET {url}: {e}")))
    }
}

fn page_query(page_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("pageSize", "100".to_string())];
    if let Some(token) = page_token {
        query.push(("pageToken", token.to_string()));
    }
    query
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[async_trait]
impl BusinessApi for GoogleBusinessClient {
    async fn list_accounts(
        &self,
        access_token: &str,
        page_token: Option<&str>,
    ) -> Result<Page<BusinessAccount>, ApiFailure> {
        let url = format!("{}/accounts", self.endpoints.account_management);
        let resp: AccountsResponse = self
            .get_json(&url, access_token, &page_query(page_token))
            .await?;
        Ok(Page {
            items: resp.accounts,
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn list_locations(
        &self,
        access_token: &str,
        account: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RawLocation>, ApiFailure> {
        let url = format!(
            "{}/{}/locations",
            self.endpoints.business_information, account
        );
        let mut query = page_query(page_token);
        query.push(("readMask", LOCATION_READ_MASK.to_string()));

        let resp: LocationsResponse = self.get_json(&url, access_token, &query).await?;
        Ok(Page {
            items: resp.locations,
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn list_reviews(
        &self,
        access_token: &str,
        account: &str,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RawReview>, ApiFailure> {
        let url = format!("{}/{}/{}/reviews", self.endpoints.reviews, account, location);
        let mut query = vec![("pageSize", "50".to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let resp: ReviewsResponse = self.get_json(&url, access_token, &query).await?;
        Ok(Page {
            items: resp.reviews,
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch_daily_metrics(
        &self,
        access_token: &str,
        location: &str,
        range: DateRange,
    ) -> Result<Vec<MetricSeries>, ApiFailure> {
        use chrono::Datelike;

        let url = format!(
            "{}/{}:fetchMultiDailyMetricsTimeSeries",
            self.endpoints.performance, location
        );
        let mut query: Vec<(&str, String)> = DAILY_METRICS
            .iter()
            .map(|m| ("dailyMetrics", m.to_string()))
            .collect();
        query.extend([
            ("dailyRange.startDate.year", range.start.year().to_string()),
            ("dailyRange.startDate.month", range.start.month().to_string()),
            ("dailyRange.startDate.day", range.start.day().to_string()),
            ("dailyRange.endDate.year", range.end.year().to_string()),
            ("dailyRange.endDate.month", range.end.month().to_string()),
            ("dailyRange.endDate.day", range.end.day().to_string()),
        ]);

        let resp: MultiDailyMetricsResponse = self.get_json(&url, access_token, &query).await?;
        Ok(resp
            .multi_daily_metric_time_series
            .into_iter()
            .flat_map(|m| m.daily_metric_time_series)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_host_strips_trailing_slash() {
        let endpoints = BusinessEndpoints::single_host("http://127.0.0.1:9000/");
        assert_eq!(endpoints.account_management, "http://127.0.0.1:9000");
        assert_eq!(endpoints.performance, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_page_query_includes_token_when_present() {
        assert_eq!(page_query(None).len(), 1);
        let q = page_query(Some("next-abc"));
        assert!(q.contains(&("pageToken", "next-abc".to_string())));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé…");
    }

    #[test]
    fn test_metrics_response_flattens_series() {
        let resp: MultiDailyMetricsResponse = serde_json::from_str(
            r#"{"multiDailyMetricTimeSeries": [{"dailyMetricTimeSeries": [
                {"dailyMetric": "CALL_CLICKS", "timeSeries": {"datedValues": [
                    {"date": {"year": 2026, "month": 3, "day": 1}, "value": "4"},
                    {"date": {"year": 2026, "month": 3, "day": 2}}
                ]}},
                {"dailyMetric": "WEBSITE_CLICKS", "timeSeries": {}}
            ]}]}"#,
        )
        .unwrap();
        let series: Vec<MetricSeries> = resp
            .multi_daily_metric_time_series
            .into_iter()
            .flat_map(|m| m.daily_metric_time_series)
            .collect();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].time_series.dated_values.len(), 2);
        assert!(series[1].time_series.dated_values.is_empty());
    }
}
