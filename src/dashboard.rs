//! Read-side aggregation for the dashboard: totals, a per-day trend,
//! recent reviews and the star distribution for a user's locations.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::store::{DailyMetric, Review, Store};

const RECENT_REVIEWS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_views: i64,
    pub total_searches: i64,
    pub total_actions: i64,
    pub total_calls: i64,
    pub total_directions: i64,
    pub total_website_clicks: i64,
    /// Mean star rating to one decimal, 0 when there are no reviews.
    pub average_rating: f64,
    pub total_reviews: usize,
}

/// One day summed across all of the user's locations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub views: i64,
    pub searches: i64,
    pub actions: i64,
    pub calls: i64,
    pub direction_requests: i64,
    pub website_clicks: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingBucket {
    pub rating: u8,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// Whether a Google credential is linked at all.
    pub connected: bool,
    pub locations_count: usize,
    /// `None` until at least one location has been synced.
    pub metrics: Option<DashboardMetrics>,
    pub trend: Vec<TrendPoint>,
    pub recent_reviews: Vec<Review>,
    pub rating_distribution: Vec<RatingBucket>,
}

pub fn summarize(
    metrics: &[DailyMetric],
    reviews: &[Review],
) -> (DashboardMetrics, Vec<TrendPoint>, Vec<RatingBucket>) {
    let mut totals = DashboardMetrics::default();
    let mut by_date: BTreeMap<NaiveDate, TrendPoint> = BTreeMap::new();

    for m in metrics {
        totals.total_views += m.views;
        totals.total_searches += m.searches;
        totals.total_actions += m.actions;
        totals.total_calls += m.calls;
        totals.total_directions += m.direction_requests;
        totals.total_website_clicks += m.website_clicks;

        let point = by_date.entry(m.date).or_insert_with(|| TrendPoint {
            date: m.date,
            views: 0,
            searches: 0,
            actions: 0,
            calls: 0,
            direction_requests: 0,
            website_clicks: 0,
        });
        point.views += m.views;
        point.searches += m.searches;
        point.actions += m.actions;
        point.calls += m.calls;
        point.direction_requests += m.direction_requests;
        point.website_clicks += m.website_clicks;
    }

    let mut distribution: Vec<RatingBucket> =
        (1..=5).map(|rating| RatingBucket { rating, count: 0 }).collect();
    let mut rating_sum = 0i64;
    for r in reviews {
        rating_sum += i64::from(r.rating);
        if let Some(bucket) = distribution.iter_mut().find(|b| i32::from(b.rating) == r.rating) {
            bucket.count += 1;
        }
    }

    totals.total_reviews = reviews.len();
    if !reviews.is_empty() {
        let mean = rating_sum as f64 / reviews.len() as f64;
        totals.average_rating = (mean * 10.0).round() / 10.0;
    }

    (totals, by_date.into_values().collect(), distribution)
}

pub async fn load_dashboard(
    store: &dyn Store,
    user_id: &str,
    lookback_days: u32,
) -> Result<Dashboard, AppError> {
    let connected = store.get_credential(user_id).await?.is_some();
    let locations = store.list_locations(user_id).await?;

    if locations.is_empty() {
        return Ok(Dashboard {
            connected,
            locations_count: 0,
            metrics: None,
            trend: Vec::new(),
            recent_reviews: Vec::new(),
            rating_distribution: Vec::new(),
        });
    }

    let ids: Vec<String> = locations.iter().map(|l| l.id.clone()).collect();
    let since = Utc::now().date_naive() - Duration::days(i64::from(lookback_days.max(1)));

    let metrics = store.daily_metrics_since(&ids, since).await?;
    let reviews = store.list_reviews(&ids).await?;
    let (totals, trend, rating_distribution) = summarize(&metrics, &reviews);

    Ok(Dashboard {
        connected,
        locations_count: locations.len(),
        metrics: Some(totals),
        trend,
        recent_reviews: reviews.into_iter().take(RECENT_REVIEWS).collect(),
        rating_distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CredentialUpsert, DailyMetricUpsert, LocationUpsert, MemoryStore, ReviewUpsert};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn metric(location: &str, d: u32, views: i64, calls: i64) -> DailyMetric {
        DailyMetric {
            location_id: location.into(),
            date: day(d),
            views,
            searches: views / 2,
            calls,
            direction_requests: 1,
            website_clicks: 0,
            actions: calls + 1,
        }
    }

    fn review(rating: i32) -> Review {
        Review {
            id: format!("rev-{rating}"),
            google_review_id: format!("g-{rating}"),
            location_id: "loc-1".into(),
            author_name: None,
            rating,
            comment: None,
            review_date: Utc::now(),
            response_text: None,
            response_date: None,
        }
    }

    #[test]
    fn test_totals_and_trend_sum_across_locations() {
        let (totals, trend, _) = summarize(
            &[
                metric("loc-1", 2, 10, 2),
                metric("loc-2", 2, 6, 0),
                metric("loc-1", 1, 4, 1),
            ],
            &[],
        );

        assert_eq!(totals.total_views, 20);
        assert_eq!(totals.total_searches, 10);
        assert_eq!(totals.total_calls, 3);
        assert_eq!(totals.total_directions, 3);
        assert_eq!(totals.total_actions, 6);
        assert_eq!(totals.average_rating, 0.0);

        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, day(1));
        assert_eq!(trend[1].views, 16);
        assert_eq!(trend[1].calls, 2);
    }

    #[test]
    fn test_average_rating_and_distribution() {
        let reviews = vec![review(5), review(4), review(4), review(1)];
        let (totals, _, distribution) = summarize(&[], &reviews);

        assert_eq!(totals.total_reviews, 4);
        assert_eq!(totals.average_rating, 3.5);
        let counts: Vec<usize> = distribution.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 0, 0, 2, 1]);
    }

    #[test]
    fn test_average_rating_is_rounded() {
        let (totals, _, _) = summarize(&[], &[review(5), review(4), review(4)]);
        assert_eq!(totals.average_rating, 4.3);
    }

    #[tokio::test]
    async fn test_no_locations_yields_empty_dashboard() {
        let store = MemoryStore::new();
        let dash = load_dashboard(&store, "user-1", 30).await.unwrap();
        assert!(!dash.connected);
        assert!(dash.metrics.is_none());
        assert!(dash.trend.is_empty());

        let json = serde_json::to_value(&dash).unwrap();
        assert!(json["metrics"].is_null());
    }

    #[tokio::test]
    async fn test_dashboard_reads_from_store() {
        let store = MemoryStore::new();
        let cred_id = store
            .upsert_credential(&CredentialUpsert {
                user_id: "user-1".into(),
                email: "owner@example.com".into(),
                google_account_id: "1029384756".into(),
                access_token: None,
                refresh_token: None,
                token_expires_at: None,
            })
            .await
            .unwrap();
        let loc_id = store
            .upsert_location(&LocationUpsert {
                location_id: "locations/1".into(),
                name: "Bakery".into(),
                address: String::new(),
                city: String::new(),
                phone: String::new(),
                website: String::new(),
                google_account_id: cred_id,
                group_type: "business".into(),
                department: "main".into(),
            })
            .await
            .unwrap();

        let yesterday = Utc::now().date_naive() - Duration::days(1);
        store
            .upsert_daily_metric(&DailyMetricUpsert {
                location_id: loc_id.clone(),
                date: yesterday,
                views: 12,
                searches: 7,
                calls: 2,
                direction_requests: 1,
                website_clicks: 3,
                actions: 6,
            })
            .await
            .unwrap();
        store
            .upsert_review(&ReviewUpsert {
                google_review_id: "g-1".into(),
                location_id: loc_id,
                author_name: Some("Pat".into()),
                rating: 5,
                comment: None,
                review_date: Utc::now(),
                response_text: None,
                response_date: None,
            })
            .await
            .unwrap();

        let dash = load_dashboard(&store, "user-1", 30).await.unwrap();
        assert!(dash.connected);
        assert_eq!(dash.locations_count, 1);
        let metrics = dash.metrics.unwrap();
        assert_eq!(metrics.total_views, 12);
        assert_eq!(metrics.total_website_clicks, 3);
        assert_eq!(metrics.average_rating, 5.0);
        assert_eq!(dash.trend.len(), 1);
        assert_eq!(dash.recent_reviews.len(), 1);
        assert_eq!(dash.rating_distribution[4].count, 1);
    }
}
