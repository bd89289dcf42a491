//! Mapping from Business Profile API records to store rows.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use super::{MetricSeries, RawLocation, RawReview};
use crate::store::{DailyMetricUpsert, LocationUpsert, ReviewUpsert};

pub const UNKNOWN_LOCATION: &str = "Unknown Location";
const GROUP_TYPE: &str = "business";
const DEPARTMENT: &str = "main";

/// Build a location row owned by `credential_id`. Records without a
/// resource name cannot be keyed and are dropped.
pub fn normalize_location(raw: &RawLocation, credential_id: &str) -> Option<LocationUpsert> {
    let location_id = raw.name.as_deref().filter(|n| !n.is_empty())?;

    let name = raw
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| location_id.rsplit('/').next().filter(|s| !s.is_empty()))
        .unwrap_or(UNKNOWN_LOCATION)
        .to_string();

    let address = raw
        .storefront_address
        .as_ref()
        .map(|a| a.address_lines.join(" "))
        .unwrap_or_default();
    let city = raw
        .storefront_address
        .as_ref()
        .and_then(|a| a.locality.clone())
        .unwrap_or_default();
    let phone = raw
        .phone_numbers
        .as_ref()
        .and_then(|p| p.primary_phone.clone())
        .or_else(|| raw.primary_phone.clone())
        .unwrap_or_default();

    Some(LocationUpsert {
        location_id: location_id.to_string(),
        name,
        address,
        city,
        phone,
        website: raw.website_uri.clone().unwrap_or_default(),
        google_account_id: credential_id.to_string(),
        group_type: GROUP_TYPE.into(),
        department: DEPARTMENT.into(),
    })
}

/// `"FIVE"` → 5. Unspecified or unknown ratings yield `None`.
pub fn parse_star_rating(s: &str) -> Option<u8> {
    match s {
        "ONE" => Some(1),
        "TWO" => Some(2),
        "THREE" => Some(3),
        "FOUR" => Some(4),
        "FIVE" => Some(5),
        _ => None,
    }
}

fn parse_time(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Build a review row for the location with row id `location_row_id`.
/// Reviews without an id, a rating or a creation time are skipped.
pub fn normalize_review(raw: &RawReview, location_row_id: &str) -> Option<ReviewUpsert> {
    let google_review_id = raw.review_id.clone().filter(|id| !id.is_empty())?;
    let rating = raw.star_rating.as_deref().and_then(parse_star_rating)?;
    let review_date = parse_time(raw.create_time.as_deref())?;

    let author_name = raw
        .reviewer
        .as_ref()
        .filter(|r| !r.is_anonymous)
        .and_then(|r| r.display_name.clone());
    let reply = raw.review_reply.as_ref();

    Some(ReviewUpsert {
        google_review_id,
        location_id: location_row_id.to_string(),
        author_name,
        rating,
        comment: raw.comment.clone(),
        review_date,
        response_text: reply.and_then(|r| r.comment.clone()),
        response_date: reply.and_then(|r| parse_time(r.update_time.as_deref())),
    })
}

/// Fold per-metric series into one row per date, oldest first.
///
/// views: all impressions. searches: search impressions only.
/// actions: calls + direction requests + website clicks.
pub fn fold_daily_metrics(location_row_id: &str, series: &[MetricSeries]) -> Vec<DailyMetricUpsert> {
    let mut by_date: BTreeMap<NaiveDate, DailyMetricUpsert> = BTreeMap::new();

    for s in series {
        for dv in &s.time_series.dated_values {
            let Some(date) = dv.date.to_naive() else {
                continue;
            };
            let value: i64 = dv
                .value
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            let row = by_date.entry(date).or_insert_with(|| DailyMetricUpsert {
                location_id: location_row_id.to_string(),
                date,
                views: 0,
                searches: 0,
                calls: 0,
                direction_requests: 0,
                website_clicks: 0,
                actions: 0,
            });

            match s.daily_metric.as_str() {
                "BUSINESS_IMPRESSIONS_DESKTOP_SEARCH" | "BUSINESS_IMPRESSIONS_MOBILE_SEARCH" => {
                    row.views += value;
                    row.searches += value;
                }
                "BUSINESS_IMPRESSIONS_DESKTOP_MAPS" | "BUSINESS_IMPRESSIONS_MOBILE_MAPS" => {
                    row.views += value;
                }
                "CALL_CLICKS" => row.calls += value,
                "BUSINESS_DIRECTION_REQUESTS" => row.direction_requests += value,
                "WEBSITE_CLICKS" => row.website_clicks += value,
                _ => {}
            }
        }
    }

    by_date
        .into_values()
        .map(|mut row| {
            row.actions = row.calls + row.direction_requests + row.website_clicks;
            row
        })
        .collect()
}
