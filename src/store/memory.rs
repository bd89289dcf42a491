//! In-process store with the same upsert keys and foreign-key checks as the
//! Postgres schema. Tokens are held in plaintext.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{
    validate_rating, Credential, CredentialUpsert, DailyMetric, DailyMetricUpsert, Location,
    LocationUpsert, Review, ReviewUpsert, Store,
};
use crate::error::AppError;

#[derive(Default)]
struct Tables {
    next_id: u64,
    /// Keyed by user id.
    credentials: HashMap<String, Credential>,
    /// Keyed by external location id.
    locations: HashMap<String, Location>,
    /// Keyed by (location row id, date).
    metrics: HashMap<(String, NaiveDate), DailyMetric>,
    /// Keyed by external review id.
    reviews: HashMap<String, Review>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn location_exists(&self, row_id: &str) -> bool {
        self.locations.values().any(|l| l.id == row_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored location rows across all users.
    pub async fn location_count(&self) -> usize {
        self.tables.read().await.locations.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        Ok(self.tables.read().await.credentials.get(user_id).cloned())
    }

    async fn upsert_credential(&self, cred: &CredentialUpsert) -> Result<String, AppError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(existing) = tables.credentials.get_mut(&cred.user_id) {
            existing.email = cred.email.clone();
            existing.google_account_id = cred.google_account_id.clone();
            if cred.access_token.is_some() {
                existing.access_token = cred.access_token.clone();
            }
            if cred.refresh_token.is_some() {
                existing.refresh_token = cred.refresh_token.clone();
            }
            if cred.token_expires_at.is_some() {
                existing.token_expires_at = cred.token_expires_at;
            }
            existing.updated_at = now;
            return Ok(existing.id.clone());
        }

        let id = tables.next_id("cred");
        tables.credentials.insert(
            cred.user_id.clone(),
            Credential {
                id: id.clone(),
                user_id: cred.user_id.clone(),
                email: cred.email.clone(),
                google_account_id: cred.google_account_id.clone(),
                access_token: cred.access_token.clone(),
                refresh_token: cred.refresh_token.clone(),
                token_expires_at: cred.token_expires_at,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_refreshed_tokens(
        &self,
        credential_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let cred = tables
            .credentials
            .values_mut()
            .find(|c| c.id == credential_id)
            .ok_or_else(|| AppError::NotFound("Google account".into()))?;

        cred.access_token = Some(access_token.to_string());
        if let Some(rt) = refresh_token {
            cred.refresh_token = Some(rt.to_string());
        }
        cred.token_expires_at = expires_at;
        cred.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_location(&self, location: &LocationUpsert) -> Result<String, AppError> {
        let mut tables = self.tables.write().await;

        if !tables
            .credentials
            .values()
            .any(|c| c.id == location.google_account_id)
        {
            return Err(AppError::Database(format!(
                "foreign key violation: google account {} does not exist",
                location.google_account_id
            )));
        }

        let existing = tables
            .locations
            .get(&location.location_id)
            .map(|l| (l.id.clone(), l.is_active));
        let (id, is_active) = match existing {
            Some(found) => found,
            None => (tables.next_id("loc"), true),
        };

        tables.locations.insert(
            location.location_id.clone(),
            Location {
                id: id.clone(),
                location_id: location.location_id.clone(),
                name: location.name.clone(),
                address: location.address.clone(),
                city: location.city.clone(),
                phone: location.phone.clone(),
                website: location.website.clone(),
                google_account_id: location.google_account_id.clone(),
                group_type: location.group_type.clone(),
                department: location.department.clone(),
                is_active,
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn list_locations(&self, user_id: &str) -> Result<Vec<Location>, AppError> {
        let tables = self.tables.read().await;
        let Some(cred) = tables.credentials.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut locations: Vec<Location> = tables
            .locations
            .values()
            .filter(|l| l.google_account_id == cred.id)
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn upsert_daily_metric(&self, metric: &DailyMetricUpsert) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if !tables.location_exists(&metric.location_id) {
            return Err(AppError::Database(format!(
                "foreign key violation: location {} does not exist",
                metric.location_id
            )));
        }

        tables.metrics.insert(
            (metric.location_id.clone(), metric.date),
            DailyMetric {
                location_id: metric.location_id.clone(),
                date: metric.date,
                views: metric.views,
                searches: metric.searches,
                calls: metric.calls,
                direction_requests: metric.direction_requests,
                website_clicks: metric.website_clicks,
                actions: metric.actions,
            },
        );
        Ok(())
    }

    async fn daily_metrics_since(
        &self,
        location_ids: &[String],
        since: NaiveDate,
    ) -> Result<Vec<DailyMetric>, AppError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<DailyMetric> = tables
            .metrics
            .values()
            .filter(|m| m.date >= since && location_ids.contains(&m.location_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn upsert_review(&self, review: &ReviewUpsert) -> Result<(), AppError> {
        let rating = validate_rating(review.rating)?;
        let mut tables = self.tables.write().await;
        if !tables.location_exists(&review.location_id) {
            return Err(AppError::Database(format!(
                "foreign key violation: location {} does not exist",
                review.location_id
            )));
        }

        let existing = tables
            .reviews
            .get(&review.google_review_id)
            .map(|r| r.id.clone());
        let id = match existing {
            Some(id) => id,
            None => tables.next_id("rev"),
        };
        tables.reviews.insert(
            review.google_review_id.clone(),
            Review {
                id,
                google_review_id: review.google_review_id.clone(),
                location_id: review.location_id.clone(),
                author_name: review.author_name.clone(),
                rating,
                comment: review.comment.clone(),
                review_date: review.review_date,
                response_text: review.response_text.clone(),
                response_date: review.response_date,
            },
        );
        Ok(())
    }

    async fn list_reviews(&self, location_ids: &[String]) -> Result<Vec<Review>, AppError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| location_ids.contains(&r.location_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.review_date.cmp(&a.review_date));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(user_id: &str, refresh: Option<&str>) -> CredentialUpsert {
        CredentialUpsert {
            user_id: user_id.into(),
            email: "owner@example.com".into(),
            google_account_id: "1029384756".into(),
            access_token: Some("ya29.first".into()),
            refresh_token: refresh.map(String::from),
            token_expires_at: None,
        }
    }

    fn location(cred_id: &str, location_id: &str, name: &str) -> LocationUpsert {
        LocationUpsert {
            location_id: location_id.into(),
            name: name.into(),
            address: String::new(),
            city: String::new(),
            phone: String::new(),
            website: String::new(),
            google_account_id: cred_id.into(),
            group_type: "business".into(),
            department: "main".into(),
        }
    }

    #[tokio::test]
    async fn test_credential_upsert_keeps_refresh_token() {
        let store = MemoryStore::new();
        let id1 = store
            .upsert_credential(&credential("user-1", Some("1//refresh")))
            .await
            .unwrap();
        let id2 = store
            .upsert_credential(&credential("user-1", None))
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let cred = store.get_credential("user-1").await.unwrap().unwrap();
        assert_eq!(cred.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[tokio::test]
    async fn test_location_upsert_is_keyed_by_external_id() {
        let store = MemoryStore::new();
        let cred_id = store
            .upsert_credential(&credential("user-1", None))
            .await
            .unwrap();

        let a = store
            .upsert_location(&location(&cred_id, "locations/1", "Old Name"))
            .await
            .unwrap();
        let b = store
            .upsert_location(&location(&cred_id, "locations/1", "New Name"))
            .await
            .unwrap();
        assert_eq!(a, b);

        let listed = store.list_locations("user-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "New Name");
    }

    #[tokio::test]
    async fn test_location_requires_existing_credential() {
        let store = MemoryStore::new();
        let err = store
            .upsert_location(&location("cred-missing", "locations/1", "Shop"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_review_rating_out_of_range_is_rejected() {
        let store = MemoryStore::new();
        let cred_id = store
            .upsert_credential(&credential("user-1", None))
            .await
            .unwrap();
        let loc_id = store
            .upsert_location(&location(&cred_id, "locations/1", "Shop"))
            .await
            .unwrap();

        let review = ReviewUpsert {
            google_review_id: "rev-1".into(),
            location_id: loc_id,
            author_name: None,
            rating: 0,
            comment: None,
            review_date: Utc::now(),
            response_text: None,
            response_date: None,
        };
        assert!(matches!(
            store.upsert_review(&review).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
