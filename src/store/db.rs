//! PostgreSQL-backed store. Tables:
//! - `google_accounts`: encrypted Google tokens, one row per dashboard user
//! - `business_locations`: synced locations, unique by Google resource name
//! - `daily_metrics`: per-location daily counters, unique by (location, date)
//! - `reviews`: per-location reviews, unique by Google review id

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{
    validate_rating, Credential, CredentialUpsert, DailyMetric, DailyMetricUpsert, Location,
    LocationUpsert, Review, ReviewUpsert, Store,
};
use crate::crypto::{CryptoEngine, TokenKind};
use crate::error::AppError;

pub struct PgStore {
    pool: PgPool,
    crypto: Arc<CryptoEngine>,
}

impl PgStore {
    pub async fn connect(db_url: &str, crypto: Arc<CryptoEngine>) -> Result<Self, AppError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self { pool, crypto })
    }

    /// Run schema migrations. Every statement is idempotent.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS google_accounts (
                id                UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id           TEXT NOT NULL UNIQUE,
                email             TEXT NOT NULL DEFAULT '',
                google_account_id TEXT NOT NULL,
                access_token      TEXT,
                refresh_token     TEXT,
                token_expires_at  TIMESTAMPTZ,
                created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS business_locations (
                id                UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                location_id       TEXT NOT NULL UNIQUE,
                name              TEXT NOT NULL,
                address           TEXT DEFAULT '',
                city              TEXT DEFAULT '',
                phone             TEXT DEFAULT '',
                website           TEXT DEFAULT '',
                google_account_id UUID NOT NULL REFERENCES google_accounts(id) ON DELETE CASCADE,
                group_type        TEXT DEFAULT 'business',
                department        TEXT DEFAULT 'main',
                is_active         BOOLEAN DEFAULT true,
                created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_metrics (
                id                 UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                location_id        UUID NOT NULL REFERENCES business_locations(id) ON DELETE CASCADE,
                date               DATE NOT NULL,
                views              BIGINT DEFAULT 0,
                searches           BIGINT DEFAULT 0,
                calls              BIGINT DEFAULT 0,
                direction_requests BIGINT DEFAULT 0,
                website_clicks     BIGINT DEFAULT 0,
                actions            BIGINT DEFAULT 0,
                created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE(location_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id               UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                google_review_id TEXT NOT NULL UNIQUE,
                location_id      UUID NOT NULL REFERENCES business_locations(id) ON DELETE CASCADE,
                author_name      TEXT,
                rating           INT NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment          TEXT,
                review_date      TIMESTAMPTZ NOT NULL,
                response_text    TEXT,
                response_date    TIMESTAMPTZ,
                created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_business_locations_account ON business_locations(google_account_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_daily_metrics_date ON daily_metrics(location_id, date DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reviews_location ON reviews(location_id, review_date DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn seal_opt(&self, kind: TokenKind, value: Option<&str>) -> Result<Option<String>, AppError> {
        value.map(|v| self.crypto.seal_token(kind, v)).transpose()
    }

    fn open_opt(&self, kind: TokenKind, value: Option<String>) -> Result<Option<String>, AppError> {
        match value {
            Some(ref v) if !v.is_empty() => self.crypto.open_token(kind, v).map(Some),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT id::text, user_id, email, google_account_id, access_token,
                   refresh_token, token_expires_at, created_at, updated_at
            FROM google_accounts
            WHERE user_id = $1
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let enc_access: Option<String> = row.try_get(4).ok().flatten();
        let enc_refresh: Option<String> = row.try_get(5).ok().flatten();

        Ok(Some(Credential {
            id: row.get(0),
            user_id: row.get(1),
            email: row.get(2),
            google_account_id: row.get(3),
            access_token: self.open_opt(TokenKind::Access, enc_access)?,
            refresh_token: self.open_opt(TokenKind::Refresh, enc_refresh)?,
            token_expires_at: row.try_get(6).ok().flatten(),
            created_at: row.get(7),
            updated_at: row.get(8),
        }))
    }

    async fn upsert_credential(&self, cred: &CredentialUpsert) -> Result<String, AppError> {
        let enc_access = self.seal_opt(TokenKind::Access, cred.access_token.as_deref())?;
        let enc_refresh = self.seal_opt(TokenKind::Refresh, cred.refresh_token.as_deref())?;

        let row = sqlx::query(
            r#"
            INSERT INTO google_accounts
                (user_id, email, google_account_id, access_token, refresh_token, token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id)
            DO UPDATE SET
                email = EXCLUDED.email,
                google_account_id = EXCLUDED.google_account_id,
                access_token = COALESCE(EXCLUDED.access_token, google_accounts.access_token),
                refresh_token = COALESCE(EXCLUDED.refresh_token, google_accounts.refresh_token),
                token_expires_at = COALESCE(EXCLUDED.token_expires_at, google_accounts.token_expires_at),
                updated_at = NOW()
            RETURNING id::text
            "#,
        )
        .bind(&cred.user_id)
        .bind(&cred.email)
        .bind(&cred.google_account_id)
        .bind(&enc_access)
        .bind(&enc_refresh)
        .bind(cred.token_expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get(0))
    }

    async fn update_refreshed_tokens(
        &self,
        credential_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let enc_access = self.crypto.seal_token(TokenKind::Access, access_token)?;
        let enc_refresh = self.seal_opt(TokenKind::Refresh, refresh_token)?;

        let affected = sqlx::query(
            r#"
            UPDATE google_accounts
            SET access_token = $1,
                refresh_token = COALESCE($2, refresh_token),
                token_expires_at = $3,
                updated_at = NOW()
            WHERE id = $4::uuid
            "#,
        )
        .bind(&enc_access)
        .bind(&enc_refresh)
        .bind(expires_at)
        .bind(credential_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Google account".into()));
        }

        Ok(())
    }

    async fn upsert_location(&self, location: &LocationUpsert) -> Result<String, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO business_locations
                (location_id, name, address, city, phone, website, google_account_id,
                 group_type, department)
            VALUES ($1, $2, $3, $4, $5, $6, $7::uuid, $8, $9)
            ON CONFLICT (location_id)
            DO UPDATE SET
                name = EXCLUDED.name,
                address = EXCLUDED.address,
                city = EXCLUDED.city,
                phone = EXCLUDED.phone,
                website = EXCLUDED.website,
                google_account_id = EXCLUDED.google_account_id,
                group_type = EXCLUDED.group_type,
                department = EXCLUDED.department,
                updated_at = NOW()
            RETURNING id::text
            "#,
        )
        .bind(&location.location_id)
        .bind(&location.name)
        .bind(&location.address)
        .bind(&location.city)
        .bind(&location.phone)
        .bind(&location.website)
        .bind(&location.google_account_id)
        .bind(&location.group_type)
        .bind(&location.department)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get(0))
    }

    async fn list_locations(&self, user_id: &str) -> Result<Vec<Location>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT bl.id::text, bl.location_id, bl.name,
                   COALESCE(bl.address, ''), COALESCE(bl.city, ''),
                   COALESCE(bl.phone, ''), COALESCE(bl.website, ''),
                   bl.google_account_id::text,
                   COALESCE(bl.group_type, 'business'), COALESCE(bl.department, 'main'),
                   COALESCE(bl.is_active, true), bl.updated_at
            FROM business_locations bl
            JOIN google_accounts ga ON ga.id = bl.google_account_id
            WHERE ga.user_id = $1
            ORDER BY bl.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let locations = rows
            .iter()
            .map(|row| Location {
                id: row.get(0),
                location_id: row.get(1),
                name: row.get(2),
                address: row.get(3),
                city: row.get(4),
                phone: row.get(5),
                website: row.get(6),
                google_account_id: row.get(7),
                group_type: row.get(8),
                department: row.get(9),
                is_active: row.get(10),
                updated_at: row.get(11),
            })
            .collect();

        Ok(locations)
    }

    async fn upsert_daily_metric(&self, metric: &DailyMetricUpsert) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO daily_metrics
                (location_id, date, views, searches, calls, direction_requests,
                 website_clicks, actions)
            VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (location_id, date)
            DO UPDATE SET
                views = EXCLUDED.views,
                searches = EXCLUDED.searches,
                calls = EXCLUDED.calls,
                direction_requests = EXCLUDED.direction_requests,
                website_clicks = EXCLUDED.website_clicks,
                actions = EXCLUDED.actions
            "#,
        )
        .bind(&metric.location_id)
        .bind(metric.date)
        .bind(metric.views)
        .bind(metric.searches)
        .bind(metric.calls)
        .bind(metric.direction_requests)
        .bind(metric.website_clicks)
        .bind(metric.actions)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn daily_metrics_since(
        &self,
        location_ids: &[String],
        since: NaiveDate,
    ) -> Result<Vec<DailyMetric>, AppError> {
        if location_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT location_id::text, date,
                   COALESCE(views, 0), COALESCE(searches, 0), COALESCE(calls, 0),
                   COALESCE(direction_requests, 0), COALESCE(website_clicks, 0),
                   COALESCE(actions, 0)
            FROM daily_metrics
            WHERE location_id::text = ANY($1) AND date >= $2
            ORDER BY date DESC
            "#,
        )
        .bind(location_ids.to_vec())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(daily_metric_from_row).collect())
    }

    async fn upsert_review(&self, review: &ReviewUpsert) -> Result<(), AppError> {
        let rating = validate_rating(review.rating)?;

        sqlx::query(
            r#"
            INSERT INTO reviews
                (google_review_id, location_id, author_name, rating, comment,
                 review_date, response_text, response_date)
            VALUES ($1, $2::uuid, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (google_review_id)
            DO UPDATE SET
                location_id = EXCLUDED.location_id,
                author_name = EXCLUDED.author_name,
                rating = EXCLUDED.rating,
                comment = EXCLUDED.comment,
                review_date = EXCLUDED.review_date,
                response_text = EXCLUDED.response_text,
                response_date = EXCLUDED.response_date
            "#,
        )
        .bind(&review.google_review_id)
        .bind(&review.location_id)
        .bind(&review.author_name)
        .bind(rating)
        .bind(&review.comment)
        .bind(review.review_date)
        .bind(&review.response_text)
        .bind(review.response_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_reviews(&self, location_ids: &[String]) -> Result<Vec<Review>, AppError> {
        if location_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id::text, google_review_id, location_id::text, author_name, rating,
                   comment, review_date, response_text, response_date
            FROM reviews
            WHERE location_id::text = ANY($1)
            ORDER BY review_date DESC
            "#,
        )
        .bind(location_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let reviews = rows
            .iter()
            .map(|row| Review {
                id: row.get(0),
                google_review_id: row.get(1),
                location_id: row.get(2),
                author_name: row.try_get(3).ok().flatten(),
                rating: row.get(4),
                comment: row.try_get(5).ok().flatten(),
                review_date: row.get(6),
                response_text: row.try_get(7).ok().flatten(),
                response_date: row.try_get(8).ok().flatten(),
            })
            .collect();

        Ok(reviews)
    }
}

fn daily_metric_from_row(row: &PgRow) -> DailyMetric {
    DailyMetric {
        location_id: row.get(0),
        date: row.get(1),
        views: row.get(2),
        searches: row.get(3),
        calls: row.get(4),
        direction_requests: row.get(5),
        website_clicks: row.get(6),
        actions: row.get(7),
    }
}
