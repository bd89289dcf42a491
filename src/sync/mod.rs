//! The sync routine: resolve a Google token for the user, walk accounts and
//! their locations, upsert what comes back, and optionally pull reviews and
//! daily metrics for each stored location.
//!
//! One invocation is strictly sequential with fixed pauses between upstream
//! calls. Nothing is checkpointed; a retried sync starts over.

pub mod outcome;
pub mod token;

pub use outcome::{InsightsSummary, SyncOutcome, NO_LOCATIONS_NOTE};
pub use token::{resolve_token, ResolvedToken, TokenSource};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use crate::business::normalize::{fold_daily_metrics, normalize_location, normalize_review};
use crate::business::{
    with_retry, ApiFailure, BusinessAccount, BusinessApi, DateRange, Page, RawLocation,
    RetryPolicy, Sleeper,
};
use crate::config::SyncSettings;
use crate::error::AppError;
use crate::providers::OAuthProvider;
use crate::store::Store;

/// Upper bound on pages fetched for a single listing.
const MAX_PAGES: usize = 200;

/// Per-request options for a sync.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Google access token from the caller's session, used as a last resort.
    pub provider_token: Option<String>,
    /// Overrides the configured default when set.
    pub include_insights: Option<bool>,
}

/// A location written during this run, remembered for the insights phase.
struct StoredLocation {
    account: String,
    location_id: String,
    row_id: String,
}

#[derive(Clone)]
pub struct Syncer {
    store: Arc<dyn Store>,
    oauth: Arc<dyn OAuthProvider>,
    api: Arc<dyn BusinessApi>,
    sleeper: Arc<dyn Sleeper>,
    settings: SyncSettings,
    retry: RetryPolicy,
}

impl Syncer {
    pub fn new(
        store: Arc<dyn Store>,
        oauth: Arc<dyn OAuthProvider>,
        api: Arc<dyn BusinessApi>,
        sleeper: Arc<dyn Sleeper>,
        settings: SyncSettings,
    ) -> Self {
        let retry = RetryPolicy::from_settings(&settings);
        Self {
            store,
            oauth,
            api,
            sleeper,
            settings,
            retry,
        }
    }

    pub async fn sync_user(
        &self,
        user_id: &str,
        options: SyncOptions,
    ) -> Result<SyncOutcome, AppError> {
        let cred = self
            .store
            .get_credential(user_id)
            .await?
            .ok_or(AppError::NoLinkedAccount)?;

        let token = resolve_token(
            self.store.as_ref(),
            self.oauth.as_ref(),
            &cred,
            options.provider_token.as_deref(),
        )
        .await?;
        info!(
            "syncing Google Business data for user {user_id} (token: {:?})",
            token.source
        );
        let access_token = token.access_token.as_str();

        self.sleeper.sleep(self.settings.initial_delay).await;
        let accounts = self
            .list_accounts(access_token)
            .await
            .map_err(|e| self.escalate(e))?;
        info!("found {} Google Business accounts", accounts.len());

        let mut total_found = 0;
        let mut stored = Vec::new();

        for account in &accounts {
            self.sleeper.sleep(self.settings.account_delay).await;
            let locations = self
                .list_locations(access_token, &account.name)
                .await
                .map_err(|e| self.escalate(e))?;
            info!("account {}: {} locations", account.name, locations.len());
            total_found += locations.len();

            for raw in &locations {
                let Some(location) = normalize_location(raw, &cred.id) else {
                    warn!("skipping location without a resource name in {}", account.name);
                    continue;
                };
                match self.store.upsert_location(&location).await {
                    Ok(row_id) => stored.push(StoredLocation {
                        account: account.name.clone(),
                        location_id: location.location_id,
                        row_id,
                    }),
                    Err(e) => warn!("failed to store location {}: {e}", location.location_id),
                }
            }
        }

        let insights = if options
            .include_insights
            .unwrap_or(self.settings.include_insights)
        {
            Some(self.sync_insights(access_token, &stored).await?)
        } else {
            None
        };

        let outcome = SyncOutcome::new(
            accounts.len(),
            total_found,
            stored.len(),
            token.source,
            insights,
        );
        info!("{}", outcome.message);
        Ok(outcome)
    }

    fn escalate(&self, failure: ApiFailure) -> AppError {
        failure.into_app_error(self.settings.default_retry_after)
    }

    /// Follow `nextPageToken` until exhausted, retrying each page on 429.
    /// Stops early when Google hands back a token it already served.
    async fn collect_pages<T, F, Fut>(&self, what: &str, mut fetch: F) -> Result<Vec<T>, ApiFailure>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiFailure>>,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut requested: HashSet<String> = HashSet::new();

        for _ in 0..MAX_PAGES {
            let page = with_retry(&self.retry, self.sleeper.as_ref(), what, || {
                fetch(page_token.clone())
            })
            .await?;
            items.extend(page.items);

            let Some(next) = page.next_page_token.filter(|t| !t.is_empty()) else {
                return Ok(items);
            };
            if let Some(current) = page_token.take() {
                requested.insert(current);
            }
            if requested.contains(&next) {
                warn!("{what}: page token {next} repeated, stopping pagination");
                return Ok(items);
            }
            page_token = Some(next);
        }

        warn!("{what}: stopped after {MAX_PAGES} pages");
        Ok(items)
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<BusinessAccount>, ApiFailure> {
        let api = self.api.as_ref();
        self.collect_pages("accounts", |page_token| async move {
            api.list_accounts(access_token, page_token.as_deref()).await
        })
        .await
    }

    async fn list_locations(
        &self,
        access_token: &str,
        account: &str,
    ) -> Result<Vec<RawLocation>, ApiFailure> {
        let api = self.api.as_ref();
        self.collect_pages("locations", |page_token| async move {
            api.list_locations(access_token, account, page_token.as_deref())
                .await
        })
        .await
    }

    /// Reviews and daily metrics per stored location. 401 and 429 abort the
    /// sync; anything else is logged and counted.
    async fn sync_insights(
        &self,
        access_token: &str,
        locations: &[StoredLocation],
    ) -> Result<InsightsSummary, AppError> {
        let mut summary = InsightsSummary::default();
        let range = self.metrics_range();

        for loc in locations {
            self.sleeper.sleep(self.settings.location_delay).await;

            match self.sync_reviews(access_token, loc).await {
                Ok(n) => summary.reviews += n,
                Err(e) => self.absorb(e, &loc.location_id, "reviews", &mut summary)?,
            }
            match self.sync_metrics(access_token, loc, range).await {
                Ok(n) => summary.metric_days += n,
                Err(e) => self.absorb(e, &loc.location_id, "metrics", &mut summary)?,
            }
        }

        info!(
            "insights: {} reviews, {} metric days, {} failures",
            summary.reviews, summary.metric_days, summary.failures
        );
        Ok(summary)
    }

    fn absorb(
        &self,
        failure: ApiFailure,
        location_id: &str,
        what: &str,
        summary: &mut InsightsSummary,
    ) -> Result<(), AppError> {
        match failure {
            ApiFailure::RateLimited { .. } | ApiFailure::Unauthorized => {
                Err(self.escalate(failure))
            }
            other => {
                warn!("{what} for {location_id} failed: {other}");
                summary.failures += 1;
                Ok(())
            }
        }
    }

    async fn sync_reviews(&self, access_token: &str, loc: &StoredLocation) -> Result<usize, ApiFailure> {
        let api = self.api.as_ref();
        let (account, location) = (loc.account.as_str(), loc.location_id.as_str());
        let reviews = self
            .collect_pages("reviews", |page_token| async move {
                api.list_reviews(access_token, account, location, page_token.as_deref())
                    .await
            })
            .await?;

        let mut written = 0;
        for raw in &reviews {
            let Some(review) = normalize_review(raw, &loc.row_id) else {
                continue;
            };
            match self.store.upsert_review(&review).await {
                Ok(()) => written += 1,
                Err(e) => warn!("failed to store review {}: {e}", review.google_review_id),
            }
        }
        Ok(written)
    }

    async fn sync_metrics(
        &self,
        access_token: &str,
        loc: &StoredLocation,
        range: DateRange,
    ) -> Result<usize, ApiFailure> {
        let series = with_retry(&self.retry, self.sleeper.as_ref(), "daily metrics", || {
            self.api
                .fetch_daily_metrics(access_token, &loc.location_id, range)
        })
        .await?;

        let mut written = 0;
        for row in fold_daily_metrics(&loc.row_id, &series) {
            match self.store.upsert_daily_metric(&row).await {
                Ok(()) => written += 1,
                Err(e) => warn!("failed to store metrics for {} on {}: {e}", loc.location_id, row.date),
            }
        }
        Ok(written)
    }

    /// Lookback window ending yesterday; today's numbers are incomplete.
    fn metrics_range(&self) -> DateRange {
        let end = Utc::now().date_naive() - ChronoDuration::days(1);
        let days = i64::from(self.settings.metrics_lookback_days.max(1));
        DateRange {
            start: end - ChronoDuration::days(days - 1),
            end,
        }
    }
}
