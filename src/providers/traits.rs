use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;

/// A set of tokens returned from an OAuth provider after code exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

/// Longest lifetime accepted from a provider's `expires_in`.
const MAX_TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 3600;

fn bounded_secs(secs: u64) -> i64 {
    i64::try_from(secs)
        .unwrap_or(MAX_TOKEN_LIFETIME_SECS)
        .min(MAX_TOKEN_LIFETIME_SECS)
}

/// When a token issued at `now` expires. Missing `expires_in` uses
/// `default_ttl`; both are capped at a week.
pub fn token_expiry(now: DateTime<Utc>, expires_in: Option<u64>, default_ttl: Duration) -> DateTime<Utc> {
    let fallback = bounded_secs(default_ttl.as_secs());
    let secs = expires_in.map(bounded_secs).unwrap_or(fallback);
    now.checked_add_signed(chrono::Duration::seconds(secs))
        .or_else(|| now.checked_add_signed(chrono::Duration::seconds(fallback)))
        .unwrap_or(now)
}

/// What the provider reports about a live access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenInfo {
    pub email: Option<String>,
    /// Stable provider-side user identifier.
    pub subject: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

/// The OAuth operations the token lifecycle needs from a provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Unique provider identifier (e.g., "google").
    fn id(&self) -> &str;

    /// Scopes requested on the consent screen.
    fn default_scopes(&self) -> Vec<String>;

    /// Build the authorization URL that the user should be redirected to.
    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String;

    /// Exchange an authorization code for an access token (and optionally refresh token).
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, AppError>;

    /// Refresh an expired access token using a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AppError>;

    /// Liveness probe. `Ok(None)` means the provider rejected the token.
    async fn token_info(&self, access_token: &str) -> Result<Option<TokenInfo>, AppError>;

    /// How long tokens from this provider typically live.
    fn token_ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry_uses_reported_lifetime() {
        let expiry = token_expiry(now(), Some(3599), Duration::from_secs(3600));
        assert_eq!(expiry, now() + chrono::Duration::seconds(3599));
    }

    #[test]
    fn test_expiry_falls_back_to_default_ttl() {
        let expiry = token_expiry(now(), None, Duration::from_secs(3600));
        assert_eq!(expiry, now() + chrono::Duration::hours(1));
    }

    #[test]
    fn test_huge_expires_in_is_capped() {
        let week = now() + chrono::Duration::days(7);
        assert_eq!(token_expiry(now(), Some(u64::MAX), Duration::from_secs(3600)), week);
        assert_eq!(
            token_expiry(now(), Some(i64::MAX as u64), Duration::from_secs(3600)),
            week
        );
        assert_eq!(token_expiry(now(), None, Duration::from_secs(u64::MAX)), week);
    }

    #[test]
    fn test_expiry_near_max_date_does_not_overflow() {
        let end = DateTime::<Utc>::MAX_UTC;
        assert_eq!(token_expiry(end, Some(3600), Duration::from_secs(3600)), end);
    }
}
