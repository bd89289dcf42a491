use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    pub base_url: String,
    /// Dashboard frontend URL for post-OAuth redirects
    pub dashboard_url: String,

    // ── Database ────────────────────────────────────────────────────────
    pub database_url: String,

    // ── Crypto ──────────────────────────────────────────────────────────
    /// 32-byte base64-encoded master key for AES-256-GCM token encryption.
    pub master_key: String,
    /// 32-byte base64-encoded HMAC key for state parameter signing.
    pub hmac_secret: String,

    // ── Sessions (hosted auth service) ──────────────────────────────────
    /// HS256 secret the auth service signs session JWTs with.
    pub session_jwt_secret: String,
    pub session_jwt_audience: Option<String>,

    // ── Google OAuth client ─────────────────────────────────────────────
    pub google_client_id: String,
    pub google_client_secret: String,

    // ── Sync pacing ─────────────────────────────────────────────────────
    pub sync: SyncSettings,
    pub http_timeout: Duration,
}

/// Knobs for one sync invocation: pauses, retry policy, insights.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Pause before the first business API call.
    pub initial_delay: Duration,
    /// Pause before each per-account locations listing.
    pub account_delay: Duration,
    /// Pause before each per-location insights fetch.
    pub location_delay: Duration,
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub max_backoff: Duration,
    /// Retry-after hint reported when Google sends none.
    pub default_retry_after: Duration,
    pub include_insights: bool,
    pub metrics_lookback_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            account_delay: Duration::from_millis(1500),
            location_delay: Duration::from_millis(500),
            max_attempts: 3,
            backoff_step: Duration::from_millis(2000),
            max_backoff: Duration::from_millis(10_000),
            default_retry_after: Duration::from_secs(60),
            include_insights: false,
            metrics_lookback_days: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = SyncSettings::default();

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("PORT", 8430)?,
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8430".into()),
            dashboard_url: std::env::var("DASHBOARD_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),

            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL is required (PostgreSQL connection string)")?,
            master_key: std::env::var("MASTER_KEY")
                .context("MASTER_KEY is required (32 bytes, base64)")?,
            hmac_secret: std::env::var("HMAC_SECRET")
                .context("HMAC_SECRET is required (32 bytes, base64)")?,

            session_jwt_secret: std::env::var("SESSION_JWT_SECRET")
                .context("SESSION_JWT_SECRET is required to verify dashboard sessions")?,
            session_jwt_audience: std::env::var("SESSION_JWT_AUDIENCE").ok(),

            google_client_id: std::env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID is required")?,
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET is required")?,

            sync: SyncSettings {
                initial_delay: millis_or("SYNC_INITIAL_DELAY_MS", defaults.initial_delay)?,
                account_delay: millis_or("SYNC_ACCOUNT_DELAY_MS", defaults.account_delay)?,
                location_delay: millis_or("SYNC_LOCATION_DELAY_MS", defaults.location_delay)?,
                max_attempts: env_or("SYNC_MAX_ATTEMPTS", defaults.max_attempts)?,
                backoff_step: millis_or("SYNC_BACKOFF_STEP_MS", defaults.backoff_step)?,
                max_backoff: millis_or("SYNC_MAX_BACKOFF_MS", defaults.max_backoff)?,
                default_retry_after: Duration::from_secs(env_or(
                    "RATE_LIMIT_RETRY_AFTER_SECS",
                    defaults.default_retry_after.as_secs(),
                )?),
                include_insights: env_or("SYNC_INCLUDE_INSIGHTS", defaults.include_insights)?,
                metrics_lookback_days: env_or(
                    "METRICS_LOOKBACK_DAYS",
                    defaults.metrics_lookback_days,
                )?,
            },
            http_timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 30)?),
        })
    }

    /// The OAuth callback URL registered with Google.
    pub fn callback_url(&self) -> String {
        format!("{}/v1/google/callback", self.base_url)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn millis_or(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_millis() as u64).map(Duration::from_millis)
}
