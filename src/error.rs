use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

/// Unified error type for the gbp-sync service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Session Errors ──────────────────────────────────────────────────
    #[error("No authorization provided")]
    MissingAuthorization,

    #[error("Invalid user token: {0}")]
    InvalidSession(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ── Google Credential Errors ────────────────────────────────────────
    #[error("No Google account found")]
    NoLinkedAccount,

    #[error("{0}")]
    NoUsableToken(String),

    #[error("Invalid state parameter")]
    InvalidState,

    #[error("OAuth provider error: {0}")]
    ProviderError(String),

    // ── Upstream Errors ─────────────────────────────────────────────────
    #[error("Google API rate limit exceeded. Please try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Failed to fetch Google Business data: {message}")]
    UpstreamFetch { status: Option<u16>, message: String },

    // ── Request Errors ──────────────────────────────────────────────────
    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Force a fresh Google sign-in.
    Reauth,
    /// Retry later, possibly after a hint.
    Transient,
    /// The request itself is wrong.
    Client,
    Fatal,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingAuthorization => "missing_authorization",
            AppError::InvalidSession(_) => "invalid_session",
            AppError::Forbidden(_) => "forbidden",
            AppError::NoLinkedAccount => "no_linked_account",
            AppError::NoUsableToken(_) => "no_usable_token",
            AppError::InvalidState => "invalid_state",
            AppError::ProviderError(_) => "provider_error",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::UpstreamFetch { .. } => "upstream_fetch_failed",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Crypto(_) => "crypto_error",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingAuthorization => StatusCode::UNAUTHORIZED,
            AppError::InvalidSession(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NoLinkedAccount => StatusCode::NOT_FOUND,
            AppError::NoUsableToken(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidState => StatusCode::BAD_REQUEST,
            AppError::ProviderError(_) => StatusCode::BAD_GATEWAY,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamFetch { .. } => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::NoUsableToken(_) => ErrorCategory::Reauth,
            AppError::RateLimited { .. } | AppError::UpstreamFetch { .. } => {
                ErrorCategory::Transient
            }
            AppError::MissingAuthorization
            | AppError::InvalidSession(_)
            | AppError::Forbidden(_)
            | AppError::NoLinkedAccount
            | AppError::InvalidState
            | AppError::NotFound(_)
            | AppError::BadRequest(_) => ErrorCategory::Client,
            AppError::ProviderError(_)
            | AppError::Crypto(_)
            | AppError::Database(_)
            | AppError::Internal(_) => ErrorCategory::Fatal,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category() == ErrorCategory::Reauth
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        AppError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let mut error = json!({
            "code": self.code(),
            "category": self.category(),
            "message": self.to_string(),
            "requiresReauth": self.requires_reauth(),
        });
        if let AppError::RateLimited { retry_after_secs } = &self {
            error["retryAfter"] = json!(retry_after_secs);
        }
        if let AppError::UpstreamFetch {
            status: Some(upstream),
            ..
        } = &self
        {
            error["upstreamStatus"] = json!(upstream);
        }

        let mut response = (status, axum::Json(json!({ "error": error }))).into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
