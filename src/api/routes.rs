//! API route handlers for gbp-sync.
//!
//! All handlers receive `SharedState` via Axum state extraction. Everything
//! except `/status` and the OAuth callback requires a dashboard session.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{handle_auth_event, listener::STORE_TIMEOUT, AuthContext, AuthEvent, AuthEventAck};
use crate::dashboard::{load_dashboard, Dashboard};
use crate::error::AppError;
use crate::providers::token_expiry;
use crate::store::CredentialUpsert;
use crate::sync::{SyncOptions, SyncOutcome};
use crate::SharedState;

// =============================================================================
// V1 Router
// =============================================================================

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Sync ─────────────────────────────────────────────────────────
        .route("/sync", post(sync))
        // ── Auth events ──────────────────────────────────────────────────
        .route("/auth/events", post(auth_events))
        // ── Google connection ────────────────────────────────────────────
        .route("/google/connect", get(google_connect))
        .route("/google/callback", get(google_callback))
        .route("/google/connection", get(google_connection))
        // ── Read side ────────────────────────────────────────────────────
        .route("/locations", get(locations))
        .route("/dashboard", get(dashboard))
        .with_state(state)
}

/// Verify the session bearer token for protected endpoints.
fn require_session(state: &SharedState, headers: &HeaderMap) -> Result<AuthContext, AppError> {
    state.sessions.verify_headers(headers)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "gbp-sync",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Sync
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    user_id: Option<String>,
    provider_token: Option<String>,
    include_insights: Option<bool>,
}

/// POST /v1/sync: Pull accounts and locations from Google for the caller.
///
/// The body is optional. A `userId` in the body must match the session.
async fn sync(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncOutcome>, AppError> {
    let auth = require_session(&state, &headers)?;

    let req: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid sync request: {e}")))?
    };

    if let Some(user_id) = req.user_id.as_deref() {
        if user_id != auth.user_id {
            warn!("sync for {user_id} requested by {}", auth.user_id);
            return Err(AppError::Forbidden(
                "userId does not match the signed-in user".into(),
            ));
        }
    }

    let outcome = state
        .syncer
        .sync_user(
            &auth.user_id,
            SyncOptions {
                provider_token: req.provider_token,
                include_insights: req.include_insights,
            },
        )
        .await
        .inspect_err(|e| warn!("sync failed for user {}: {e}", auth.user_id))?;

    Ok(Json(outcome))
}

// =============================================================================
// Auth events
// =============================================================================

/// POST /v1/auth/events: Auth state changes forwarded by the dashboard.
async fn auth_events(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(event): Json<AuthEvent>,
) -> Result<Json<AuthEventAck>, AppError> {
    let auth = require_session(&state, &headers)?;
    let ack = handle_auth_event(
        state.store.as_ref(),
        &auth,
        event,
        state.oauth.token_ttl(),
        STORE_TIMEOUT,
    )
    .await;
    Ok(Json(ack))
}

// =============================================================================
// Google OAuth
// =============================================================================

/// GET /v1/google/connect: Redirect to Google's consent screen.
async fn google_connect(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = require_session(&state, &headers)?;

    let signed_state = state
        .crypto
        .sign_oauth_state(&auth.user_id, Utc::now().timestamp())?;

    let auth_url = state.oauth.auth_url(
        &state.oauth.default_scopes(),
        &signed_state,
        &state.config.callback_url(),
    );
    Ok(Redirect::temporary(&auth_url).into_response())
}

#[derive(Deserialize)]
struct OAuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /v1/google/callback: Exchange the code and store the credential.
async fn google_callback(
    State(state): State<SharedState>,
    Query(q): Query<OAuthCallbackQuery>,
) -> Result<Response, AppError> {
    if let Some(error) = q.error {
        warn!("Google consent returned error: {error}");
        let encoded: String = url::form_urlencoded::byte_serialize(error.as_bytes()).collect();
        let redirect = format!("{}?error={}", state.config.dashboard_url, encoded);
        return Ok(Redirect::temporary(&redirect).into_response());
    }

    let signed = q.state.ok_or(AppError::InvalidState)?;
    let code = q
        .code
        .ok_or_else(|| AppError::BadRequest("missing authorization code".into()))?;

    let user_id = state
        .crypto
        .verify_oauth_state(&signed, Utc::now().timestamp())?;

    let tokens = state
        .oauth
        .exchange_code(&code, &state.config.callback_url())
        .await?;
    let info = state
        .oauth
        .token_info(&tokens.access_token)
        .await?
        .ok_or_else(|| AppError::ProviderError("Google rejected the new access token".into()))?;

    let cred = CredentialUpsert {
        google_account_id: info.subject.clone().unwrap_or_else(|| user_id.clone()),
        email: info.email.unwrap_or_default(),
        user_id,
        access_token: Some(tokens.access_token),
        refresh_token: tokens.refresh_token,
        token_expires_at: Some(token_expiry(
            Utc::now(),
            tokens.expires_in,
            state.oauth.token_ttl(),
        )),
    };
    let cred_id = state.store.upsert_credential(&cred).await?;
    info!("linked Google account for user {} (credential {cred_id})", cred.user_id);

    let redirect = format!("{}?connected=google", state.config.dashboard_url);
    Ok(Redirect::temporary(&redirect).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionStatus {
    connected: bool,
    email: Option<String>,
    google_account_id: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    has_refresh_token: bool,
    updated_at: Option<DateTime<Utc>>,
}

/// GET /v1/google/connection: Whether a Google account is linked. Never
/// returns tokens.
async fn google_connection(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ConnectionStatus>, AppError> {
    let auth = require_session(&state, &headers)?;
    let cred = state.store.get_credential(&auth.user_id).await?;

    Ok(Json(match cred {
        Some(c) => ConnectionStatus {
            connected: true,
            email: Some(c.email),
            google_account_id: Some(c.google_account_id),
            token_expires_at: c.token_expires_at,
            has_refresh_token: c.refresh_token.is_some(),
            updated_at: Some(c.updated_at),
        },
        None => ConnectionStatus {
            connected: false,
            email: None,
            google_account_id: None,
            token_expires_at: None,
            has_refresh_token: false,
            updated_at: None,
        },
    }))
}

// =============================================================================
// Read side
// =============================================================================

/// GET /v1/locations: The caller's stored locations.
async fn locations(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let auth = require_session(&state, &headers)?;
    let locations = state.store.list_locations(&auth.user_id).await?;
    Ok(Json(json!({
        "count": locations.len(),
        "locations": locations,
    })))
}

/// GET /v1/dashboard: Aggregated metrics, trend and reviews.
async fn dashboard(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Dashboard>, AppError> {
    let auth = require_session(&state, &headers)?;
    let dash = load_dashboard(
        state.store.as_ref(),
        &auth.user_id,
        state.config.sync.metrics_lookback_days,
    )
    .await?;
    Ok(Json(dash))
}
