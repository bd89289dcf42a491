//! Access token resolution for a stored Google credential.
//!
//! Order: stored token (probed) → one refresh → session-supplied token
//! (probed) → reauthentication required.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::providers::{token_expiry, OAuthProvider};
use crate::store::{Credential, Store};

/// Where the access token used for a sync came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Stored,
    Refreshed,
    Session,
}

#[derive(Debug, Clone)]
pub struct ResolvedToken {
    pub access_token: String,
    pub source: TokenSource,
}

const REAUTH_MESSAGE: &str =
    "No valid Google access token. Please sign out and sign back in with Google.";

/// `Some(expires_in)` when the provider accepts the token. Transport failures
/// count as not live.
async fn probe(oauth: &dyn OAuthProvider, access_token: &str, label: &str) -> Option<Option<u64>> {
    match oauth.token_info(access_token).await {
        Ok(Some(info)) => Some(info.expires_in),
        Ok(None) => {
            debug!("{label} token rejected by {}", oauth.id());
            None
        }
        Err(e) => {
            warn!("{label} token probe failed: {e}");
            None
        }
    }
}

pub async fn resolve_token(
    store: &dyn Store,
    oauth: &dyn OAuthProvider,
    cred: &Credential,
    session_token: Option<&str>,
) -> Result<ResolvedToken, AppError> {
    let now = Utc::now();

    // 1. Stored token, unless it is already known to be expired.
    if let Some(token) = cred.access_token.as_deref().filter(|t| !t.is_empty()) {
        if cred.is_expired_at(now) {
            debug!("stored token for credential {} is past its expiry", cred.id);
        } else if probe(oauth, token, "stored").await.is_some() {
            return Ok(ResolvedToken {
                access_token: token.to_string(),
                source: TokenSource::Stored,
            });
        }
    }

    // 2. Exactly one refresh attempt.
    if let Some(refresh_token) = cred.refresh_token.as_deref().filter(|t| !t.is_empty()) {
        match oauth.refresh_token(refresh_token).await {
            Ok(tokens) => {
                let expires_at = token_expiry(Utc::now(), tokens.expires_in, oauth.token_ttl());
                if let Err(e) = store
                    .update_refreshed_tokens(
                        &cred.id,
                        &tokens.access_token,
                        tokens.refresh_token.as_deref(),
                        Some(expires_at),
                    )
                    .await
                {
                    warn!("refreshed token for credential {} not persisted: {e}", cred.id);
                }
                info!("refreshed Google token for credential {}", cred.id);
                return Ok(ResolvedToken {
                    access_token: tokens.access_token,
                    source: TokenSource::Refreshed,
                });
            }
            Err(e) => warn!("token refresh failed for credential {}: {e}", cred.id),
        }
    }

    // 3. Token carried by the caller's session.
    if let Some(token) = session_token.filter(|t| !t.is_empty()) {
        if let Some(expires_in) = probe(oauth, token, "session").await {
            let expires_at = token_expiry(Utc::now(), expires_in, oauth.token_ttl());
            if let Err(e) = store
                .update_refreshed_tokens(&cred.id, token, None, Some(expires_at))
                .await
            {
                warn!("session token for credential {} not persisted: {e}", cred.id);
            }
            info!("using session-supplied Google token for credential {}", cred.id);
            return Ok(ResolvedToken {
                access_token: token.to_string(),
                source: TokenSource::Session,
            });
        }
    }

    Err(AppError::NoUsableToken(REAUTH_MESSAGE.into()))
}
