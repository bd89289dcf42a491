//! Stores Google tokens handed over by the auth service when a user signs in
//! with Google. Storage never blocks sign-in: failures and timeouts are logged
//! and acknowledged.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::AuthContext;
use crate::error::AppError;
use crate::providers::token_expiry;
use crate::store::{CredentialUpsert, Store};

pub const STORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    /// e.g. `SIGNED_IN`, `TOKEN_REFRESHED`, `SIGNED_OUT`.
    pub event: String,
    pub provider_token: Option<String>,
    pub provider_refresh_token: Option<String>,
    /// Unix seconds.
    pub provider_expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthEventAck {
    pub event: String,
    pub stored: bool,
}

fn carries_tokens(event: &AuthEvent) -> bool {
    matches!(event.event.as_str(), "SIGNED_IN" | "TOKEN_REFRESHED")
        && event
            .provider_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
}

pub async fn handle_auth_event(
    store: &dyn Store,
    ctx: &AuthContext,
    event: AuthEvent,
    default_ttl: Duration,
    timeout: Duration,
) -> AuthEventAck {
    if !carries_tokens(&event) {
        return AuthEventAck {
            event: event.event,
            stored: false,
        };
    }

    let expires_at = event
        .provider_expires_at
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(|| token_expiry(Utc::now(), None, default_ttl));

    let upsert = CredentialUpsert {
        user_id: ctx.user_id.clone(),
        email: ctx.email.clone().unwrap_or_default(),
        google_account_id: ctx
            .provider_subject
            .clone()
            .unwrap_or_else(|| ctx.user_id.clone()),
        access_token: event.provider_token.clone(),
        refresh_token: event.provider_refresh_token.clone().filter(|t| !t.is_empty()),
        token_expires_at: Some(expires_at),
    };

    let stored = match store_with_timeout(store, &upsert, timeout).await {
        Ok(id) => {
            info!("stored Google tokens for user {} (credential {id})", ctx.user_id);
            true
        }
        Err(e) => {
            error!("failed to store Google tokens for user {}: {e}", ctx.user_id);
            false
        }
    };

    AuthEventAck {
        event: event.event,
        stored,
    }
}

async fn store_with_timeout(
    store: &dyn Store,
    upsert: &CredentialUpsert,
    timeout: Duration,
) -> Result<String, AppError> {
    tokio::time::timeout(timeout, store.upsert_credential(upsert))
        .await
        .map_err(|_| AppError::Internal("token storage timed out".into()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ctx() -> AuthContext {
        AuthContext {
            user_id: "user-1".into(),
            email: Some("owner@example.com".into()),
            provider_subject: Some("1029384756".into()),
        }
    }

    fn event(name: &str, token: Option<&str>) -> AuthEvent {
        AuthEvent {
            event: name.into(),
            provider_token: token.map(String::from),
            provider_refresh_token: Some("1//rt".into()),
            provider_expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_sign_in_with_provider_token_is_stored() {
        let store = MemoryStore::new();
        let ack = handle_auth_event(
            &store,
            &ctx(),
            event("SIGNED_IN", Some("ya29.a")),
            Duration::from_secs(3600),
            STORE_TIMEOUT,
        )
        .await;
        assert!(ack.stored);

        let cred = store.get_credential("user-1").await.unwrap().unwrap();
        assert_eq!(cred.google_account_id, "1029384756");
        assert_eq!(cred.access_token.as_deref(), Some("ya29.a"));
        assert_eq!(cred.refresh_token.as_deref(), Some("1//rt"));
        assert!(cred.token_expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_events_without_provider_token_are_ignored() {
        let store = MemoryStore::new();
        for e in [event("SIGNED_IN", None), event("SIGNED_OUT", Some("ya29.a"))] {
            let ack =
                handle_auth_event(&store, &ctx(), e, Duration::from_secs(3600), STORE_TIMEOUT)
                    .await;
            assert!(!ack.stored);
        }
        assert!(store.get_credential("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subject_falls_back_to_user_id_and_expiry_is_honored() {
        let store = MemoryStore::new();
        let mut ctx = ctx();
        ctx.provider_subject = None;
        let mut e = event("TOKEN_REFRESHED", Some("ya29.b"));
        e.provider_expires_at = Some(1_900_000_000);

        handle_auth_event(&store, &ctx, e, Duration::from_secs(3600), STORE_TIMEOUT).await;

        let cred = store.get_credential("user-1").await.unwrap().unwrap();
        assert_eq!(cred.google_account_id, "user-1");
        assert_eq!(
            cred.token_expires_at.map(|t| t.timestamp()),
            Some(1_900_000_000)
        );
    }
}
