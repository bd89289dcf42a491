#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use gbp_sync::auth::SessionVerifier;
use gbp_sync::business::{
    ApiFailure, BusinessAccount, BusinessApi, DateRange, MetricSeries, Page, RawLocation,
    RawReview, Sleeper,
};
use gbp_sync::config::SyncSettings;
use gbp_sync::crypto::CryptoEngine;
use gbp_sync::providers::{OAuthProvider, TokenInfo, TokenSet};
use gbp_sync::store::{CredentialUpsert, MemoryStore, Store};
use gbp_sync::sync::Syncer;
use gbp_sync::{AppError, AppState, Config, SharedState};

pub const SESSION_SECRET: &str = "integration-session-secret";

pub fn config() -> Config {
    let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        base_url: "http://localhost:8430".into(),
        dashboard_url: "http://localhost:5173".into(),
        database_url: String::new(),
        master_key: key.clone(),
        hmac_secret: key,
        session_jwt_secret: SESSION_SECRET.into(),
        session_jwt_audience: None,
        google_client_id: "client-1.apps.googleusercontent.com".into(),
        google_client_secret: "secret".into(),
        sync: SyncSettings::default(),
        http_timeout: Duration::from_secs(5),
    }
}

pub fn session_token(user_id: &str) -> String {
    let claims = json!({
        "sub": user_id,
        "email": "owner@example.com",
        "exp": chrono::Utc::now().timestamp() + 3600,
        "user_metadata": { "sub": "1029384756" },
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SESSION_SECRET.as_bytes()),
    )
    .unwrap()
}

// ── Fakes ───────────────────────────────────────────────────────────────────

/// Accepts the listed tokens; refresh always fails.
#[derive(Default)]
pub struct StaticOAuth {
    pub live: HashSet<String>,
}

impl StaticOAuth {
    pub fn accepting(tokens: &[&str]) -> Self {
        Self {
            live: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl OAuthProvider for StaticOAuth {
    fn id(&self) -> &str {
        "google"
    }
    fn default_scopes(&self) -> Vec<String> {
        vec!["https://www.googleapis.com/auth/business.manage".into()]
    }
    fn auth_url(&self, _scopes: &[String], state: &str, redirect_uri: &str) -> String {
        format!("https://accounts.google.test/auth?state={state}&redirect_uri={redirect_uri}")
    }
    async fn exchange_code(&self, _: &str, _: &str) -> Result<TokenSet, AppError> {
        Err(AppError::ProviderError("not scripted".into()))
    }
    async fn refresh_token(&self, _: &str) -> Result<TokenSet, AppError> {
        Err(AppError::ProviderError("invalid_grant".into()))
    }
    async fn token_info(&self, access_token: &str) -> Result<Option<TokenInfo>, AppError> {
        Ok(self
            .live
            .contains(access_token)
            .then(TokenInfo::default))
    }
}

/// Serves fixed accounts and locations, or a fixed failure for accounts.
#[derive(Default)]
pub struct StaticApi {
    pub accounts: Vec<BusinessAccount>,
    pub locations: Vec<RawLocation>,
    pub accounts_failure: Option<ApiFailure>,
}

impl StaticApi {
    pub fn one_account(locations: Vec<RawLocation>) -> Self {
        Self {
            accounts: vec![BusinessAccount {
                name: "accounts/1".into(),
                account_name: Some("Owner".into()),
                account_type: Some("PERSONAL".into()),
            }],
            locations,
            accounts_failure: None,
        }
    }
}

#[async_trait]
impl BusinessApi for StaticApi {
    async fn list_accounts(
        &self,
        _: &str,
        _: Option<&str>,
    ) -> Result<Page<BusinessAccount>, ApiFailure> {
        if let Some(failure) = &self.accounts_failure {
            return Err(failure.clone());
        }
        Ok(Page {
            items: self.accounts.clone(),
            next_page_token: None,
        })
    }
    async fn list_locations(
        &self,
        _: &str,
        _: &str,
        _: Option<&str>,
    ) -> Result<Page<RawLocation>, ApiFailure> {
        Ok(Page {
            items: self.locations.clone(),
            next_page_token: None,
        })
    }
    async fn list_reviews(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: Option<&str>,
    ) -> Result<Page<RawReview>, ApiFailure> {
        Ok(Page::default())
    }
    async fn fetch_daily_metrics(
        &self,
        _: &str,
        _: &str,
        _: DateRange,
    ) -> Result<Vec<MetricSeries>, ApiFailure> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

// ── State ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub state: SharedState,
    pub store: Arc<MemoryStore>,
}

pub fn harness(oauth: StaticOAuth, api: StaticApi) -> Harness {
    let config = config();
    let store = Arc::new(MemoryStore::new());
    let oauth: Arc<dyn OAuthProvider> = Arc::new(oauth);
    let crypto = Arc::new(CryptoEngine::new(&config.master_key, &config.hmac_secret).unwrap());

    let syncer = Syncer::new(
        store.clone(),
        oauth.clone(),
        Arc::new(api),
        Arc::new(RecordingSleeper::default()),
        config.sync.clone(),
    );

    let state = Arc::new(AppState {
        sessions: SessionVerifier::new(SESSION_SECRET, None),
        config,
        store: store.clone(),
        crypto,
        oauth,
        syncer,
    });

    Harness { state, store }
}

pub async fn link_google(store: &dyn Store, user_id: &str, access_token: &str) -> String {
    store
        .upsert_credential(&CredentialUpsert {
            user_id: user_id.into(),
            email: "owner@example.com".into(),
            google_account_id: "1029384756".into(),
            access_token: Some(access_token.into()),
            refresh_token: None,
            token_expires_at: None,
        })
        .await
        .unwrap()
}
