use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use super::traits::{OAuthProvider, TokenInfo, TokenSet};
use crate::error::AppError;

/// Google OAuth 2.0 endpoints. Overridable so tests can point at a local mock.
#[derive(Debug, Clone)]
pub struct GoogleOAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub token_info_url: String,
}

impl Default for GoogleOAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            token_info_url: "https://www.googleapis.com/oauth2/v1/tokeninfo".into(),
        }
    }
}

/// Google OAuth 2.0 provider for Business Profile access.
///
/// Token lifetime: 1 hour.
/// Refresh: requires `access_type=offline` and `prompt=consent` at consent time.
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    endpoints: GoogleOAuthEndpoints,
    http: reqwest::Client,
}

// Raw token response from Google's token endpoint
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<u64>,
    scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

// Raw response from the v1 tokeninfo endpoint
#[derive(Debug, Deserialize)]
struct GoogleTokenInfoResponse {
    email: Option<String>,
    user_id: Option<String>,
    sub: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

impl GoogleProvider {
    pub fn new(client_id: String, client_secret: String, http: reqwest::Client) -> Self {
        Self::with_endpoints(client_id, client_secret, http, GoogleOAuthEndpoints::default())
    }

    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        http: reqwest::Client,
        endpoints: GoogleOAuthEndpoints,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            endpoints,
            http,
        }
    }

    async fn post_token_form(
        &self,
        form: &[(&str, &str)],
    ) -> Result<GoogleTokenResponse, String> {
        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("token endpoint returned {status}: {body}"));
        }

        resp.json()
            .await
            .map_err(|e| format!("failed to parse token response: {e}"))
    }
}

impl From<GoogleTokenResponse> for TokenSet {
    fn from(resp: GoogleTokenResponse) -> Self {
        TokenSet {
            access_token: resp.access_token,
            // Google doesn't always return a new refresh token on refresh
            refresh_token: resp.refresh_token,
            token_type: resp.token_type,
            expires_in: resp.expires_in,
            scope: resp.scope,
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn default_scopes(&self) -> Vec<String> {
        vec![
            "openid".into(),
            "email".into(),
            "profile".into(),
            "https://www.googleapis.com/auth/business.manage".into(),
        ]
    }

    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String {
        let scope_str = scopes.join(" ");
        format!(
            "{base}?\
             client_id={client_id}\
             &redirect_uri={redirect_uri}\
             &response_type=code\
             &scope={scope}\
             &state={state}\
             &access_type=offline\
             &prompt=consent",
            base = self.endpoints.authorize_url,
            client_id = urlencoding(&self.client_id),
            redirect_uri = urlencoding(redirect_uri),
            scope = urlencoding(&scope_str),
            state = urlencoding(state),
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, AppError> {
        self.post_token_form(&[
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
        .map(TokenSet::from)
        .map_err(|e| AppError::ProviderError(format!("Google code exchange failed: {e}")))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AppError> {
        self.post_token_form(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("grant_type", "refresh_token"),
        ])
        .await
        .map(TokenSet::from)
        .map_err(|e| AppError::ProviderError(format!("Google refresh failed: {e}")))
    }

    async fn token_info(&self, access_token: &str) -> Result<Option<TokenInfo>, AppError> {
        let resp = self
            .http
            .get(&self.endpoints.token_info_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| AppError::ProviderError(format!("tokeninfo request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::ProviderError(format!(
                "tokeninfo returned {status}"
            )));
        }

        let info: GoogleTokenInfoResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ProviderError(format!("failed to parse tokeninfo: {e}")))?;

        Ok(Some(TokenInfo {
            email: info.email,
            subject: info.sub.or(info.user_id),
            expires_in: info.expires_in,
            scope: info.scope,
        }))
    }

    fn token_ttl(&self) -> Duration {
        Duration::from_secs(3600) // Google tokens expire in 1 hour
    }
}

/// Simple percent-encoding for URL parameters.
fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
