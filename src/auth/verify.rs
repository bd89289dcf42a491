//! Session verification for dashboard requests.
//!
//! Sessions are HS256 JWTs issued by the hosted auth service. Every handler
//! that acts for a user verifies one and receives an [`AuthContext`].

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identity of the signed-in dashboard user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthContext {
    /// Auth-service user id (JWT `sub`).
    pub user_id: String,
    pub email: Option<String>,
    /// Google account subject from the identity provider, when present.
    pub provider_subject: Option<String>,
}

/// Claims the auth service puts in a session JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub sub: Option<String>,
}

#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthContext, AppError> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::InvalidSession("session expired".into()),
                ErrorKind::InvalidSignature => {
                    AppError::InvalidSession("signature mismatch".into())
                }
                _ => AppError::InvalidSession(e.to_string()),
            }
        })?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(AppError::InvalidSession("missing subject".into()));
        }

        Ok(AuthContext {
            user_id: claims.sub,
            email: claims.email.filter(|e| !e.is_empty()),
            provider_subject: claims.user_metadata.sub.filter(|s| !s.is_empty()),
        })
    }

    /// Verify the bearer token in `Authorization`.
    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<AuthContext, AppError> {
        self.verify(bearer_token(headers)?)
    }
}

/// The token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AppError::MissingAuthorization)?
        .to_str()
        .map_err(|_| AppError::InvalidSession("authorization header is not ASCII".into()))?;

    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::MissingAuthorization)
}
