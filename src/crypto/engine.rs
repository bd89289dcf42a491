use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Stored ciphertexts carry this prefix so a future key or format change can
/// tell old rows apart.
const SEALED_PREFIX: &str = "v1.";

/// OAuth state older than this is rejected.
pub const STATE_MAX_AGE_SECS: i64 = 600;
/// Tolerated clock skew for states stamped in the future.
pub const STATE_MAX_SKEW_SECS: i64 = 60;

/// Which Google token a ciphertext holds. Bound as associated data, so an
/// access-token ciphertext copied into the refresh column fails to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn aad(self) -> &'static [u8] {
        match self {
            TokenKind::Access => b"google:access_token",
            TokenKind::Refresh => b"google:refresh_token",
        }
    }
}

/// Seals Google tokens for the `google_accounts` table and signs the OAuth
/// `state` round-tripped through Google's consent screen.
pub struct CryptoEngine {
    cipher: Aes256Gcm,
    state_key: Vec<u8>,
}

impl CryptoEngine {
    /// Both keys are base64. The master key must decode to 32 bytes.
    pub fn new(master_key_b64: &str, hmac_secret_b64: &str) -> Result<Self, AppError> {
        let master_key = decode_key("MASTER_KEY", master_key_b64)?;
        if master_key.len() != 32 {
            return Err(AppError::Crypto(format!(
                "MASTER_KEY must be 32 bytes, got {}",
                master_key.len()
            )));
        }
        let state_key = decode_key("HMAC_SECRET", hmac_secret_b64)?;

        let cipher = Aes256Gcm::new_from_slice(&master_key)
            .map_err(|e| AppError::Crypto(format!("AES key rejected: {e}")))?;

        Ok(Self { cipher, state_key })
    }

    /// Seal a token as `v1.<base64(nonce || ciphertext)>`.
    pub fn seal_token(&self, kind: TokenKind, token: &str) -> Result<String, AppError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: token.as_bytes(),
                    aad: kind.aad(),
                },
            )
            .map_err(|e| AppError::Crypto(format!("sealing {kind:?} token failed: {e}")))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(format!("{SEALED_PREFIX}{}", STANDARD.encode(blob)))
    }

    pub fn open_token(&self, kind: TokenKind, sealed: &str) -> Result<String, AppError> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| AppError::Crypto(format!("{kind:?} token has unknown format")))?;
        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| AppError::Crypto(format!("{kind:?} token is not base64: {e}")))?;
        if blob.len() <= NONCE_LEN {
            return Err(AppError::Crypto(format!("{kind:?} token is truncated")));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: kind.aad(),
                },
            )
            .map_err(|_| AppError::Crypto(format!("{kind:?} token failed to open")))?;

        String::from_utf8(plain).map_err(|e| AppError::Crypto(format!("{kind:?} token: {e}")))
    }

    /// Build the OAuth `state` for `user_id`: `<payload>.<mac>`, both
    /// base64url, where the payload is `user_id:issued_at`.
    pub fn sign_oauth_state(&self, user_id: &str, now: i64) -> Result<String, AppError> {
        let payload = format!("{user_id}:{now}");
        let mac = self.state_mac(payload.as_bytes())?.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(mac)
        ))
    }

    /// Check the signature and the issue time, returning the user id.
    pub fn verify_oauth_state(&self, signed: &str, now: i64) -> Result<String, AppError> {
        let (payload_b64, mac_b64) = signed.split_once('.').ok_or(AppError::InvalidState)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::InvalidState)?;
        let mac = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|_| AppError::InvalidState)?;

        self.state_mac(&payload)?
            .verify_slice(&mac)
            .map_err(|_| AppError::InvalidState)?;

        let payload = String::from_utf8(payload).map_err(|_| AppError::InvalidState)?;
        // User ids may contain ':'; the timestamp is always last.
        let (user_id, issued_at) = payload.rsplit_once(':').ok_or(AppError::InvalidState)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| AppError::InvalidState)?;

        if user_id.is_empty()
            || now - issued_at > STATE_MAX_AGE_SECS
            || issued_at - now > STATE_MAX_SKEW_SECS
        {
            return Err(AppError::InvalidState);
        }
        Ok(user_id.to_string())
    }

    fn state_mac(&self, payload: &[u8]) -> Result<HmacSha256, AppError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.state_key)
            .map_err(|e| AppError::Crypto(format!("HMAC key rejected: {e}")))?;
        mac.update(payload);
        Ok(mac)
    }
}

fn decode_key(name: &str, value: &str) -> Result<Vec<u8>, AppError> {
    let key = STANDARD
        .decode(value)
        .map_err(|e| AppError::Crypto(format!("{name} is not valid base64: {e}")))?;
    if key.is_empty() {
        return Err(AppError::Crypto(format!("{name} must not be empty")));
    }
    Ok(key)
}
