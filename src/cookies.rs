//! Signed, expiring cookie values.
//!
//! Tokens look like `v1.<payload>.<signature>`: the payload is base64url JSON
//! holding the value and its absolute expiry, the signature is an HMAC-SHA256
//! over the encoded payload. Both the session cookie and the draft cookie use
//! this format.

use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;
const TOKEN_VERSION_V1: &str = "v1";
/// Longest token `sign` will produce and `verify` will accept. Browsers cap a
/// single cookie at about 4 KiB.
pub const MAX_TOKEN_LEN: usize = 4096;

pub const SESSION_COOKIE: &str = "__session";
pub const DRAFT_COOKIE: &str = "exercises";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Cookie secret cannot be used as an HMAC key")]
    InvalidKey,
    #[error("Token is malformed")]
    InvalidFormat,
    #[error("Unsupported token version '{0}'")]
    UnsupportedVersion(String),
    #[error("Token signature does not match")]
    InvalidSignature,
    #[error("Token payload is unreadable")]
    InvalidPayload,
    #[error("Token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("Token of {0} bytes exceeds the {MAX_TOKEN_LEN} byte limit")]
    TooLarge(usize),
    #[error("Token payload could not be encoded: {0}")]
    Encode(String),
    #[error("Cookie '{0}' is not a valid header value")]
    InvalidHeader(String),
}

#[derive(Serialize, Deserialize)]
struct SignedValue {
    value: String,
    expires_at: i64,
}

#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    /// # Errors
    /// Returns `TokenError::InvalidKey` if the HMAC rejects the secret.
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
        Ok(Self { mac })
    }

    fn signature(&self, payload_part: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload_part.as_bytes());
        mac
    }

    /// # Errors
    /// `TokenError::TooLarge` if the token would not fit in a cookie.
    pub fn sign(&self, value: &str, expires_at: DateTime<Utc>) -> Result<String, TokenError> {
        let payload = SignedValue {
            value: value.to_string(),
            expires_at: expires_at.timestamp(),
        };
        let payload_bytes =
            serde_json::to_vec(&payload).map_err(|e| TokenError::Encode(e.to_string()))?;
        let payload_part = URL_SAFE_NO_PAD.encode(payload_bytes);
        let sig = self.signature(&payload_part).finalize().into_bytes();
        let token = format!(
            "{}.{}.{}",
            TOKEN_VERSION_V1,
            payload_part,
            URL_SAFE_NO_PAD.encode(sig)
        );
        if token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::TooLarge(token.len()));
        }
        Ok(token)
    }

    /// Checks signature and expiry, returning the signed value.
    /// # Errors
    /// Any `TokenError` other than `InvalidKey`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::InvalidFormat);
        }
        let mut parts = token.split('.');
        let (Some(version), Some(payload_part), Some(sig_part), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::InvalidFormat);
        };
        if version != TOKEN_VERSION_V1 {
            return Err(TokenError::UnsupportedVersion(version.to_string()));
        }

        let sig = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| TokenError::InvalidFormat)?;
        self.signature(payload_part)
            .verify_slice(&sig)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| TokenError::InvalidPayload)?;
        let payload: SignedValue =
            serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::InvalidPayload)?;

        let expires_at =
            DateTime::from_timestamp(payload.expires_at, 0).ok_or(TokenError::InvalidPayload)?;
        if expires_at <= now {
            return Err(TokenError::Expired(expires_at));
        }
        Ok(payload.value)
    }
}

/// Reads a cookie from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Attributes shared by every cookie the app writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieOptions {
    pub secure: bool,
}

impl CookieOptions {
    /// Builds a `Set-Cookie` value. `max_age` of `None` gives a browser-session cookie.
    pub fn set_cookie(
        &self,
        name: &str,
        value: &str,
        max_age: Option<Duration>,
    ) -> Result<HeaderValue, TokenError> {
        let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
        if let Some(age) = max_age {
            cookie.push_str(&format!("; Max-Age={}", age.num_seconds().max(0)));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|_| TokenError::InvalidHeader(name.to_string()))
    }

    pub fn expire_cookie(&self, name: &str) -> Result<HeaderValue, TokenError> {
        self.set_cookie(name, "", Some(Duration::zero()))
    }
}
