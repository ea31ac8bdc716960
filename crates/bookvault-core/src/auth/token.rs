//! Bearer credential decoding.
//!
//! Credentials are JWTs issued by the server. The client never verifies the
//! signature; it only reads the payload to decide whether the token is still
//! worth presenting. Anything that cannot be decoded is treated as expired.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of leading token characters shown in debug output.
const TOKEN_PREVIEW_CHARS: usize = 20;

/// Decoded credential payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch. NumericDate allows fractions.
    pub exp: f64,
    pub roles: Vec<String>,
    #[serde(default)]
    pub sub: String,
}

/// Decode the payload segment of a `header.payload.signature` token.
///
/// Returns `None` for anything malformed, including payloads missing `exp`
/// or `roles`.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| debug!(error = %e, "Credential payload is not base64url"))
        .ok()?;

    serde_json::from_slice(&bytes)
        .map_err(|e| debug!(error = %e, "Credential payload is not a claim set"))
        .ok()
}

/// Check a token against the current wall clock.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp())
}

/// Check a token against `now` (seconds). A token whose `exp` equals `now`
/// is already expired.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode(token) {
        Some(claims) => claims.is_expired_at(now),
        None => true,
    }
}

impl Claims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now as f64
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis((self.exp * 1000.0) as i64)
    }
}

/// Human-readable summary of a credential for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub preview: String,
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub subject: String,
    pub roles: Vec<String>,
}

pub fn token_info(token: &str, now: i64) -> Option<TokenInfo> {
    let claims = decode(token)?;
    Some(TokenInfo {
        preview: preview(token),
        expired: claims.is_expired_at(now),
        expires_at: claims.expires_at(),
        subject: claims.sub,
        roles: claims.roles,
    })
}

fn preview(token: &str) -> String {
    let head: String = token.chars().take(TOKEN_PREVIEW_CHARS).collect();
    format!("{}...", head)
}

/// An opaque bearer credential. Replaced wholesale, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn claims(&self) -> Option<Claims> {
        decode(&self.0)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        is_expired_at(&self.0, now)
    }

    pub fn info(&self, now: i64) -> Option<TokenInfo> {
        token_info(&self.0, now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&preview(&self.0)).finish()
    }
}

/// Build an unsigned token carrying the given payload.
#[cfg(test)]
pub(crate) fn unsigned_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

#[cfg(test)]
pub(crate) fn token_expiring_at(exp: i64, roles: &[&str]) -> String {
    unsigned_token(&serde_json::json!({
        "sub": "reader@example.com",
        "exp": exp,
        "roles": roles,
    }))
}
