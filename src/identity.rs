//! Identity claims carried in a compact token.
//!
//! Decoding only reads the payload segment. Signatures are never checked here;
//! enforcement belongs to the server (see the `axum-jwt` feature).

use crate::types::Role;
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

const PAYLOAD_CONFIG: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_PAYLOAD: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PAYLOAD_CONFIG);
const STANDARD_PAYLOAD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PAYLOAD_CONFIG);

/// Decoded token claims.
///
/// Each field is read on its own: a claim of an unexpected type becomes `None`
/// instead of failing the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "identifier", skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, deserialize_with = "identifier", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, deserialize_with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, deserialize_with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

impl Claims {
    /// Role claim, when present and non-empty.
    pub fn role(&self) -> Option<Role> {
        self.role
            .as_deref()
            .filter(|role| !role.is_empty())
            .map(|role| Role::from_string(role.to_string()))
    }

    /// `sub`, falling back to `user_id`.
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().or(self.user_id.as_deref())
    }

    /// Returns true when `exp` is set and not after `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

fn identifier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(seconds) => seconds.as_u64().or_else(|| {
            seconds
                .as_f64()
                .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
                .map(|seconds| seconds as u64)
        }),
        _ => None,
    })
}

/// Decodes the payload segment of `header.payload.signature`.
///
/// Any malformed input yields `None`, which callers treat as "no identity".
pub fn decode_token(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1).filter(|p| !p.is_empty())?;
    let bytes = URL_SAFE_PAYLOAD
        .decode(payload)
        .or_else(|_| STANDARD_PAYLOAD.decode(payload));
    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "token payload is not base64");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(claims) => Some(claims),
        Err(err) => {
            warn!(error = %err, "token payload is not a claims object");
            None
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = engine.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
