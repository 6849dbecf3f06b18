//! Claim extraction for the JWTs a vault node hands out.
//!
//! Signatures are not checked here: the challenge is verified by the
//! identity signer and the access token is opaque to the node's clients.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::api::VaultError;

#[derive(Debug, Clone)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Decode the payload segment of a compact JWT.
    pub fn decode(jwt: &str) -> Result<Self, VaultError> {
        let mut segments = jwt.trim().split('.');
        let payload = match (segments.next(), segments.next()) {
            (Some(header), Some(payload)) if !header.is_empty() && !payload.is_empty() => payload,
            _ => return Err(VaultError::Protocol("JWT is not in compact form".to_string())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| VaultError::Protocol(format!("JWT payload is not base64url: {}", e)))?;

        match serde_json::from_slice(&bytes) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(VaultError::Protocol("JWT payload is not a JSON object".to_string())),
            Err(e) => Err(VaultError::Protocol(format!("JWT payload is not JSON: {}", e))),
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Like [`get_str`](Self::get_str) but a missing claim is a protocol error.
    pub fn require_str(&self, name: &str) -> Result<String, VaultError> {
        self.get_str(name)
            .map(str::to_string)
            .ok_or_else(|| VaultError::Protocol(format!("JWT is missing the {} claim", name)))
    }

    /// `aud` may be a single string or an array; the first entry counts.
    pub fn audience(&self) -> Option<&str> {
        match self.0.get("aud")? {
            Value::String(aud) => Some(aud),
            Value::Array(auds) => auds.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// `exp` in seconds since the epoch.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        let exp = self.0.get("exp")?;
        let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.", header, payload)
}
