//! JWT claim decoding.
//!
//! Tokens are decoded without signature verification: the access token is an
//! opaque bearer credential obtained over TLS, and the decoded claims only
//! drive expiry bookkeeping and advisory role lists.

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine as _};
use serde_json::Value;

// Issuers differ on whether segments carry `=` padding.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded header and body of a compact JWT.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub header: Value,
    pub body: Value,
    /// `exp` in seconds since the Unix epoch.
    pub exp: Option<i64>,
    /// `realm_access.roles`, empty when absent.
    pub roles: Vec<String>,
}

impl Claims {
    /// `exp`, or `MalformedToken` when the token carries none.
    pub fn require_exp(&self) -> Result<i64> {
        self.exp
            .ok_or_else(|| AuthError::MalformedToken("token has no exp claim".to_string()))
    }
}

/// Decode the first two segments of `token`.
pub fn decode(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let (header, body) = match (segments.next(), segments.next()) {
        (Some(header), Some(body)) => (header, body),
        _ => {
            return Err(AuthError::MalformedToken(
                "expected at least two dot-separated segments".to_string(),
            ))
        }
    };

    let header = decode_segment(header, "header")?;
    let body = decode_segment(body, "body")?;

    let exp = body.get("exp").and_then(|exp| {
        exp.as_i64()
            .or_else(|| exp.as_f64().map(|seconds| seconds as i64))
    });

    let roles = body
        .pointer("/realm_access/roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|role| role.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(Claims {
        header,
        body,
        exp,
        roles,
    })
}

fn decode_segment(segment: &str, name: &str) -> Result<Value> {
    let bytes = SEGMENT_ENGINE
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("{} is not base64url: {}", name, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("{} is not JSON: {}", name, e)))
}
