//! Unverified access-token claims.
//!
//! Nothing here checks a signature. The decoded payload is a scheduling hint
//! for proactive refresh and nothing more; the backend is the only party that
//! decides whether a token is valid. Do not use these claims for any
//! authorization decision.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};

/// Payload fields of an access token, read WITHOUT signature verification.
#[derive(Debug, Clone, PartialEq)]
pub struct UnverifiedClaims {
    /// Expiry in seconds since the Unix epoch, when present and numeric.
    pub exp: Option<i64>,
    /// The full payload object. Opaque to the session core.
    pub fields: Map<String, Value>,
}

/// Decode the payload segment of a compact token without verifying it.
///
/// Returns `None` for anything that is not three dot-separated segments whose
/// middle segment is base64url-encoded UTF-8 JSON holding an object. Never
/// panics.
pub fn read_unverified_claims(token: &str) -> Option<UnverifiedClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let bytes = decode_segment(segments[1])?;
    let text = String::from_utf8(bytes).ok()?;
    let Value::Object(fields) = serde_json::from_str::<Value>(&text).ok()? else {
        return None;
    };

    let exp = fields.get("exp").and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    });

    Some(UnverifiedClaims { exp, fields })
}

/// base64url -> standard alphabet, padding restored.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let mut standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    match standard.len() % 4 {
        0 => {}
        2 => standard.push_str("=="),
        3 => standard.push('='),
        _ => return None,
    }
    STANDARD.decode(standard).ok()
}

/// Build an unsigned token around `payload`. Test-only.
#[cfg(test)]
pub(crate) fn unsigned_token(payload: &Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, body)
}

/// Unsigned token expiring `secs_from_now` seconds from the wall clock.
#[cfg(test)]
pub(crate) fn token_expiring_in(secs_from_now: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + secs_from_now;
    unsigned_token(&serde_json::json!({ "sub": "1", "exp": exp }))
}
