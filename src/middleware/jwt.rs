//! HS256 JSON Web Token verification.
//!
//! Only `HS256` is accepted. The signature is checked in constant time
//! before the claims are trusted, and a numeric `exp` claim in the past
//! rejects the token.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Token claims as a JSON object.
pub type MapClaims = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("invalid token format")]
    InvalidFormat,

    #[error("invalid token header")]
    InvalidHeader,

    #[error("unsupported signing method")]
    UnsupportedAlgorithm,

    #[error("invalid token payload")]
    InvalidPayload,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,
}

/// Verify `token` against `secret` and return its claims.
pub fn parse_jwt(token: &str, secret: &[u8]) -> Result<MapClaims, JwtError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(JwtError::InvalidFormat);
    };

    let header_json = base64url_decode(header).map_err(|_| JwtError::InvalidHeader)?;
    let header_map: MapClaims =
        serde_json::from_slice(&header_json).map_err(|_| JwtError::InvalidHeader)?;
    if header_map.get("alg").and_then(|alg| alg.as_str()) != Some("HS256") {
        return Err(JwtError::UnsupportedAlgorithm);
    }

    let provided = base64url_decode(signature).map_err(|_| JwtError::InvalidSignature)?;
    let expected = hs256(secret, format!("{header}.{payload}").as_bytes())?;
    if !bool::from(provided.ct_eq(&expected)) {
        return Err(JwtError::InvalidSignature);
    }

    let payload_json = base64url_decode(payload).map_err(|_| JwtError::InvalidPayload)?;
    let claims: MapClaims =
        serde_json::from_slice(&payload_json).map_err(|_| JwtError::InvalidPayload)?;

    if let Some(exp) = claims.get("exp").and_then(|exp| exp.as_f64()) {
        if chrono::Utc::now().timestamp() > exp as i64 {
            return Err(JwtError::Expired);
        }
    }

    Ok(claims)
}

/// Issue an HS256 token for `claims`.
pub fn sign_hs256(claims: &MapClaims, secret: &[u8]) -> Result<String, JwtError> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload_json = serde_json::to_vec(claims).map_err(|_| JwtError::InvalidPayload)?;
    let payload = URL_SAFE_NO_PAD.encode(payload_json);
    let signature = hs256(secret, format!("{header}.{payload}").as_bytes())?;
    Ok(format!("{header}.{payload}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

fn hs256(secret: &[u8], data: &[u8]) -> Result<Vec<u8>, JwtError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| JwtError::InvalidSignature)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Base64url decode, tolerating missing padding.
fn base64url_decode(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let mut standard: String = segment
        .chars()
        .map(|ch| match ch {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }
    STANDARD.decode(standard)
}
