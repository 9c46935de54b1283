//! Signed session tokens
//!
//! Compact `header.payload.signature` tokens: each segment is base64url
//! without padding, the payload carries `sub`, `iat` and `exp` as Unix
//! seconds, and the signature is HMAC-SHA256 over `header.payload`.
//!
//! A deployment has exactly one static key. There is no rotation and no
//! multi-key verification window.

use crate::auth::timing::constant_time_str_compare;
use crate::auth::Principal;
use crate::clock::{Clock, SystemClock};
use crate::{CoreError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Keys shorter than 256 bits are refused.
pub const MIN_KEY_LEN: usize = 32;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token expired")]
    Expired,
}

/// Symmetric signing key, keyed once at process start.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_KEY_LEN {
            return Err(CoreError::InvalidSigningKey(format!(
                "key is {} bytes, at least {} required",
                bytes.len(),
                MIN_KEY_LEN
            )));
        }

        let mac = HmacSha256::new_from_slice(bytes)
            .map_err(|e| CoreError::InvalidSigningKey(e.to_string()))?;

        Ok(SigningKey { mac })
    }

    fn sign(&self, input: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(input);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Verified token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Issues and verifies session tokens.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    key: SigningKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(key: SigningKey, ttl: Duration) -> Self {
        Self::with_clock(key, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(key: SigningKey, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        TokenCodec { key, ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `principal` at the codec's current time.
    pub fn generate(&self, principal: &Principal) -> Result<String> {
        self.generate_at(principal, self.clock.now_secs())
    }

    /// Issue a token as of `now`. Identical inputs give identical tokens.
    pub fn generate_at(&self, principal: &Principal, now: u64) -> Result<String> {
        let claims = Claims {
            sub: principal.subject_id().to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl.as_secs()),
        };
        self.encode(&claims)
    }

    /// Verify `token` at the codec's current time.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, TokenError> {
        self.verify_at(token, self.clock.now_secs())
    }

    /// Verify `token` as of `now`.
    ///
    /// The signature is checked over the raw segment text before anything is
    /// decoded, and expiry only once the signature has passed.
    pub fn verify_at(&self, token: &str, now: u64) -> std::result::Result<Claims, TokenError> {
        let (signing_input, signature) = split_token(token)?;

        let expected = self.key.sign(signing_input.as_bytes());
        if !constant_time_str_compare(&expected, signature) {
            return Err(TokenError::BadSignature);
        }

        let (header_b64, payload_b64) = signing_input
            .split_once('.')
            .ok_or(TokenError::Malformed)?;

        let header: Header = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let claims: Claims = decode_segment(payload_b64)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

        let signing_input = format!("{}.{}", header_b64, payload_b64);
        let signature = self.key.sign(signing_input.as_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }
}

/// Split into (`header.payload`, `signature`), requiring exactly three
/// non-empty segments.
fn split_token(token: &str) -> std::result::Result<(&str, &str), TokenError> {
    let (signing_input, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
    let (header, payload) = signing_input.split_once('.').ok_or(TokenError::Malformed)?;

    if header.is_empty() || payload.is_empty() || signature.is_empty() || payload.contains('.') {
        return Err(TokenError::Malformed);
    }

    Ok((signing_input, signature))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> std::result::Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
