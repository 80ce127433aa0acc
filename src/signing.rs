//! HMAC-SHA256 signed URLs with expiration.
//!
//! A token is three query parameters: `oh` (the signature), `oe` (the expiry
//! as a hex unix timestamp), and `_t` (an opaque cache-busting token derived
//! from the path, not part of the signature). The signed payload is
//! `path|expiresAt` plus an optional binding value joined in at sign time;
//! with binding enabled, a token only validates against the same binding
//! value it was issued for (callers typically pass the requester address).
//!
//! Validation checks expiry before the signature so an expired-but-genuine
//! link is reported as [`SignatureError::Expired`], which a client can fix
//! by fetching a fresh link, and never as tampering. The signature check
//! itself is constant-time. There is no revocation: a leaked token stays
//! valid until it expires or the secret rotates.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    /// `oh` or `oe` absent from the request.
    #[error("missing signature parameters")]
    MissingParameters,
    /// Genuine token past its expiry; retry with a fresh link.
    #[error("signed URL has expired")]
    Expired,
    /// Signature mismatch or malformed expiry: treat as tampering.
    #[error("invalid signature")]
    Invalid,
}

/// Signed query parameters for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    /// Hex HMAC-SHA256 signature (`oh`).
    pub signature: String,
    /// Hex-encoded unix expiry timestamp (`oe`).
    pub expires_hex: String,
    /// Cache-busting token (`_t`), stable per path.
    pub cache_buster: String,
}

impl SignedToken {
    /// Render as a query string, `oh=..&oe=..&_t=..`.
    pub fn to_query(&self) -> String {
        format!(
            "oh={}&oe={}&_t={}",
            self.signature, self.expires_hex, self.cache_buster
        )
    }
}

/// Issues and validates signed tokens for storage paths.
pub struct SignedUrlAuthority {
    secret: String,
    default_expiration: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl SignedUrlAuthority {
    pub fn new(secret: impl Into<String>, default_expiration: u64) -> Self {
        Self {
            secret: secret.into(),
            default_expiration,
        }
    }

    /// Sign `path`, valid for `expires_in` seconds (config default when
    /// `None`). `binding` is an optional extra factor mixed into the
    /// signature; validation must present the same value.
    pub fn sign(&self, path: &str, expires_in: Option<u64>, binding: Option<&str>) -> SignedToken {
        let expires_at = unix_now() + expires_in.unwrap_or(self.default_expiration);
        SignedToken {
            signature: self.compute_signature(path, expires_at, binding),
            expires_hex: format!("{expires_at:x}"),
            cache_buster: cache_buster(path),
        }
    }

    /// Validate `oh`/`oe` against a path. Expiry is checked first, then the
    /// signature in constant time.
    pub fn validate(
        &self,
        path: &str,
        signature: &str,
        expires_hex: &str,
        binding: Option<&str>,
    ) -> Result<(), SignatureError> {
        let expires_at =
            u64::from_str_radix(expires_hex, 16).map_err(|_| SignatureError::Invalid)?;
        if unix_now() > expires_at {
            return Err(SignatureError::Expired);
        }

        let signature = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        let mut mac = self.mac(path, expires_at, binding);
        mac.verify_slice(&signature)
            .map_err(|_| SignatureError::Invalid)
    }

    fn mac(&self, path: &str, expires_at: u64, binding: Option<&str>) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        let payload = match binding {
            Some(binding) => format!("{path}|{expires_at}|{binding}"),
            None => format!("{path}|{expires_at}"),
        };
        mac.update(payload.as_bytes());
        mac
    }

    fn compute_signature(&self, path: &str, expires_at: u64, binding: Option<&str>) -> String {
        hex::encode(self.mac(path, expires_at, binding).finalize().into_bytes())
    }
}

/// Stable cache-busting token: the first 8 hex characters of the path hash.
pub fn cache_buster(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))[..8].to_string()
}

/// Extract `(oh, oe)` from a query string, e.g.
/// `oh=abc&oe=68b0&_t=12345678`. Both must be present.
pub fn parse_signed_query(query: &str) -> Result<(String, String), SignatureError> {
    let mut signature = None;
    let mut expires_hex = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("oh", v)) => signature = Some(v.to_string()),
            Some(("oe", v)) => expires_hex = Some(v.to_string()),
            _ => {}
        }
    }
    match (signature, expires_hex) {
        (Some(oh), Some(oe)) => Ok((oh, oe)),
        _ => Err(SignatureError::MissingParameters),
    }
}
