//! Time-limited signed download links.
//!
//! A link is `{public_url}/files/{key}?expires={unix}&signature={sig}`
//! where the signature is an HMAC-SHA256 over the key and expiry,
//! base64url-encoded. Verification recomputes the MAC (constant-time
//! comparison) and rejects expired timestamps.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing key was rejected")]
    InvalidKey,
}

/// Issues and verifies signed links for object keys.
#[derive(Clone)]
pub struct LinkSigner {
    secret: Vec<u8>,
    public_url: String,
    ttl_secs: i64,
}

impl LinkSigner {
    pub fn new(secret: &str, public_url: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            public_url: public_url.trim_end_matches('/').to_string(),
            ttl_secs,
        }
    }

    /// Issue a signed URL for `key`, valid for the configured window
    /// starting now.
    pub fn signed_url(&self, key: &str) -> Result<String, SignerError> {
        let expires = Utc::now().timestamp() + self.ttl_secs;
        let signature = self.signature_for(key, expires)?;
        Ok(format!(
            "{}/files/{}?expires={}&signature={}",
            self.public_url,
            urlencoding::encode(key),
            expires,
            signature
        ))
    }

    /// Check a presented signature against `key` and `expires`. Returns
    /// false for expired links, undecodable signatures, and MAC mismatches.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(presented) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(message(key, expires).as_bytes());
        mac.verify_slice(&presented).is_ok()
    }

    fn signature_for(&self, key: &str, expires: i64) -> Result<String, SignerError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| SignerError::InvalidKey)?;
        mac.update(message(key, expires).as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

fn message(key: &str, expires: i64) -> String {
    format!("{key}\n{expires}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> LinkSigner {
        LinkSigner::new("test-secret", "http://localhost:3000", 3600)
    }

    #[test]
    fn issued_links_verify() {
        let signer = signer();
        let expires = Utc::now().timestamp() + 3600;
        let signature = signer.signature_for("myapp.zip", expires).unwrap();
        assert!(signer.verify("myapp.zip", expires, &signature));
    }

    #[test]
    fn expired_links_are_rejected() {
        let signer = signer();
        let expires = Utc::now().timestamp() - 1;
        let signature = signer.signature_for("myapp.zip", expires).unwrap();
        assert!(!signer.verify("myapp.zip", expires, &signature));
    }

    #[test]
    fn tampered_key_or_expiry_is_rejected() {
        let signer = signer();
        let expires = Utc::now().timestamp() + 3600;
        let signature = signer.signature_for("myapp.zip", expires).unwrap();
        assert!(!signer.verify("other.zip", expires, &signature));
        assert!(!signer.verify("myapp.zip", expires + 60, &signature));
    }

    #[test]
    fn signatures_from_another_secret_are_rejected() {
        let signer = signer();
        let other = LinkSigner::new("other-secret", "http://localhost:3000", 3600);
        let expires = Utc::now().timestamp() + 3600;
        let signature = other.signature_for("myapp.zip", expires).unwrap();
        assert!(!signer.verify("myapp.zip", expires, &signature));
    }

    #[test]
    fn garbage_signatures_are_rejected() {
        let signer = signer();
        let expires = Utc::now().timestamp() + 3600;
        assert!(!signer.verify("myapp.zip", expires, "not base64 ???"));
    }

    #[test]
    fn signed_url_encodes_key_and_carries_query() {
        let url = signer().signed_url("my app.zip").unwrap();
        assert!(url.starts_with("http://localhost:3000/files/my%20app.zip?expires="));
        assert!(url.contains("&signature="));
    }
}
