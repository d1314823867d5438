//! Bearer token verification.
//!
//! Tokens are self-contained: `qb_<owner-uuid>.<hmac>` where the HMAC-SHA256
//! tag is computed over the owner uuid with the server secret. Verification
//! needs no database round trip, and the tag check is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use quill_core::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "qb_";

/// Verifies and mints owner tokens against the server secret.
pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl TokenVerifier {
    /// Create a verifier; the secret must be non-empty.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(Error::Config(
                "QUILL_AUTH_SECRET must not be empty".to_string(),
            ));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| Error::Config("Invalid HMAC secret".to_string()))
    }

    /// Mint a token for an owner.
    pub fn mint(&self, owner_id: Uuid) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(owner_id.to_string().as_bytes());
        let tag = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{TOKEN_PREFIX}{owner_id}.{tag}"))
    }

    /// Verify a bearer token, returning the owner it authenticates.
    pub fn verify(&self, token: &str) -> Result<Uuid> {
        let rest = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| Error::Unauthorized("Malformed token".to_string()))?;
        let (owner_part, tag_part) = rest
            .split_once('.')
            .ok_or_else(|| Error::Unauthorized("Malformed token".to_string()))?;
        let owner_id = Uuid::parse_str(owner_part)
            .map_err(|_| Error::Unauthorized("Malformed token".to_string()))?;
        let tag = hex::decode(tag_part)
            .map_err(|_| Error::Unauthorized("Malformed token".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(owner_id.to_string().as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| Error::Unauthorized("Invalid token".to_string()))?;
        Ok(owner_id)
    }
}

/// Extract and verify the bearer token from an Authorization header value.
pub fn verify_bearer(verifier: &TokenVerifier, header: Option<&str>) -> Result<Uuid> {
    let header =
        header.ok_or_else(|| Error::Unauthorized("Missing Authorization header".to_string()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("Expected a bearer token".to_string()))?;
    verifier.verify(token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new("test-secret").unwrap()
    }

    #[test]
    fn test_mint_verify_round_trip() {
        let v = verifier();
        let owner = Uuid::new_v4();
        let token = v.mint(owner).unwrap();
        assert!(token.starts_with("qb_"));
        assert_eq!(v.verify(&token).unwrap(), owner);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let owner = Uuid::new_v4();
        let token = verifier().mint(owner).unwrap();
        let other = TokenVerifier::new("different-secret").unwrap();
        assert!(matches!(
            other.verify(&token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_tampered_owner_rejected() {
        let v = verifier();
        let token = v.mint(Uuid::new_v4()).unwrap();
        let tag = token.split_once('.').unwrap().1;
        let forged = format!("qb_{}.{}", Uuid::new_v4(), tag);
        assert!(v.verify(&forged).is_err());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let v = verifier();
        for bad in ["", "qb_", "qb_not-a-uuid.aa", "nope", "qb_missing-dot"] {
            assert!(v.verify(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(TokenVerifier::new("  ").is_err());
    }

    #[test]
    fn test_bearer_header_extraction() {
        let v = verifier();
        let owner = Uuid::new_v4();
        let token = v.mint(owner).unwrap();
        let header = format!("Bearer {token}");
        assert_eq!(verify_bearer(&v, Some(&header)).unwrap(), owner);
        assert!(verify_bearer(&v, None).is_err());
        assert!(verify_bearer(&v, Some(&token)).is_err());
    }
}
