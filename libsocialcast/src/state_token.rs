//! OAuth `state` and PKCE material.
//!
//! Two kinds of `state` value exist. The opaque kind is pure entropy and only
//! correlates a callback with its stored attempt. The signed kind additionally
//! carries the initiating user's identity for providers whose redirect cannot
//! rely on a surviving session cookie; it is an HS256 token over a random
//! nonce plus the minimal identity claim, verified before the claim is
//! trusted. Both kinds are stored and consumed single-use, so replay
//! protection is identical.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{OAuthError, Result};
use crate::types::SocialPlatform;

/// Opaque state value: 32 bytes of entropy, base64url without padding.
pub fn random_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = Self::challenge_of(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// The S256 challenge for an existing verifier. The authorization URL must
    /// embed the challenge derived from the verifier held for the attempt, not
    /// fresh material.
    pub fn challenge_of(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

/// Claims carried by an identity-bearing state token.
#[derive(Debug, Serialize, Deserialize)]
pub struct StateClaims {
    /// The initiating user.
    pub sub: String,
    pub platform: String,
    /// Random, so the token stays unguessable even for a known user.
    pub nonce: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issues and verifies identity-bearing state tokens.
#[derive(Clone)]
pub struct StateSigner {
    secret: String,
}

impl StateSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        platform: SocialPlatform,
        ttl_secs: i64,
    ) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let mut nonce_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let claims = StateClaims {
            sub: user_id.to_string(),
            platform: platform.as_str().to_string(),
            nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
            exp: now + ttl_secs,
            iat: now,
        };

        let header = Header {
            alg: Algorithm::HS256,
            ..Default::default()
        };

        encode(
            &header,
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| OAuthError::StateSigning(e.to_string()).into())
    }

    /// Verify signature and expiry; any failure reads as a bad state value.
    pub fn verify(&self, token: &str) -> Result<StateClaims> {
        decode::<StateClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| OAuthError::InvalidState.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_state_entropy() {
        let a = random_state();
        let b = random_state();
        assert_ne!(a, b);
        // 32 bytes base64url without padding is 43 characters.
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
    }

    #[test]
    fn test_pkce_challenge_matches_verifier() {
        let pair = PkcePair::generate();
        assert_eq!(pair.challenge, PkcePair::challenge_of(&pair.verifier));
        assert_ne!(pair.verifier, pair.challenge);
    }

    #[test]
    fn test_pkce_challenge_is_s256_base64url() {
        // Known vector from RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            PkcePair::challenge_of(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_state_signer_roundtrip() {
        let signer = StateSigner::new("test-secret");
        let token = signer
            .issue("user-42", SocialPlatform::Youtube, 600)
            .unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.platform, "youtube");
        assert!(!claims.nonce.is_empty());
    }

    #[test]
    fn test_state_signer_nonce_varies() {
        let signer = StateSigner::new("test-secret");
        let a = signer.issue("u", SocialPlatform::Youtube, 600).unwrap();
        let b = signer.issue("u", SocialPlatform::Youtube, 600).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_state_signer_rejects_tampering() {
        let signer = StateSigner::new("test-secret");
        let token = signer.issue("u", SocialPlatform::Youtube, 600).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        assert!(signer.verify(&tampered).is_err());

        let other = StateSigner::new("different-secret");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_state_signer_rejects_expired() {
        let signer = StateSigner::new("test-secret");
        // Far enough in the past to clear the default validation leeway.
        let token = signer.issue("u", SocialPlatform::Youtube, -3600).unwrap();
        assert!(signer.verify(&token).is_err());
    }
}
