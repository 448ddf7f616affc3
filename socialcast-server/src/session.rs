//! Session resolution
//!
//! The gateway does not issue sessions; an upstream service does. What
//! arrives here is an HS256 bearer JWT, either in the `Authorization` header
//! or in the `session` cookie. The precedence is fixed: header first, cookie
//! second, nothing else. Platforms that embed identity
//! in the OAuth state never reach this resolver at callback time.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims the upstream issuer puts in a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct SessionResolver {
    secret: String,
}

impl SessionResolver {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// The authenticated user behind a request, if any.
    pub fn resolve(&self, headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
        let token = bearer_token(headers)
            .or_else(|| jar.get("session").map(|c| c.value().to_string()))?;

        match self.verify(&token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                tracing::debug!(error = %e, "session token rejected");
                None
            }
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
    }

    /// Mint a session token. Exists for local tooling and tests; production
    /// sessions come from the upstream issuer with the same secret.
    pub fn issue(
        &self,
        user_id: &str,
        ttl_secs: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            exp: now + ttl_secs,
            iat: now,
        };
        encode(
            &Header {
                alg: Algorithm::HS256,
                ..Default::default()
            },
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Cookie;

    fn resolver() -> SessionResolver {
        SessionResolver::new("session-test-secret")
    }

    #[test]
    fn test_bearer_header_resolves() {
        let resolver = resolver();
        let token = resolver.issue("user-1", 600).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());

        let user = resolver.resolve(&headers, &CookieJar::new());
        assert_eq!(user.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_cookie_resolves_when_header_absent() {
        let resolver = resolver();
        let token = resolver.issue("user-2", 600).unwrap();
        let jar = CookieJar::new().add(Cookie::new("session", token));

        let user = resolver.resolve(&HeaderMap::new(), &jar);
        assert_eq!(user.as_deref(), Some("user-2"));
    }

    #[test]
    fn test_header_wins_over_cookie() {
        let resolver = resolver();
        let header_token = resolver.issue("header-user", 600).unwrap();
        let cookie_token = resolver.issue("cookie-user", 600).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!("Bearer {header_token}").parse().unwrap(),
        );
        let jar = CookieJar::new().add(Cookie::new("session", cookie_token));

        let user = resolver.resolve(&headers, &jar);
        assert_eq!(user.as_deref(), Some("header-user"));
    }

    #[test]
    fn test_expired_or_forged_tokens_are_rejected() {
        let resolver = resolver();

        let expired = resolver.issue("user-1", -3600).unwrap();
        let jar = CookieJar::new().add(Cookie::new("session", expired));
        assert!(resolver.resolve(&HeaderMap::new(), &jar).is_none());

        let forged = SessionResolver::new("other-secret")
            .issue("user-1", 600)
            .unwrap();
        let jar = CookieJar::new().add(Cookie::new("session", forged));
        assert!(resolver.resolve(&HeaderMap::new(), &jar).is_none());
    }

    #[test]
    fn test_garbage_tokens_are_rejected() {
        let resolver = resolver();
        let jar = CookieJar::new().add(Cookie::new("session", "not-a-jwt"));
        assert!(resolver.resolve(&HeaderMap::new(), &jar).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(resolver.resolve(&headers, &CookieJar::new()).is_none());
    }
}
