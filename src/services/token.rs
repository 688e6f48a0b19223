//! Token issuer
//!
//! Signs and verifies the two JWT flavors used by the authentication core:
//! short-lived access tokens and longer-lived refresh tokens, each under its
//! own secret so possession of one kind never allows forging the other.
//!
//! At login the refresh token is signed first so the session row can be
//! keyed by it; the access token is signed after the row exists, carrying
//! the session id as its `sid` claim. An access token without `sid` is
//! valid but cannot be used to log out its session.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::User;

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// A signing secret is missing; fatal at startup, never retried
    #[error("Token signing secret is not configured")]
    MissingSecret,

    /// Signature mismatch, malformed token, or embedded expiry passed.
    /// Collapsed into one variant so callers cannot leak which check failed.
    #[error("Invalid or expired token")]
    Invalid,

    /// A configured token lifetime did not parse
    #[error(transparent)]
    Lifetime(#[from] crate::config::ConfigError),

    /// Signing itself failed
    #[error("Failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// Claims carried by both token flavors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Owning user id
    pub sub: String,
    /// User email
    pub email: String,
    /// Session id; present only on session-bound access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// Token id; present on refresh tokens so two refresh tokens signed for
    /// the same user within the same second still differ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued-at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Signs and verifies access/refresh token pairs.
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Build an issuer from configuration.
    ///
    /// Fails fast on an empty secret; there is no request-time fallback.
    pub fn from_config(jwt: &JwtConfig) -> Result<Self, TokenError> {
        if jwt.secret.trim().is_empty() || jwt.refresh_secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let access_ttl = jwt.access_token_ttl()?;
        let refresh_ttl = jwt.refresh_token_ttl()?;

        Ok(Self::new(
            jwt.secret.as_bytes(),
            jwt.refresh_secret.as_bytes(),
            access_ttl,
            refresh_ttl,
        ))
    }

    /// Build an issuer from raw secrets and lifetimes
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Configured refresh token lifetime (also the session lifetime)
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign an access token for a user, optionally bound to a session
    pub fn sign_access(&self, user: &User, session_id: Option<&str>) -> Result<String, TokenError> {
        let claims = self.claims(user, session_id, None, self.access_ttl);
        encode(&Header::default(), &claims, &self.access_encoding).map_err(TokenError::Signing)
    }

    /// Sign a refresh token for a user
    pub fn sign_refresh(&self, user: &User) -> Result<String, TokenError> {
        let claims = self.claims(
            user,
            None,
            Some(Uuid::new_v4().to_string()),
            self.refresh_ttl,
        );
        encode(&Header::default(), &claims, &self.refresh_encoding).map_err(TokenError::Signing)
    }

    /// Verify an access token's signature and expiry
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        Self::verify(token, &self.access_decoding)
    }

    /// Verify a refresh token's signature and expiry
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        Self::verify(token, &self.refresh_decoding)
    }

    fn verify(token: &str, key: &DecodingKey) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<TokenClaims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }

    fn claims(
        &self,
        user: &User,
        session_id: Option<&str>,
        jti: Option<String>,
        ttl: Duration,
    ) -> TokenClaims {
        let now = Utc::now();
        TokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            sid: session_id.map(String::from),
            jti,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserPosition;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            b"access-secret",
            b"refresh-secret",
            Duration::minutes(15),
            Duration::days(7),
        )
    }

    fn user() -> User {
        User::new(
            "Ana Souza".to_string(),
            "ana@example.com".to_string(),
            "12345678901".to_string(),
            "hash".to_string(),
            UserPosition::Doctor,
        )
    }

    #[test]
    fn test_from_config_rejects_missing_secret() {
        let jwt = JwtConfig {
            secret: String::new(),
            refresh_secret: "r".to_string(),
            access_token_expires_in: "15m".to_string(),
            refresh_token_expires_in: "7d".to_string(),
        };
        assert!(matches!(
            TokenIssuer::from_config(&jwt),
            Err(TokenError::MissingSecret)
        ));
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let user = user();

        let token = issuer.sign_access(&user, Some("sess-1")).unwrap();
        let claims = issuer.verify_access(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.sid.as_deref(), Some("sess-1"));
    }

    #[test]
    fn test_unbound_access_token_has_no_session() {
        let issuer = issuer();
        let token = issuer.sign_access(&user(), None).unwrap();
        let claims = issuer.verify_access(&token).unwrap();
        assert!(claims.sid.is_none());
    }

    #[test]
    fn test_secrets_are_not_interchangeable() {
        let issuer = issuer();
        let user = user();

        let access = issuer.sign_access(&user, None).unwrap();
        let refresh = issuer.sign_refresh(&user).unwrap();

        assert!(issuer.verify_refresh(&access).is_err());
        assert!(issuer.verify_access(&refresh).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = TokenIssuer::new(
            b"access-secret",
            b"refresh-secret",
            Duration::seconds(-10),
            Duration::seconds(-10),
        );
        let token = issuer.sign_access(&user(), None).unwrap();
        assert!(matches!(
            issuer.verify_access(&token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_refresh_tokens_are_unique_per_signing() {
        let issuer = issuer();
        let user = user();
        let a = issuer.sign_refresh(&user).unwrap();
        let b = issuer.sign_refresh(&user).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let issuer = issuer();
        let mut token = issuer.sign_access(&user(), None).unwrap();
        token.push('x');
        assert!(issuer.verify_access(&token).is_err());
    }
}
