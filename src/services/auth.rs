//! Authentication service
//!
//! Credential verification, login (token pair issuance plus session
//! persistence), refresh rotation, and logout. Refresh tokens are single-use:
//! a successful refresh retires the presented session and creates a new one,
//! and the retirement is the atomic step that decides races between
//! concurrent refreshers.

use crate::db::repositories::UserRepository;
use crate::models::User;
use crate::services::password;
use crate::services::session::{SessionService, SessionStoreError};
use crate::services::token::{TokenError, TokenIssuer};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for authentication operations
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong email or password, or the account is inactive
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The refresh token is unknown, revoked, expired, or forged
    #[error("Invalid or expired refresh token")]
    InvalidToken,

    /// No matching session for a logout request
    #[error("Session not found")]
    SessionNotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionStoreError> for AuthError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::NotFound => AuthError::InvalidToken,
            SessionStoreError::Internal(e) => AuthError::Internal(e),
        }
    }
}

/// A successful login or refresh: the new token pair and its owner
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Authentication service
pub struct AuthService {
    user_repo: Arc<dyn UserRepository>,
    sessions: Arc<SessionService>,
    issuer: Arc<TokenIssuer>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        sessions: Arc<SessionService>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            user_repo,
            sessions,
            issuer,
        }
    }

    /// Verify an email/password pair.
    ///
    /// Unknown email, wrong password, and an inactive account all produce the
    /// same `InvalidCredentials` so the response never reveals which check
    /// failed.
    pub async fn validate_user(&self, email: &str, pass: &str) -> Result<User, AuthError> {
        let user = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to look up user")?
            .ok_or(AuthError::InvalidCredentials)?;

        let valid = password::verify_password(pass, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active() {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Issue a token pair for an already-verified user and persist the
    /// backing session.
    ///
    /// The refresh token is minted first so the session row can be keyed by
    /// it; the access token is signed last, carrying the new session id in
    /// its `sid` claim. The session's lifetime equals the refresh token's.
    pub async fn login(
        &self,
        user: &User,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<AuthSuccess, AuthError> {
        let refresh_token = self
            .issuer
            .sign_refresh(user)
            .context("Failed to sign refresh token")?;
        let expires_at = Utc::now() + self.issuer.refresh_ttl();

        let session = self
            .sessions
            .create_session(&user.id, &refresh_token, expires_at, user_agent, ip_address)
            .await?;

        let access_token = self
            .issuer
            .sign_access(user, Some(&session.id))
            .context("Failed to sign access token")?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "User logged in");

        Ok(AuthSuccess {
            access_token,
            refresh_token,
            user: user.clone(),
        })
    }

    /// Verify credentials and log in
    pub async fn login_with_credentials(
        &self,
        email: &str,
        pass: &str,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<AuthSuccess, AuthError> {
        let user = self.validate_user(email, pass).await?;
        self.login(&user, user_agent, ip_address).await
    }

    /// Rotate a refresh token: retire the presented session and issue a
    /// fresh pair.
    ///
    /// Order matters. The session lookup and signature check only filter out
    /// garbage; the revocation is what actually consumes the token, and only
    /// the caller whose revocation flips the row proceeds to issuance. A
    /// concurrent refresher losing that race gets `InvalidToken`, same as a
    /// replayed old token.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<AuthSuccess, AuthError> {
        let session = self.sessions.validate_for_refresh(refresh_token).await?;

        let claims = self
            .issuer
            .verify_refresh(refresh_token)
            .map_err(|err| match err {
                TokenError::Invalid => AuthError::InvalidToken,
                other => AuthError::Internal(other.into()),
            })?;

        // Defense in depth: the row and the signature must agree on the owner
        if claims.sub != session.user_id {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .user_repo
            .get_by_id(&claims.sub)
            .await
            .context("Failed to look up user")?
            .filter(|u| u.is_active())
            .ok_or(AuthError::InvalidToken)?;

        // The single-use step. Exactly one concurrent caller gets past this.
        self.sessions.revoke_by_refresh_token(refresh_token).await?;

        tracing::debug!(user_id = %user.id, old_session_id = %session.id, "Refresh token rotated");

        self.login(&user, user_agent, ip_address).await
    }

    /// Load the user behind a verified access token. Inactive accounts are
    /// treated as gone so a deactivation takes effect on the next request.
    pub async fn current_user(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up user")?
            .filter(|u| u.is_active());
        Ok(user)
    }

    /// Revoke one of the user's sessions (logout)
    pub async fn logout(&self, session_id: &str, user_id: &str) -> Result<(), AuthError> {
        self.sessions
            .revoke_session(session_id, user_id)
            .await
            .map_err(|err| match err {
                SessionStoreError::NotFound => AuthError::SessionNotFound,
                SessionStoreError::Internal(e) => AuthError::Internal(e),
            })?;
        tracing::info!(user_id = %user_id, session_id = %session_id, "User logged out");
        Ok(())
    }

    /// Revoke every session the user holds; returns the number revoked
    pub async fn logout_all(&self, user_id: &str) -> Result<u64, AuthError> {
        let count = self.sessions.revoke_all_for_user(user_id, None).await?;
        tracing::info!(user_id = %user_id, count, "All sessions revoked");
        Ok(count)
    }
}
