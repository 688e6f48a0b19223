//! Session service
//!
//! Business rules over the session repository: ownership-checked revocation,
//! refresh-path validation, bulk revocation, introspection, and the expired
//! sweep used by the reaper. The repository's single-row UPDATEs provide the
//! atomicity; this layer turns row counts into errors and keeps the store's
//! invariants in one place.

use crate::db::repositories::{SessionListFilter, SessionRepository};
use crate::models::Session;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Error types for session store operations
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    /// No matching session (or it belongs to someone else)
    #[error("Session not found")]
    NotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Session service managing the refresh-token session store
pub struct SessionService {
    session_repo: Arc<dyn SessionRepository>,
}

impl SessionService {
    /// Create a new session service
    pub fn new(session_repo: Arc<dyn SessionRepository>) -> Self {
        Self { session_repo }
    }

    /// Insert a new active session.
    ///
    /// A duplicate refresh token is surfaced as an internal integrity error;
    /// with real token entropy it cannot happen on the normal path.
    pub async fn create_session(
        &self,
        user_id: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<Session, SessionStoreError> {
        let session = Session::new(
            user_id.to_string(),
            refresh_token.to_string(),
            expires_at,
            user_agent,
            ip_address,
        );

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(created)
    }

    /// Look up the active session for a presented refresh token.
    ///
    /// A session row found past its expiry is revoked eagerly here, so a
    /// stale token is retired the moment it is presented rather than waiting
    /// for the reaper. Unknown, already-revoked, and expired tokens all
    /// collapse into `NotFound`.
    pub async fn validate_for_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Session, SessionStoreError> {
        let session = self
            .session_repo
            .find_by_refresh_token(refresh_token, true)
            .await
            .context("Failed to look up session")?
            .ok_or(SessionStoreError::NotFound)?;

        if session.is_expired() {
            self.session_repo
                .revoke_by_refresh_token(refresh_token)
                .await
                .context("Failed to revoke expired session")?;
            return Err(SessionStoreError::NotFound);
        }

        Ok(session)
    }

    /// Revoke a session by id, checking ownership.
    ///
    /// `NotFound` covers both "no such session" and "not yours": a caller
    /// guessing ids learns nothing.
    pub async fn revoke_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<(), SessionStoreError> {
        let revoked = self
            .session_repo
            .revoke(session_id, user_id)
            .await
            .context("Failed to revoke session")?;

        if !revoked {
            return Err(SessionStoreError::NotFound);
        }
        Ok(())
    }

    /// Revoke the session holding this refresh token (rotation retirement).
    ///
    /// Exactly one concurrent caller can succeed: the underlying UPDATE only
    /// matches an active row.
    pub async fn revoke_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<(), SessionStoreError> {
        let revoked = self
            .session_repo
            .revoke_by_refresh_token(refresh_token)
            .await
            .context("Failed to revoke session by token")?;

        if !revoked {
            return Err(SessionStoreError::NotFound);
        }
        Ok(())
    }

    /// Revoke all of a user's active sessions, optionally sparing one
    /// ("log out everywhere but here"). Returns the number revoked.
    pub async fn revoke_all_for_user(
        &self,
        user_id: &str,
        except_session_id: Option<&str>,
    ) -> Result<u64, SessionStoreError> {
        let count = self
            .session_repo
            .revoke_all_for_user(user_id, except_session_id)
            .await
            .context("Failed to revoke user sessions")?;
        Ok(count)
    }

    /// Find a session by id, scoped to its owner
    pub async fn find_owned(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Session, SessionStoreError> {
        let session = self
            .session_repo
            .find_by_id(session_id)
            .await
            .context("Failed to find session")?
            .filter(|s| s.user_id == user_id)
            .ok_or(SessionStoreError::NotFound)?;
        Ok(session)
    }

    /// Find a session by id without an ownership check (administrative path)
    pub async fn find_by_id(&self, session_id: &str) -> Result<Session, SessionStoreError> {
        self.session_repo
            .find_by_id(session_id)
            .await
            .context("Failed to find session")?
            .ok_or(SessionStoreError::NotFound)
    }

    /// A user's active sessions, newest first
    pub async fn list_active(&self, user_id: &str) -> Result<Vec<Session>, SessionStoreError> {
        let sessions = self
            .session_repo
            .list_active(user_id)
            .await
            .context("Failed to list sessions")?;
        Ok(sessions)
    }

    /// Count a user's active, unexpired sessions
    pub async fn count_active(&self, user_id: &str) -> Result<i64, SessionStoreError> {
        let count = self
            .session_repo
            .count_active(user_id)
            .await
            .context("Failed to count sessions")?;
        Ok(count)
    }

    /// Count active sessions across all users (reporting only)
    pub async fn count_active_total(&self) -> Result<i64, SessionStoreError> {
        let count = self
            .session_repo
            .count_active_total()
            .await
            .context("Failed to count sessions")?;
        Ok(count)
    }

    /// Paginated listing with filters; returns (total, page)
    pub async fn list_all(
        &self,
        filter: &SessionListFilter,
    ) -> Result<(i64, Vec<Session>), SessionStoreError> {
        let result = self
            .session_repo
            .list_all(filter)
            .await
            .context("Failed to list sessions")?;
        Ok(result)
    }

    /// Flip every expired active session to revoked; returns how many changed
    pub async fn sweep_expired(&self) -> Result<i64, SessionStoreError> {
        let count = self
            .session_repo
            .sweep_expired()
            .await
            .context("Failed to sweep expired sessions")?;
        Ok(count)
    }

    /// Physically delete sessions expired longer than `retention_days` ago.
    /// Logical expiry (the sweep) and physical deletion are decoupled so the
    /// revocation audit trail survives the retention window.
    pub async fn purge_expired(&self, retention_days: i64) -> Result<i64, SessionStoreError> {
        let cutoff = Utc::now() - Duration::days(retention_days.max(0));
        let count = self
            .session_repo
            .purge_expired(cutoff)
            .await
            .context("Failed to purge expired sessions")?;
        Ok(count)
    }
}
