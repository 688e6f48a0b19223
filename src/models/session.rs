//! Session model
//!
//! A session is the durable record binding one refresh token to one user.
//! It is created at login (or refresh rotation), revoked exactly once, and
//! unusable once its expiry passes regardless of the active flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session entity tracking an issued refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID (opaque, assigned at creation)
    pub id: String,
    /// Owning user ID
    pub user_id: String,
    /// The exact refresh token issued for this session (unique system-wide)
    #[serde(skip_serializing, default)]
    pub refresh_token: String,
    /// Absolute expiry; the session is unusable past this instant
    pub expires_at: DateTime<Utc>,
    /// Client User-Agent captured at creation
    pub user_agent: Option<String>,
    /// Client IP captured at creation
    pub ip_address: Option<String>,
    /// True from creation until revocation
    pub is_active: bool,
    /// Set exactly once, when the session is revoked
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new active session for a user.
    ///
    /// The refresh token must already be signed; it doubles as the unique
    /// lookup key for the refresh path.
    pub fn new(
        user_id: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            refresh_token,
            expires_at,
            user_agent,
            ip_address,
            is_active: true,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the session has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Check if the session may still be presented for refresh
    /// (active and not expired)
    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_expired()
    }

    /// Mark the session revoked. Idempotent: re-revoking keeps the
    /// original `revoked_at`.
    pub fn revoke(&mut self) {
        if self.is_active {
            let now = Utc::now();
            self.is_active = false;
            self.revoked_at = Some(now);
            self.updated_at = now;
        }
    }
}
