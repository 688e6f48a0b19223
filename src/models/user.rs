//! User model
//!
//! This module defines the User entity consumed by the authentication core.
//! User CRUD itself lives outside this crate's interesting paths; the core
//! only needs credential lookup and the public profile returned by login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User entity representing a registered staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier
    pub id: String,
    /// Full display name
    pub full_name: String,
    /// Email address (unique, used as the login identifier)
    pub email: String,
    /// Brazilian CPF document number
    pub cpf: String,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Job position, also used for authorization
    pub position: UserPosition,
    /// Account status
    pub status: UserStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user.
    ///
    /// The password must already be hashed; use
    /// `services::password::hash_password()`.
    pub fn new(
        full_name: String,
        email: String,
        cpf: String,
        password_hash: String,
        position: UserPosition,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            full_name,
            email,
            cpf,
            password_hash,
            position,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user may administer other users' sessions
    pub fn is_admin(&self) -> bool {
        self.position == UserPosition::Admin
    }

    /// Check if the account is active (inactive accounts cannot log in)
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Job position, doubling as the authorization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserPosition {
    /// Administrator - may inspect any user's sessions
    Admin,
    /// Physician
    Doctor,
    /// Administrative assistant
    #[default]
    Assistant,
}

impl fmt::Display for UserPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserPosition::Admin => write!(f, "admin"),
            UserPosition::Doctor => write!(f, "doctor"),
            UserPosition::Assistant => write!(f, "assistant"),
        }
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Account may log in
    #[default]
    Active,
    /// Account is disabled
    Inactive,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for UserPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserPosition::Admin),
            "doctor" => Ok(UserPosition::Doctor),
            "assistant" => Ok(UserPosition::Assistant),
            other => Err(format!("Unknown user position: {}", other)),
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            other => Err(format!("Unknown user status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_active() {
        let user = User::new(
            "Ana Souza".to_string(),
            "ana@example.com".to_string(),
            "12345678901".to_string(),
            "$argon2id$hash".to_string(),
            UserPosition::Doctor,
        );
        assert!(user.is_active());
        assert!(!user.is_admin());
    }

    #[test]
    fn test_admin_check() {
        let mut user = User::new(
            "Root".to_string(),
            "root@example.com".to_string(),
            "00000000000".to_string(),
            "hash".to_string(),
            UserPosition::Admin,
        );
        assert!(user.is_admin());

        user.position = UserPosition::Assistant;
        assert!(!user.is_admin());
    }

    #[test]
    fn test_position_round_trip() {
        for position in [
            UserPosition::Admin,
            UserPosition::Doctor,
            UserPosition::Assistant,
        ] {
            let parsed: UserPosition = position.to_string().parse().unwrap();
            assert_eq!(parsed, position);
        }
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new(
            "Ana".to_string(),
            "ana@example.com".to_string(),
            "12345678901".to_string(),
            "super-secret-hash".to_string(),
            UserPosition::Doctor,
        );
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("super-secret-hash"));
    }
}
