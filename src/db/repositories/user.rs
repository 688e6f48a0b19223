//! User repository
//!
//! Credential lookup for the authentication core. User administration lives
//! in a separate service; this crate only needs to find users by login
//! identifier or id, plus create for seeding and tests.

use crate::models::{User, UserPosition, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by email (the login identifier)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get user by ID
    async fn get_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Count all users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, full_name, email, cpf, password_hash, position, status,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.cpf)
        .bind(&user.password_hash)
        .bind(user.position.to_string())
        .bind(user.status.to_string())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to create user")?;

        Ok(user.clone())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by email")?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by id")?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        Ok(count)
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let position: String = row.get("position");
    let status: String = row.get("status");

    Ok(User {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        cpf: row.get("cpf"),
        password_hash: row.get("password_hash"),
        position: UserPosition::from_str(&position)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid user position in database")?,
        status: UserStatus::from_str(&status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid user status in database")?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
