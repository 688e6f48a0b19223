//! Session repository
//!
//! Database operations for refresh-token sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite
//!
//! The repository is the single source of truth for whether a refresh token
//! may still be used: every state transition here is a single UPDATE, so the
//! active→revoked flip is atomic per row and doubles as the concurrency
//! control for rotation (two clients racing on one token: exactly one UPDATE
//! wins).

use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Filter and paging parameters for the administrative session listing
#[derive(Debug, Clone, Default)]
pub struct SessionListFilter {
    /// Restrict to one user
    pub user_id: Option<String>,
    /// Restrict by active flag
    pub is_active: Option<bool>,
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub page_size: u32,
}

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new active session.
    ///
    /// Fails if a session with the same refresh token already exists; given
    /// token entropy this indicates an integrity fault, not a normal path.
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Point lookup by refresh token value
    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
        active_only: bool,
    ) -> Result<Option<Session>>;

    /// Point lookup by session id
    async fn find_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Revoke an active session owned by the given user.
    ///
    /// Returns `false` when no active session with that id belongs to that
    /// user; the ownership predicate is part of the WHERE clause on purpose.
    async fn revoke(&self, session_id: &str, user_id: &str) -> Result<bool>;

    /// Revoke an active session keyed by its refresh token
    async fn revoke_by_refresh_token(&self, refresh_token: &str) -> Result<bool>;

    /// Revoke every active session of a user, optionally sparing one.
    /// Returns the number of sessions revoked.
    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        except_session_id: Option<&str>,
    ) -> Result<u64>;

    /// Count a user's active, unexpired sessions
    async fn count_active(&self, user_id: &str) -> Result<i64>;

    /// Count active, unexpired sessions across all users
    async fn count_active_total(&self) -> Result<i64>;

    /// List a user's active sessions, newest first
    async fn list_active(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Paginated listing with optional user/active filters.
    /// Returns the total matching count alongside the page.
    async fn list_all(&self, filter: &SessionListFilter) -> Result<(i64, Vec<Session>)>;

    /// Revoke every active session whose expiry has passed.
    /// Returns how many rows changed.
    async fn sweep_expired(&self) -> Result<i64>;

    /// Physically delete sessions that expired before `older_than`.
    ///
    /// Kept separate from `sweep_expired` so the revocation audit trail
    /// outlives logical expiry by the configured retention window.
    async fn purge_expired(&self, older_than: DateTime<Utc>) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: SqlitePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, user_id, refresh_token, expires_at, user_agent, ip_address,
                 is_active, revoked_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.refresh_token)
        .bind(session.expires_at)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.is_active)
        .bind(session.revoked_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to create session (duplicate refresh token?)")?;

        Ok(session.clone())
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
        active_only: bool,
    ) -> Result<Option<Session>> {
        let sql = if active_only {
            "SELECT * FROM sessions WHERE refresh_token = ? AND is_active = 1"
        } else {
            "SELECT * FROM sessions WHERE refresh_token = ?"
        };

        let row = sqlx::query(sql)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get session by refresh token")?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get session by id")?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn revoke(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = 0, revoked_at = ?, updated_at = ?
            WHERE id = ? AND user_id = ? AND is_active = 1
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to revoke session")?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_by_refresh_token(&self, refresh_token: &str) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = 0, revoked_at = ?, updated_at = ?
            WHERE refresh_token = ? AND is_active = 1
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(refresh_token)
        .execute(&self.pool)
        .await
        .context("Failed to revoke session by refresh token")?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        except_session_id: Option<&str>,
    ) -> Result<u64> {
        let now = Utc::now();
        let result = match except_session_id {
            Some(except) => {
                sqlx::query(
                    r#"
                    UPDATE sessions
                    SET is_active = 0, revoked_at = ?, updated_at = ?
                    WHERE user_id = ? AND is_active = 1 AND id != ?
                    "#,
                )
                .bind(now)
                .bind(now)
                .bind(user_id)
                .bind(except)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE sessions
                    SET is_active = 0, revoked_at = ?, updated_at = ?
                    WHERE user_id = ? AND is_active = 1
                    "#,
                )
                .bind(now)
                .bind(now)
                .bind(user_id)
                .execute(&self.pool)
                .await
            }
        }
        .context("Failed to revoke user sessions")?;

        Ok(result.rows_affected())
    }

    async fn count_active(&self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE user_id = ? AND is_active = 1 AND expires_at > ?",
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count active sessions")?;

        Ok(count)
    }

    async fn count_active_total(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE is_active = 1 AND expires_at > ?",
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count active sessions")?;

        Ok(count)
    }

    async fn list_active(&self, user_id: &str) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE user_id = ? AND is_active = 1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active sessions")?;

        rows.iter().map(row_to_session).collect()
    }

    async fn list_all(&self, filter: &SessionListFilter) -> Result<(i64, Vec<Session>)> {
        let mut conditions = Vec::new();
        if filter.user_id.is_some() {
            conditions.push("user_id = ?");
        }
        if filter.is_active.is_some() {
            conditions.push("is_active = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 100);
        // i64 arithmetic so a page near u32::MAX cannot overflow the offset
        let offset = (page as i64 - 1) * page_size as i64;

        let count_sql = format!("SELECT COUNT(*) FROM sessions{}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(ref user_id) = filter.user_id {
            count_query = count_query.bind(user_id.clone());
        }
        if let Some(is_active) = filter.is_active {
            count_query = count_query.bind(is_active);
        }
        let count = count_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count sessions")?;

        let list_sql = format!(
            "SELECT * FROM sessions{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(ref user_id) = filter.user_id {
            list_query = list_query.bind(user_id.clone());
        }
        if let Some(is_active) = filter.is_active {
            list_query = list_query.bind(is_active);
        }
        let rows = list_query
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list sessions")?;

        let sessions = rows.iter().map(row_to_session).collect::<Result<Vec<_>>>()?;
        Ok((count, sessions))
    }

    async fn sweep_expired(&self) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = 0, revoked_at = ?, updated_at = ?
            WHERE expires_at < ? AND is_active = 1
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to sweep expired sessions")?;

        Ok(result.rows_affected() as i64)
    }

    async fn purge_expired(&self, older_than: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .context("Failed to purge expired sessions")?;

        Ok(result.rows_affected() as i64)
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        user_agent: row.get("user_agent"),
        ip_address: row.get("ip_address"),
        is_active: row.get("is_active"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;
    use uuid::Uuid;

    async fn setup_test_repo() -> (SqlitePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(pool: &SqlitePool, id: &str) {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, email, cpf, password_hash)
            VALUES (?, ?, ?, ?, 'hash')
            "#,
        )
        .bind(id)
        .bind(format!("User {}", id))
        .bind(format!("{}@example.com", id))
        .bind(Uuid::new_v4().to_string())
        .execute(pool)
        .await
        .expect("Failed to create test user");
    }

    fn test_session(user_id: &str, expires_in_days: i64) -> Session {
        Session::new(
            user_id.to_string(),
            Uuid::new_v4().to_string(),
            Utc::now() + Duration::days(expires_in_days),
            Some("TestAgent/1.0".to_string()),
            Some("10.0.0.1".to_string()),
        )
    }

    #[tokio::test]
    async fn test_create_and_find_by_refresh_token() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        let session = test_session("u1", 7);
        repo.create(&session).await.expect("Failed to create session");

        let found = repo
            .find_by_refresh_token(&session.refresh_token, true)
            .await
            .expect("Lookup failed")
            .expect("Session not found");

        assert_eq!(found.id, session.id);
        assert_eq!(found.user_id, "u1");
        assert!(found.is_active);
        assert_eq!(found.user_agent.as_deref(), Some("TestAgent/1.0"));
    }

    #[tokio::test]
    async fn test_create_duplicate_refresh_token_fails() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        let first = test_session("u1", 7);
        repo.create(&first).await.expect("Failed to create session");

        let mut duplicate = test_session("u1", 7);
        duplicate.refresh_token = first.refresh_token.clone();
        assert!(repo.create(&duplicate).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_requires_ownership() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "owner").await;
        create_test_user(&pool, "intruder").await;

        let session = test_session("owner", 7);
        repo.create(&session).await.expect("Failed to create session");

        // Wrong user cannot revoke, even with the right id
        assert!(!repo.revoke(&session.id, "intruder").await.unwrap());
        let still_active = repo.find_by_id(&session.id).await.unwrap().unwrap();
        assert!(still_active.is_active);

        // Owner can
        assert!(repo.revoke(&session.id, "owner").await.unwrap());
        let revoked = repo.find_by_id(&session.id).await.unwrap().unwrap();
        assert!(!revoked.is_active);
        assert!(revoked.revoked_at.is_some());

        // Second revoke is a no-op
        assert!(!repo.revoke(&session.id, "owner").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_by_refresh_token() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        let session = test_session("u1", 7);
        repo.create(&session).await.expect("Failed to create session");

        assert!(repo
            .revoke_by_refresh_token(&session.refresh_token)
            .await
            .unwrap());

        // Active-only lookup no longer sees it
        let found = repo
            .find_by_refresh_token(&session.refresh_token, true)
            .await
            .unwrap();
        assert!(found.is_none());

        // Unfiltered lookup still does, with the audit fields set
        let revoked = repo
            .find_by_refresh_token(&session.refresh_token, false)
            .await
            .unwrap()
            .unwrap();
        assert!(!revoked.is_active);
        assert!(revoked.revoked_at.is_some());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_with_exclusion() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;
        create_test_user(&pool, "u2").await;

        let keep = test_session("u1", 7);
        let drop1 = test_session("u1", 7);
        let drop2 = test_session("u1", 7);
        let other = test_session("u2", 7);
        for s in [&keep, &drop1, &drop2, &other] {
            repo.create(s).await.expect("Failed to create session");
        }

        let revoked = repo
            .revoke_all_for_user("u1", Some(&keep.id))
            .await
            .unwrap();
        assert_eq!(revoked, 2);

        assert!(repo.find_by_id(&keep.id).await.unwrap().unwrap().is_active);
        assert!(!repo.find_by_id(&drop1.id).await.unwrap().unwrap().is_active);
        assert!(!repo.find_by_id(&drop2.id).await.unwrap().unwrap().is_active);
        // Other user untouched
        assert!(repo.find_by_id(&other.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_without_exclusion() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        for _ in 0..3 {
            repo.create(&test_session("u1", 7)).await.unwrap();
        }

        let revoked = repo.revoke_all_for_user("u1", None).await.unwrap();
        assert_eq!(revoked, 3);
        assert_eq!(repo.count_active("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_active_excludes_expired() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        repo.create(&test_session("u1", 7)).await.unwrap();
        repo.create(&test_session("u1", -1)).await.unwrap(); // already expired

        assert_eq!(repo.count_active("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_all_filters_and_pages() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;
        create_test_user(&pool, "u2").await;

        for _ in 0..3 {
            repo.create(&test_session("u1", 7)).await.unwrap();
        }
        let revoked = test_session("u2", 7);
        repo.create(&revoked).await.unwrap();
        repo.revoke(&revoked.id, "u2").await.unwrap();

        let (count, page) = repo
            .list_all(&SessionListFilter {
                user_id: Some("u1".to_string()),
                is_active: Some(true),
                page: 1,
                page_size: 2,
            })
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(page.len(), 2);

        let (count, page) = repo
            .list_all(&SessionListFilter {
                user_id: None,
                is_active: Some(false),
                page: 1,
                page_size: 10,
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(page[0].id, revoked.id);
    }

    #[tokio::test]
    async fn test_list_all_handles_huge_page_numbers() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;
        repo.create(&test_session("u1", 7)).await.unwrap();

        let (count, page) = repo
            .list_all(&SessionListFilter {
                user_id: None,
                is_active: None,
                page: u32::MAX,
                page_size: 100,
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_expired_revokes_and_is_idempotent() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        let expired = test_session("u1", -1);
        let valid = test_session("u1", 7);
        repo.create(&expired).await.unwrap();
        repo.create(&valid).await.unwrap();

        let swept = repo.sweep_expired().await.unwrap();
        assert_eq!(swept, 1);

        let row = repo.find_by_id(&expired.id).await.unwrap().unwrap();
        assert!(!row.is_active);
        // revoked_at is the sweep time, not the original expiry
        assert!(row.revoked_at.unwrap() > row.expires_at);

        // Second sweep changes nothing
        assert_eq!(repo.sweep_expired().await.unwrap(), 0);
        assert!(repo.find_by_id(&valid.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_purge_expired_respects_retention() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        let old = test_session("u1", -40);
        let recent = test_session("u1", -1);
        let live = test_session("u1", 7);
        for s in [&old, &recent, &live] {
            repo.create(s).await.unwrap();
        }

        let purged = repo
            .purge_expired(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        assert!(repo.find_by_id(&old.id).await.unwrap().is_none());
        // Recently expired row survives for its audit trail
        assert!(repo.find_by_id(&recent.id).await.unwrap().is_some());
        assert!(repo.find_by_id(&live.id).await.unwrap().is_some());
    }
}
