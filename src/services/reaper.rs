//! Session reaper
//!
//! Background maintenance over the session store: a periodic sweep that
//! flips expired sessions to revoked (and purges rows past the retention
//! window), and a slower read-only report of active session counts. Both
//! loops only log failures and keep running; the reaper must never take the
//! server down.

use crate::config::ReaperConfig;
use crate::db::repositories::UserRepository;
use crate::services::session::SessionService;
use std::sync::Arc;
use std::time::Duration;

/// Run one sweep pass: revoke expired sessions, then delete the ones past
/// the retention window. Returns (revoked, purged).
pub async fn sweep_once(
    sessions: &SessionService,
    retention_days: i64,
) -> anyhow::Result<(i64, i64)> {
    let revoked = sessions.sweep_expired().await?;
    let purged = sessions.purge_expired(retention_days).await?;
    Ok((revoked, purged))
}

/// Spawn the periodic sweep task
pub fn spawn_sweeper(sessions: Arc<SessionService>, config: ReaperConfig) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
        // The first tick fires immediately, cleaning up anything that
        // expired while the server was down.
        loop {
            interval.tick().await;
            match sweep_once(&sessions, config.retention_days).await {
                Ok((0, 0)) => {
                    tracing::debug!("Session sweep found nothing to do");
                }
                Ok((revoked, purged)) => {
                    tracing::info!(revoked, purged, "Session sweep completed");
                }
                Err(err) => {
                    tracing::error!(error = %err, "Session sweep failed");
                }
            }
        }
    });
}

/// Gather the read-only report figures: (active sessions, total users)
pub async fn report_once(
    sessions: &SessionService,
    users: &dyn UserRepository,
) -> anyhow::Result<(i64, i64)> {
    let active = sessions.count_active_total().await?;
    let total_users = users.count().await?;
    Ok((active, total_users))
}

/// Spawn the read-only report task. It mutates nothing; it exists so
/// operators see session and user volume in the logs without querying the
/// store.
pub fn spawn_reporter(
    sessions: Arc<SessionService>,
    users: Arc<dyn UserRepository>,
    config: ReaperConfig,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.report_interval_secs));
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            match report_once(&sessions, users.as_ref()).await {
                Ok((active_sessions, users)) => {
                    tracing::info!(active_sessions, users, "Session report");
                }
                Err(err) => {
                    tracing::error!(error = %err, "Session report failed");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxSessionRepository;
    use crate::db::{create_test_pool, migrations};
    use chrono::{Duration as ChronoDuration, Utc};
    use sqlx::SqlitePool;
    use uuid::Uuid;

    async fn setup() -> (SqlitePool, Arc<SessionService>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let sessions = Arc::new(SessionService::new(SqlxSessionRepository::boxed(
            pool.clone(),
        )));
        (pool, sessions)
    }

    async fn seed_user(pool: &SqlitePool) {
        sqlx::query(
            "INSERT INTO users (id, full_name, email, cpf, password_hash) VALUES ('u1', 'U', 'u@example.com', '123', 'hash')",
        )
        .execute(pool)
        .await
        .expect("Failed to create test user");
    }

    async fn seed_session(sessions: &SessionService, expires_in_days: i64) {
        sessions
            .create_session(
                "u1",
                &Uuid::new_v4().to_string(),
                Utc::now() + ChronoDuration::days(expires_in_days),
                None,
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_once_revokes_expired_and_purges_old() {
        let (pool, sessions) = setup().await;
        seed_user(&pool).await;

        seed_session(&sessions, 7).await; // live
        seed_session(&sessions, -1).await; // expired, inside retention
        seed_session(&sessions, -45).await; // expired, past retention

        let (revoked, purged) = sweep_once(&sessions, 30).await.unwrap();
        assert_eq!(revoked, 2);
        assert_eq!(purged, 1);

        // Live session untouched, recently-expired row kept for the audit trail
        assert_eq!(sessions.count_active("u1").await.unwrap(), 1);

        let (again_revoked, again_purged) = sweep_once(&sessions, 30).await.unwrap();
        assert_eq!(again_revoked, 0);
        assert_eq!(again_purged, 0);
    }

    #[tokio::test]
    async fn test_report_once_counts_sessions_and_users() {
        let (pool, sessions) = setup().await;
        seed_user(&pool).await;

        seed_session(&sessions, 7).await;
        seed_session(&sessions, 7).await;

        let users = crate::db::repositories::SqlxUserRepository::boxed(pool.clone());
        let (active, total_users) = report_once(&sessions, users.as_ref()).await.unwrap();
        assert_eq!(active, 2);
        assert_eq!(total_users, 1);
    }

    #[tokio::test]
    async fn test_sweep_preserves_manually_revoked_timestamps() {
        let (pool, sessions) = setup().await;
        seed_user(&pool).await;

        let token = Uuid::new_v4().to_string();
        sessions
            .create_session("u1", &token, Utc::now() - ChronoDuration::hours(1), None, None)
            .await
            .unwrap();
        sessions.revoke_by_refresh_token(&token).await.unwrap();

        // Already-revoked rows are not counted again by the sweep
        let (revoked, _) = sweep_once(&sessions, 30).await.unwrap();
        assert_eq!(revoked, 0);
    }
}
