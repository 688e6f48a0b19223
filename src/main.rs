//! Atesta - session-backed authentication service

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atesta::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxSessionRepository, SqlxUserRepository},
    },
    services::{auth::AuthService, reaper, session::SessionService, token::TokenIssuer},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atesta=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Atesta auth service...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.validate()?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create repositories and services
    let token_issuer = Arc::new(TokenIssuer::from_config(&config.jwt)?);
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_service = Arc::new(SessionService::new(SqlxSessionRepository::boxed(
        pool.clone(),
    )));
    let auth_service = Arc::new(AuthService::new(
        user_repo.clone(),
        session_service.clone(),
        token_issuer.clone(),
    ));

    // Start background maintenance
    reaper::spawn_sweeper(session_service.clone(), config.reaper.clone());
    reaper::spawn_reporter(session_service.clone(), user_repo, config.reaper.clone());
    tracing::info!(
        sweep_interval_secs = config.reaper.sweep_interval_secs,
        retention_days = config.reaper.retention_days,
        "Session reaper started"
    );

    // Build application state and router
    let state = AppState {
        pool,
        auth_service,
        session_service,
        token_issuer,
    };
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
