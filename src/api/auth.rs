//! Authentication API endpoints
//!
//! Handles HTTP requests for the token lifecycle:
//! - POST /api/v1/auth/login - Credential login, returns a token pair
//! - POST /api/v1/auth/refresh - Rotate a refresh token
//! - DELETE /api/v1/auth/logout - Revoke the current session
//! - DELETE /api/v1/auth/logout-all - Revoke every session of the user

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    extract_ip_address, extract_user_agent, ApiError, AppState, AuthenticatedUser, CurrentSession,
};
use crate::models::User;
use crate::services::auth::AuthSuccess;

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for refresh
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response for successful authentication (also deserialized by the client)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

impl From<AuthSuccess> for AuthResponse {
    fn from(success: AuthSuccess) -> Self {
        Self {
            access_token: success.access_token,
            refresh_token: success.refresh_token,
            user: success.user.into(),
        }
    }
}

/// Response for user info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub position: String,
    pub status: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            position: user.position.to_string(),
            status: user.status.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", delete(logout))
        .route("/logout-all", delete(logout_all))
}

/// POST /api/v1/auth/login - Credential login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::validation_error("Email and password are required"));
    }

    let success = state
        .auth_service
        .login_with_credentials(
            &body.email,
            &body.password,
            extract_user_agent(&headers),
            extract_ip_address(&headers),
        )
        .await?;

    Ok(Json(success.into()))
}

/// POST /api/v1/auth/refresh - Rotate a refresh token
///
/// Each refresh token works exactly once; the response carries its
/// replacement.
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if body.refresh_token.trim().is_empty() {
        return Err(ApiError::validation_error("Refresh token is required"));
    }

    let success = state
        .auth_service
        .refresh(
            &body.refresh_token,
            extract_user_agent(&headers),
            extract_ip_address(&headers),
        )
        .await?;

    Ok(Json(success.into()))
}

/// DELETE /api/v1/auth/logout - Revoke the session named by the access
/// token's `sid` claim
async fn logout(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    session: Option<Extension<CurrentSession>>,
) -> Result<impl IntoResponse, ApiError> {
    let Extension(CurrentSession(sid)) =
        session.ok_or_else(|| ApiError::validation_error("Access token carries no session"))?;

    state.auth_service.logout(&sid, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/auth/logout-all - Revoke every session of the user
async fn logout_all(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service.logout_all(&user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
