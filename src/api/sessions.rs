//! Session management API endpoints
//!
//! Handles HTTP requests for session introspection and revocation:
//! - GET /api/v1/sessions - Paginated listing (admins see everyone)
//! - GET /api/v1/sessions/mine - The caller's active sessions
//! - GET /api/v1/sessions/count - The caller's active session count
//! - GET /api/v1/sessions/{id} - One session, owner or admin only
//! - DELETE /api/v1/sessions/{id} - Revoke one of the caller's sessions
//! - DELETE /api/v1/sessions/others - Revoke all but the current session
//!
//! Serialized sessions never include the refresh token.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, CurrentSession};
use crate::db::repositories::SessionListFilter;
use crate::models::Session;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Query parameters for the session listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub user_id: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Paginated session listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<Session>,
}

/// Response for the active session count
#[derive(Debug, Serialize)]
pub struct SessionCountResponse {
    pub count: i64,
}

/// Response for bulk revocation
#[derive(Debug, Serialize)]
pub struct RevokedCountResponse {
    pub revoked: u64,
}

/// Build the sessions router (all routes require auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/mine", get(list_my_sessions))
        .route("/count", get(count_my_sessions))
        .route("/others", delete(revoke_other_sessions))
        .route("/{id}", get(get_session).delete(revoke_session))
}

/// GET /api/v1/sessions - Paginated listing with filters
///
/// Admins may filter across all users; everyone else is pinned to their own
/// sessions regardless of the query.
async fn list_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let user_id = if user.is_admin() {
        query.user_id
    } else {
        Some(user.id)
    };

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let filter = SessionListFilter {
        user_id,
        is_active: query.is_active,
        page,
        page_size,
    };

    let (total, items) = state.session_service.list_all(&filter).await?;

    Ok(Json(SessionListResponse {
        total,
        page,
        page_size,
        items,
    }))
}

/// GET /api/v1/sessions/mine - The caller's active sessions, newest first
async fn list_my_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = state.session_service.list_active(&user.id).await?;
    Ok(Json(sessions))
}

/// GET /api/v1/sessions/count - The caller's active session count
async fn count_my_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Json<SessionCountResponse>, ApiError> {
    let count = state.session_service.count_active(&user.id).await?;
    Ok(Json(SessionCountResponse { count }))
}

/// GET /api/v1/sessions/{id} - One session
///
/// Admins can see any session; other users only their own, with a foreign
/// session indistinguishable from a missing one.
async fn get_session(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = if user.is_admin() {
        state.session_service.find_by_id(&id).await?
    } else {
        state.session_service.find_owned(&id, &user.id).await?
    };
    Ok(Json(session))
}

/// DELETE /api/v1/sessions/{id} - Revoke one of the caller's sessions
///
/// Responds 404 when the session does not exist or belongs to someone else.
async fn revoke_session(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.session_service.revoke_session(&id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/sessions/others - Revoke all sessions except the current
/// one ("log out everywhere else")
async fn revoke_other_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    session: Option<Extension<CurrentSession>>,
) -> Result<Json<RevokedCountResponse>, ApiError> {
    let except = session.as_ref().map(|Extension(CurrentSession(sid))| sid.as_str());
    let revoked = state
        .session_service
        .revoke_all_for_user(&user.id, except)
        .await?;
    Ok(Json(RevokedCountResponse { revoked }))
}
