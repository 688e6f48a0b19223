//! API middleware
//!
//! Contains middleware for:
//! - Authentication (access token validation)
//! - Authorization (admin gating)
//!
//! Plus the shared application state and the JSON error envelope every
//! handler returns on failure.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::auth::{AuthError, AuthService};
use crate::services::session::{SessionService, SessionStoreError};
use crate::services::token::TokenIssuer;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub auth_service: Arc<AuthService>,
    pub session_service: Arc<SessionService>,
    pub token_issuer: Arc<TokenIssuer>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Session id carried in the access token's `sid` claim, when present
#[derive(Debug, Clone)]
pub struct CurrentSession(pub String);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid credentials"),
            AuthError::InvalidToken => ApiError::unauthorized("Invalid or expired refresh token"),
            AuthError::SessionNotFound => ApiError::not_found("Session not found"),
            AuthError::Internal(e) => {
                tracing::error!(error = %e, "Auth operation failed");
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<SessionStoreError> for ApiError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::NotFound => ApiError::not_found("Session not found"),
            SessionStoreError::Internal(e) => {
                tracing::error!(error = %e, "Session operation failed");
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<String> {
    let auth_header = request.headers().get(header::AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(|t| t.to_string())
}

/// Best-effort client address, preferring proxy headers
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// The request's User-Agent header, if any
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Authentication middleware
///
/// Verifies the bearer access token, loads the user it names, and stashes
/// both the user and the token's session id in request extensions. The
/// session row itself is not consulted; within the access token's short
/// lifetime the signature is the source of truth.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let claims = state
        .token_issuer
        .verify_access(&token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired access token"))?;

    let user = state
        .auth_service
        .current_user(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired access token"))?;

    if let Some(sid) = claims.sid {
        request.extensions_mut().insert(CurrentSession(sid));
    }
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(
            extract_bearer_token(&request),
            Some("test-token-123".to_string())
        );
    }

    #[test]
    fn test_extract_bearer_token_none() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_bearer_token(&request).is_none());
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Basic invalid")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&request).is_none());
    }

    #[test]
    fn test_extract_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .uri("/test")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_ip_address(request.headers()),
            Some("203.0.113.7".to_string())
        );
    }

    #[test]
    fn test_extract_ip_falls_back_to_real_ip() {
        let request = Request::builder()
            .uri("/test")
            .header("x-real-ip", "198.51.100.4")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_ip_address(request.headers()),
            Some("198.51.100.4".to_string())
        );
    }

    #[test]
    fn test_api_error_unauthorized() {
        let error = ApiError::unauthorized("Test message");
        assert_eq!(error.error.code, "UNAUTHORIZED");
    }

    #[test]
    fn test_api_error_not_found() {
        let error = ApiError::not_found("Gone");
        assert_eq!(error.error.code, "NOT_FOUND");
    }
}
