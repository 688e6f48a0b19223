//! Typed HTTP client for the auth API
//!
//! Wraps `reqwest` with credential storage and transparent refresh: a
//! request that comes back 401 triggers one refresh and is retried once.
//! Concurrent 401s share a single refresh through [`RefreshGate`]; only one
//! request performs the rotation while the rest wait for its outcome. When
//! a refresh itself fails the credentials are cleared and a logout signal
//! is broadcast so the application can drop to its login screen.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, watch, RwLock};

use crate::api::auth::{AuthResponse, UserResponse};

/// Error types for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No stored credentials
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The refresh token was rejected; the session is over
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The server answered with an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// The stored token pair and the profile that owns it
#[derive(Debug, Clone)]
struct Credentials {
    access_token: String,
    refresh_token: String,
    user: UserResponse,
}

/// Outcome of a shared refresh, cloneable so every waiter gets a copy
type RefreshOutcome = Result<String, String>;

enum GateState {
    Idle,
    /// A refresh is in flight; queued continuations get its outcome
    Refreshing(Vec<oneshot::Sender<RefreshOutcome>>),
}

/// Single-flight gate around token refresh.
///
/// The first caller to find the gate idle becomes the leader and runs the
/// refresh; everyone arriving while it is in flight parks on a oneshot and
/// reuses the leader's outcome instead of issuing their own refresh.
struct RefreshGate {
    state: Mutex<GateState>,
}

impl RefreshGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
        }
    }

    /// Join the gate. `Leader` means the caller must perform the refresh
    /// and release the returned guard with the outcome.
    fn join(&self) -> GateTicket<'_> {
        let mut state = self.lock();
        match &mut *state {
            GateState::Idle => {
                *state = GateState::Refreshing(Vec::new());
                GateTicket::Leader(GateGuard {
                    gate: self,
                    released: false,
                })
            }
            GateState::Refreshing(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                GateTicket::Waiter(rx)
            }
        }
    }

    /// Publish the leader's outcome and reopen the gate
    fn release(&self, outcome: RefreshOutcome) {
        let mut state = self.lock();
        if let GateState::Refreshing(waiters) = std::mem::replace(&mut *state, GateState::Idle) {
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // The lock is never held across an await, so a poisoned guard still
        // holds a coherent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The leader's obligation to reopen the gate. If the leader's future is
/// dropped mid-refresh (a caller-side timeout, say), dropping the guard
/// publishes a failure instead of leaving the gate stuck in `Refreshing`
/// with every later caller parked forever.
struct GateGuard<'a> {
    gate: &'a RefreshGate,
    released: bool,
}

impl GateGuard<'_> {
    fn release(mut self, outcome: RefreshOutcome) {
        self.released = true;
        self.gate.release(outcome);
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.gate.release(Err("Refresh abandoned".to_string()));
        }
    }
}

enum GateTicket<'a> {
    Leader(GateGuard<'a>),
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Client for the auth API
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<RwLock<Option<Credentials>>>,
    gate: RefreshGate,
    logout_tx: watch::Sender<bool>,
}

impl ApiClient {
    /// Create a client against `base_url` (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Self {
        let (logout_tx, _) = watch::channel(false);
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            credentials: Arc::new(RwLock::new(None)),
            gate: RefreshGate::new(),
            logout_tx,
        }
    }

    /// Subscribe to the logged-out signal. It flips to `true` when a
    /// refresh fails or `logout` completes.
    pub fn logout_signal(&self) -> watch::Receiver<bool> {
        self.logout_tx.subscribe()
    }

    /// Whether credentials are currently stored
    pub async fn is_authenticated(&self) -> bool {
        self.credentials.read().await.is_some()
    }

    /// The logged-in user's profile as returned at login/refresh, if any
    pub async fn current_user(&self) -> Option<UserResponse> {
        self.credentials.read().await.as_ref().map(|c| c.user.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in and store the returned token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<UserResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/api/v1/auth/login"))
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .await?;

        let auth = Self::parse_auth(response).await?;
        *self.credentials.write().await = Some(Credentials {
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
            user: auth.user.clone(),
        });
        // send_replace updates the value even with no subscribers yet
        self.logout_tx.send_replace(false);
        Ok(auth.user)
    }

    /// Revoke the current session and clear credentials
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .send_authed::<Value>(Method::DELETE, "/api/v1/auth/logout", None)
            .await;
        self.clear_credentials().await;
        match result {
            Ok(_) => Ok(()),
            // Losing the race with a reaper or another device is still a logout
            Err(ClientError::Api { status: 404, .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Revoke every session of the user and clear credentials
    pub async fn logout_all(&self) -> Result<(), ClientError> {
        let result = self
            .send_authed::<Value>(Method::DELETE, "/api/v1/auth/logout-all", None)
            .await;
        self.clear_credentials().await;
        result.map(|_| ())
    }

    /// The caller's active sessions
    pub async fn my_sessions(&self) -> Result<Value, ClientError> {
        self.send_authed(Method::GET, "/api/v1/sessions/mine", None)
            .await
    }

    /// An authenticated GET returning JSON
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_authed(Method::GET, path, None).await
    }

    /// An authenticated request with a JSON body
    pub async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Api {
            status: 0,
            message: format!("Failed to serialize request body: {}", e),
        })?;
        self.send_authed(method, path, Some(body)).await
    }

    async fn clear_credentials(&self) {
        *self.credentials.write().await = None;
        self.logout_tx.send_replace(true);
    }

    /// Send an authenticated request, refreshing and retrying once on 401.
    ///
    /// The request is rebuilt for the retry rather than cloned, so bodies
    /// are serialized JSON values and always repeatable.
    async fn send_authed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        let access_token = self
            .credentials
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or(ClientError::NotAuthenticated)?;

        let response = self.execute(&method, path, body.as_ref(), &access_token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::parse_json(response).await;
        }

        let fresh_token = self.refreshed_access_token().await?;
        let response = self.execute(&method, path, body.as_ref(), &fresh_token).await?;
        Self::parse_json(response).await
    }

    async fn execute(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        access_token: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Obtain a fresh access token through the single-flight gate
    async fn refreshed_access_token(&self) -> Result<String, ClientError> {
        match self.gate.join() {
            GateTicket::Waiter(rx) => match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(message)) => Err(ClientError::SessionExpired(message)),
                Err(_) => Err(ClientError::SessionExpired("Refresh aborted".to_string())),
            },
            GateTicket::Leader(guard) => {
                let outcome = self.perform_refresh().await;
                match outcome {
                    Ok(token) => {
                        guard.release(Ok(token.clone()));
                        Ok(token)
                    }
                    Err(err) => {
                        self.clear_credentials().await;
                        guard.release(Err(err.to_string()));
                        Err(err)
                    }
                }
            }
        }
    }

    /// The leader's actual refresh call: rotate the stored pair
    async fn perform_refresh(&self) -> Result<String, ClientError> {
        let refresh_token = self
            .credentials
            .read()
            .await
            .as_ref()
            .map(|c| c.refresh_token.clone())
            .ok_or(ClientError::NotAuthenticated)?;

        let response = self
            .http
            .post(self.url("/api/v1/auth/refresh"))
            .json(&serde_json::json!({"refreshToken": refresh_token}))
            .send()
            .await?;

        let auth = Self::parse_auth(response).await.map_err(|err| match err {
            ClientError::Api { status, message } if status == 401 => {
                ClientError::SessionExpired(message)
            }
            other => other,
        })?;

        let access_token = auth.access_token.clone();
        *self.credentials.write().await = Some(Credentials {
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
            user: auth.user,
        });
        Ok(access_token)
    }

    async fn parse_auth(response: reqwest::Response) -> Result<AuthResponse, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::error_from(status, response).await)
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return serde_json::from_value(Value::Null).map_err(|e| ClientError::Api {
                status: status.as_u16(),
                message: format!("Unexpected empty response: {}", e),
            });
        }
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::error_from(status, response).await)
        }
    }

    async fn error_from(status: StatusCode, response: reqwest::Response) -> ClientError {
        let message = match response.json::<Value>().await {
            Ok(body) => body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown error")
                .to_string(),
            Err(_) => "Unknown error".to_string(),
        };
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::api::middleware::AppState;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserPosition, UserStatus};
    use crate::services::auth::AuthService;
    use crate::services::password;
    use crate::services::session::SessionService;
    use crate::services::token::TokenIssuer;
    use axum::extract::Request;
    use axum::middleware::Next;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestBackend {
        base_url: String,
        refresh_calls: Arc<AtomicUsize>,
        state: AppState,
    }

    /// Spin up the real server on an ephemeral port, counting refresh calls
    async fn start_backend() -> TestBackend {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let issuer = Arc::new(TokenIssuer::new(
            b"access-secret",
            b"refresh-secret",
            Duration::minutes(15),
            Duration::days(7),
        ));
        let session_service = Arc::new(SessionService::new(SqlxSessionRepository::boxed(
            pool.clone(),
        )));
        let auth_service = Arc::new(AuthService::new(
            SqlxUserRepository::boxed(pool.clone()),
            session_service.clone(),
            issuer.clone(),
        ));
        let state = AppState {
            pool,
            auth_service,
            session_service,
            token_issuer: issuer,
        };

        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let counter = refresh_calls.clone();
        let app = build_router(state.clone(), "http://localhost:5173")
            .unwrap()
            .layer(axum::middleware::from_fn(
                move |request: Request, next: Next| {
                    let counter = counter.clone();
                    async move {
                        if request.uri().path().ends_with("/auth/refresh") {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                        next.run(request).await
                    }
                },
            ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server failed");
        });

        TestBackend {
            base_url: format!("http://{}", addr),
            refresh_calls,
            state,
        }
    }

    async fn seed_user(state: &AppState, email: &str) -> User {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            full_name: "Ana Souza".to_string(),
            email: email.to_string(),
            cpf: uuid::Uuid::new_v4().to_string(),
            password_hash: password::hash_password("s3cret").unwrap(),
            position: UserPosition::Doctor,
            status: UserStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        SqlxUserRepository::new(state.pool.clone())
            .create(&user)
            .await
            .unwrap()
    }

    /// Replace the stored access token with garbage so the next request 401s
    async fn corrupt_access_token(client: &ApiClient) {
        let mut creds = client.credentials.write().await;
        if let Some(c) = creds.as_mut() {
            c.access_token = "not-a-jwt".to_string();
        }
    }

    #[tokio::test]
    async fn test_login_stores_credentials() {
        let backend = start_backend().await;
        seed_user(&backend.state, "ana@example.com").await;

        let client = ApiClient::new(backend.base_url.clone());
        assert!(!client.is_authenticated().await);

        let user = client.login("ana@example.com", "s3cret").await.unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert!(client.is_authenticated().await);
        assert_eq!(
            client.current_user().await.unwrap().email,
            "ana@example.com"
        );
    }

    #[tokio::test]
    async fn test_login_failure_is_api_error() {
        let backend = start_backend().await;
        seed_user(&backend.state, "ana@example.com").await;

        let client = ApiClient::new(backend.base_url.clone());
        let result = client.login("ana@example.com", "wrong").await;
        assert!(matches!(result, Err(ClientError::Api { status: 401, .. })));
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_request_without_credentials_fails_locally() {
        let backend = start_backend().await;
        let client = ApiClient::new(backend.base_url.clone());
        let result = client.my_sessions().await;
        assert!(matches!(result, Err(ClientError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_expired_access_token_is_refreshed_and_retried() {
        let backend = start_backend().await;
        seed_user(&backend.state, "ana@example.com").await;

        let client = ApiClient::new(backend.base_url.clone());
        client.login("ana@example.com", "s3cret").await.unwrap();
        corrupt_access_token(&client).await;

        let sessions = client.my_sessions().await.unwrap();
        assert!(sessions.as_array().is_some());
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_refresh() {
        let backend = start_backend().await;
        seed_user(&backend.state, "ana@example.com").await;

        let client = Arc::new(ApiClient::new(backend.base_url.clone()));
        client.login("ana@example.com", "s3cret").await.unwrap();
        corrupt_access_token(&client).await;

        let (a, b, c) = tokio::join!(
            client.my_sessions(),
            client.my_sessions(),
            client.my_sessions(),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        // All three hit a 401, but the rotation happened exactly once
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_refresh_reopens_the_gate() {
        let gate = RefreshGate::new();

        let leader = gate.join();
        assert!(matches!(leader, GateTicket::Leader(_)));
        let waiter = match gate.join() {
            GateTicket::Waiter(rx) => rx,
            GateTicket::Leader(_) => panic!("second caller must wait"),
        };

        // Dropping the leader without an outcome fails the waiter and
        // reopens the gate for the next caller
        drop(leader);
        assert!(matches!(waiter.await, Ok(Err(_))));
        assert!(matches!(gate.join(), GateTicket::Leader(_)));
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_credentials_and_signals_logout() {
        let backend = start_backend().await;
        seed_user(&backend.state, "ana@example.com").await;

        let client = ApiClient::new(backend.base_url.clone());
        client.login("ana@example.com", "s3cret").await.unwrap();
        let logout_signal = client.logout_signal();

        // Invalidate both tokens: the retry path has nowhere to go
        {
            let mut creds = client.credentials.write().await;
            if let Some(c) = creds.as_mut() {
                c.access_token = "not-a-jwt".to_string();
                c.refresh_token = "also-not-a-jwt".to_string();
            }
        }

        let result = client.my_sessions().await;
        assert!(matches!(result, Err(ClientError::SessionExpired(_))));
        assert!(!client.is_authenticated().await);
        assert!(*logout_signal.borrow());
    }

    #[tokio::test]
    async fn test_logout_clears_credentials() {
        let backend = start_backend().await;
        seed_user(&backend.state, "ana@example.com").await;

        let client = ApiClient::new(backend.base_url.clone());
        client.login("ana@example.com", "s3cret").await.unwrap();

        client.logout().await.unwrap();
        assert!(!client.is_authenticated().await);
        assert!(*client.logout_signal().borrow());

        // The server-side session is gone too
        let result = client.my_sessions().await;
        assert!(matches!(result, Err(ClientError::NotAuthenticated)));
    }
}
