//! Business logic services

pub mod auth;
pub mod password;
pub mod reaper;
pub mod session;
pub mod token;

pub use auth::{AuthError, AuthService, AuthSuccess};
pub use session::{SessionService, SessionStoreError};
pub use token::{TokenClaims, TokenError, TokenIssuer};
