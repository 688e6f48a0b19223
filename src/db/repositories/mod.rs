//! Repository layer
//!
//! Trait-based data access for the authentication core. Services depend on
//! the traits (`Arc<dyn …>`) so tests and alternative backends can swap the
//! SQLx implementations out.

mod session;
mod user;

pub use session::{SessionListFilter, SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
