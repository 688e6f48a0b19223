//! Data models
//!
//! This module contains the data structures used throughout the Atesta
//! authentication core:
//! - Database entities (User, Session)
//! - Enumerations used for authorization and account state

mod session;
mod user;

pub use session::Session;
pub use user::{User, UserPosition, UserStatus};
