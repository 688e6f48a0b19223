//! Database layer
//!
//! SQLite persistence for the authentication core:
//! - connection pool creation (`pool`)
//! - embedded versioned migrations (`migrations`)
//! - trait-based repositories for users and sessions (`repositories`)

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool};
