//! Atesta - session-backed authentication service
//!
//! This library provides the token lifecycle for the Atesta system: paired
//! access/refresh JWT issuance, a persistent session store with single-use
//! refresh rotation, background session reaping, and a typed HTTP client
//! with transparent refresh.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
