//! Account Service Library
//!
//! Accounts, bearer tokens and role-based authorization over HTTP+JSON.
//! Exposes every module for the binary and the integration tests.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod routes;

pub use config::Config;
pub use routes::{create_router, AppServices};
