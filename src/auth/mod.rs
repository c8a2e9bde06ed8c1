//! Authentication Module
//! Mission: Accounts, bearer tokens and role-based access for the HTTP API

pub mod api;
pub mod context;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod service;
pub mod token;
pub mod user_store;
pub mod validation;

pub use api::AuthState;
pub use context::AuthContext;
pub use errors::AuthError;
pub use middleware::{admin_middleware, auth_middleware};
pub use service::AuthService;
pub use token::TokenIssuer;
pub use user_store::UserStore;
