//! Per-request authenticated identity

use crate::auth::{errors::AuthError, models::User};

/// The authenticated caller and the token it presented.
/// Inserted into request extensions by the auth middleware and handed
/// to every protected operation explicitly.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub token_id: i64,
}

impl AuthContext {
    pub fn new(user: User, token_id: i64) -> Self {
        Self { user, token_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    /// Capability check shared by every admin-gated operation
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}
