//! Auth Service
//! Mission: Validate, persist and respond for every account operation

use crate::auth::{
    context::AuthContext,
    errors::AuthError,
    models::{Role, RoleId, User, UserSummary},
    token::{TokenIssuer, DEFAULT_TOKEN_NAME},
    user_store::{is_constraint_violation, NewUser, UserStore},
    validation::FieldErrors,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Literal a user must type to delete their own account
pub const DELETE_CONFIRMATION: &str = "DELETE_MY_ACCOUNT";

/// User summary plus the plain-text token issued for it
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: UserSummary,
    pub token: String,
}

pub struct AuthService {
    users: Arc<UserStore>,
    tokens: Arc<TokenIssuer>,
}

impl AuthService {
    pub fn new(users: Arc<UserStore>, tokens: Arc<TokenIssuer>) -> Self {
        Self { users, tokens }
    }

    #[cfg(test)]
    fn users(&self) -> &Arc<UserStore> {
        &self.users
    }

    /// Create an account and issue its first token.
    /// `role_id` must name an existing role; new accounts always get the user role.
    pub fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role_id: Option<i64>,
    ) -> Result<AuthSession, AuthError> {
        let mut errors = FieldErrors::default();
        errors.required_string("name", name);
        if errors.email("email", email) && self.users.email_taken(email, None)? {
            errors.add("email", "The email has already been taken.");
        }
        errors.password("password", password);
        match role_id {
            None => errors.add("role_id", "The role id field is required."),
            Some(id) if !self.users.role_exists(id)? => {
                errors.add("role_id", "The selected role id is invalid.")
            }
            Some(_) => {}
        }
        errors.into_result()?;

        let user = self
            .users
            .create_user(NewUser {
                name,
                email,
                password,
                role_id: RoleId::USER,
            })
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    AuthError::invalid("email", "The email has already been taken.")
                } else {
                    AuthError::Internal(e.context("Failed to create user"))
                }
            })?;

        let token = self.tokens.issue(user.id, DEFAULT_TOKEN_NAME)?;
        info!("✅ Registered user {} ({})", user.id, user.email);

        Ok(AuthSession {
            user: UserSummary::from_user(&user),
            token: token.plain_text,
        })
    }

    /// Exchange credentials of an active account for a new token
    pub fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let mut errors = FieldErrors::default();
        errors.email("email", email);
        errors.password("password", password);
        errors.into_result()?;

        let Some(user) = self.users.verify_credentials(email, password)? else {
            warn!("❌ Failed login attempt: {}", email);
            return Err(AuthError::InvalidCredentials);
        };

        let token = self.tokens.issue(user.id, DEFAULT_TOKEN_NAME)?;
        info!("✅ Login successful: {} ({})", user.id, user.email);

        Ok(AuthSession {
            user: UserSummary::from_user(&user),
            token: token.plain_text,
        })
    }

    /// Revoke only the token that authenticated this request
    pub fn logout(&self, ctx: &AuthContext) -> Result<(), AuthError> {
        self.tokens.revoke(ctx.token_id)?;
        info!("👋 User {} logged out", ctx.user_id());
        Ok(())
    }

    /// Revoke every token of the current user
    pub fn logout_all(&self, ctx: &AuthContext) -> Result<usize, AuthError> {
        Ok(self.tokens.revoke_all(ctx.user_id())?)
    }

    /// Fresh copy of the caller's record
    pub fn profile(&self, ctx: &AuthContext) -> Result<User, AuthError> {
        self.users
            .get_user(ctx.user_id())?
            .ok_or(AuthError::Unauthenticated)
    }

    pub fn update_profile(
        &self,
        ctx: &AuthContext,
        name: &str,
        email: &str,
    ) -> Result<User, AuthError> {
        let mut errors = FieldErrors::default();
        errors.required_string("name", name);
        if errors.email("email", email) && self.users.email_taken(email, Some(ctx.user_id()))? {
            errors.add("email", "The email has already been taken.");
        }
        errors.into_result()?;

        self.users
            .update_profile(ctx.user_id(), name, email)
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    AuthError::invalid("email", "The email has already been taken.")
                } else {
                    AuthError::Internal(e)
                }
            })
    }

    /// Replace the password hash after checking the current password.
    /// A wrong current password fails even when the new one is invalid.
    pub fn change_password(
        &self,
        ctx: &AuthContext,
        current_password: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<(), AuthError> {
        let user = self.profile(ctx)?;
        if !self.users.check_password(&user, current_password)? {
            return Err(AuthError::invalid(
                "current_password",
                "The current password is incorrect.",
            ));
        }

        let mut errors = FieldErrors::default();
        if errors.password("password", password) && password != confirmation {
            errors.add("password", "The password field confirmation does not match.");
        }
        errors.into_result()?;

        self.users.update_password(user.id, password)?;
        info!("🔑 Password changed for user {}", user.id);
        Ok(())
    }

    /// Delete the caller's own account and all of its tokens
    pub fn delete_account(
        &self,
        ctx: &AuthContext,
        password: &str,
        confirmation: &str,
    ) -> Result<(), AuthError> {
        let mut errors = FieldErrors::default();
        errors.password("password", password);
        if confirmation != DELETE_CONFIRMATION {
            errors.add("confirmation", "The selected confirmation is invalid.");
        }
        errors.into_result()?;

        let user = self.profile(ctx)?;
        if !self.users.check_password(&user, password)? {
            return Err(AuthError::invalid("password", "The password is incorrect."));
        }

        self.users.delete_user(user.id)?;
        info!("🗑️  User {} deleted their account", user.id);
        Ok(())
    }

    /// Admin-only: delete another user. Returns the deleted user's name.
    pub fn delete_user(&self, ctx: &AuthContext, target_id: i64) -> Result<String, AuthError> {
        ctx.require_admin()?;

        let target = self
            .users
            .get_user(target_id)?
            .ok_or(AuthError::NotFound("User"))?;

        if target.id == ctx.user_id() {
            return Err(AuthError::invalid("id", "You cannot delete your own account."));
        }

        if !self.users.delete_user(target.id)? {
            return Err(AuthError::NotFound("User"));
        }

        info!(
            "🗑️  Admin {} deleted user {} ({})",
            ctx.user_id(),
            target.id,
            target.email
        );
        Ok(target.name)
    }

    /// Admin-only: every user
    pub fn list_users(&self, ctx: &AuthContext) -> Result<Vec<User>, AuthError> {
        ctx.require_admin()?;
        Ok(self.users.list_users()?)
    }

    pub fn list_roles(&self) -> Result<Vec<Role>, AuthError> {
        Ok(self.users.list_roles()?)
    }

    /// Resolve a bearer token into a request context
    pub fn authenticate(&self, bearer: &str) -> Result<AuthContext, AuthError> {
        match self.tokens.authenticate(bearer)? {
            Some((user, token)) if user.is_active() => Ok(AuthContext::new(user, token.id)),
            Some((user, _)) => {
                warn!("❌ Token used by inactive user {}", user.id);
                Err(AuthError::Unauthenticated)
            }
            None => Err(AuthError::Unauthenticated),
        }
    }
}
