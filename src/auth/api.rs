//! Authentication API Endpoints
//! Mission: Provide registration, login, self-service and user management endpoints

use crate::auth::{
    context::AuthContext,
    errors::AuthError,
    models::{
        AuthResponse, ChangePasswordRequest, DeleteAccountRequest, LoginRequest, RegisterRequest,
        UpdateProfileRequest,
    },
    service::{AuthService, AuthSession},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
}

impl AuthState {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }

    /// Run a service call on the blocking pool. Used for anything that hashes
    /// or verifies a password.
    async fn blocking<T, F>(&self, f: F) -> Result<T, AuthError>
    where
        F: FnOnce(&AuthService) -> Result<T, AuthError> + Send + 'static,
        T: Send + 'static,
    {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || f(service.as_ref()))
            .await
            .map_err(|e| AuthError::Internal(anyhow::Error::new(e).context("Auth task failed")))?
    }
}

fn session_response(message: &str, session: AuthSession) -> Json<AuthResponse> {
    Json(AuthResponse {
        message: message.to_string(),
        user: session.user,
        token: session.token,
        token_type: "Bearer",
    })
}

/// Register endpoint - POST /api/register
pub async fn register(
    State(state): State<AuthState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AuthError>,
) -> Result<impl IntoResponse, AuthError> {
    info!("📝 Registration attempt: {}", payload.email);

    let session = state
        .blocking(move |service| {
            service.register(
                &payload.name,
                &payload.email,
                &payload.password,
                payload.role_id,
            )
        })
        .await?;

    Ok((StatusCode::CREATED, session_response("User created", session)))
}

/// Login endpoint - POST /api/login
pub async fn login(
    State(state): State<AuthState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AuthError>,
) -> Result<Json<AuthResponse>, AuthError> {
    info!("🔐 Login attempt: {}", payload.email);

    let session = state
        .blocking(move |service| service.login(&payload.email, &payload.password))
        .await?;
    Ok(session_response("Login successful", session))
}

/// List roles - GET /api/roles
pub async fn list_roles(State(state): State<AuthState>) -> Result<Json<Value>, AuthError> {
    let roles = state.service.list_roles()?;
    Ok(Json(json!({ "roles": roles })))
}

/// Liveness probe - GET /api/ping
pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// Current user - GET /api/user
pub async fn current_user(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, AuthError> {
    let user = state.service.profile(&ctx)?;
    Ok(Json(json!({ "user": user })))
}

/// Revoke the presented token - POST /api/logout
pub async fn logout(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, AuthError> {
    state.service.logout(&ctx)?;
    Ok(Json(json!({ "message": "Logged out" })))
}

/// Revoke every token of the caller - POST /api/logout-all
pub async fn logout_all(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, AuthError> {
    let revoked = state.service.logout_all(&ctx)?;
    Ok(Json(json!({
        "message": "Logged out from all devices",
        "revoked_tokens": revoked,
    })))
}

/// Own profile - GET /api/profile
pub async fn profile(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, AuthError> {
    let user = state.service.profile(&ctx)?;
    Ok(Json(json!({ "data": user })))
}

/// Update own name/email - PUT /api/profile
pub async fn update_profile(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateProfileRequest>, AuthError>,
) -> Result<Json<Value>, AuthError> {
    let user = state
        .service
        .update_profile(&ctx, &payload.name, &payload.email)?;
    Ok(Json(json!({ "message": "Profile updated", "user": user })))
}

/// Change own password - PUT /api/change-password
pub async fn change_password(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    WithRejection(Json(payload), _): WithRejection<Json<ChangePasswordRequest>, AuthError>,
) -> Result<Json<Value>, AuthError> {
    state
        .blocking(move |service| {
            service.change_password(
                &ctx,
                &payload.current_password,
                &payload.password,
                &payload.password_confirmation,
            )
        })
        .await?;
    Ok(Json(json!({ "message": "Password updated successfully" })))
}

/// Delete own account - DELETE /api/account
pub async fn delete_account(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    WithRejection(Json(payload), _): WithRejection<Json<DeleteAccountRequest>, AuthError>,
) -> Result<Json<Value>, AuthError> {
    state
        .blocking(move |service| {
            service.delete_account(&ctx, &payload.password, &payload.confirmation)
        })
        .await?;
    Ok(Json(json!({ "message": "Account deleted successfully" })))
}

/// List all users - GET /api/users (Admin only)
pub async fn list_users(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, AuthError> {
    let users = state.service.list_users(&ctx)?;
    Ok(Json(json!({ "users": users })))
}

/// Delete user - DELETE /api/users/:id (Admin only)
pub async fn delete_user(
    State(state): State<AuthState>,
    Extension(ctx): Extension<AuthContext>,
    WithRejection(Path(user_id), _): WithRejection<Path<i64>, AuthError>,
) -> Result<Json<Value>, AuthError> {
    let name = state.service.delete_user(&ctx, user_id)?;
    Ok(Json(json!({
        "message": format!("User {} deleted successfully", name),
    })))
}
