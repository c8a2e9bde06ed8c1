//! Authentication Middleware
//! Mission: Protect API endpoints with bearer token validation and role gates

use crate::auth::{context::AuthContext, errors::AuthError, service::AuthService};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;
use tracing::debug;

/// Auth middleware that resolves the bearer token into an `AuthContext`
pub async fn auth_middleware(
    State(service): State<Arc<AuthService>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::Unauthenticated)?;

    let ctx = service.authenticate(bearer.token())?;
    debug!(
        "Authenticated user {} via token {}",
        ctx.user_id(),
        ctx.token_id
    );

    // Handlers receive the caller explicitly through this extension
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

/// Admin gate - must run after `auth_middleware`
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, AuthError> {
    let ctx = extract_context(&req).ok_or(AuthError::Unauthenticated)?;
    ctx.require_admin()?;

    Ok(next.run(req).await)
}

/// Extract the caller from a request (use after auth middleware)
pub fn extract_context(req: &Request) -> Option<&AuthContext> {
    req.extensions().get::<AuthContext>()
}
