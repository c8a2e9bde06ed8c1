//! HTTP router assembly

use crate::{
    auth::{
        admin_middleware, api as auth_api, auth_middleware, AuthService, AuthState, TokenIssuer,
        UserStore,
    },
    config::Config,
    middleware::{rate_limit_middleware, request_logging, RateLimitConfig, RateLimitLayer},
};
use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Everything the router needs, built once at startup
#[derive(Clone)]
pub struct AppServices {
    pub auth: AuthState,
    pub limiter: RateLimitLayer,
}

impl AppServices {
    pub fn new(user_store: Arc<UserStore>, rate_limit: RateLimitConfig) -> Self {
        let tokens = Arc::new(TokenIssuer::new(user_store.clone()));
        let service = Arc::new(AuthService::new(user_store, tokens));
        Self {
            auth: AuthState::new(service),
            limiter: RateLimitLayer::new(rate_limit),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let db_path = config.resolved_db_path()?;

        let user_store = Arc::new(
            UserStore::with_cost(&db_path, config.bcrypt_cost)
                .context("Failed to initialize user store")?,
        );
        info!("🔐 Authentication database at: {}", db_path);

        if config.seed_demo_data {
            user_store.seed_demo_data()?;
        }

        Ok(Self::new(
            user_store,
            RateLimitConfig::per_minute(config.rate_limit_per_minute),
        ))
    }
}

/// Create the API router
pub fn create_router(services: &AppServices) -> Router {
    let service = services.auth.service.clone();
    let limiter = services.limiter.clone();

    // route_layer wraps outward: auth runs first, then the limiter, then any role gate
    let public_routes = Router::new()
        .route("/register", post(auth_api::register))
        .route("/login", post(auth_api::login))
        .route("/roles", get(auth_api::list_roles))
        .route("/ping", get(auth_api::ping))
        .route_layer(middleware::from_fn_with_state(
            limiter.clone(),
            rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/user", get(auth_api::current_user))
        .route("/logout", post(auth_api::logout))
        .route("/logout-all", post(auth_api::logout_all))
        .route(
            "/profile",
            get(auth_api::profile).put(auth_api::update_profile),
        )
        .route("/change-password", put(auth_api::change_password))
        .route("/account", delete(auth_api::delete_account))
        .route_layer(middleware::from_fn_with_state(
            limiter.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            service.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users", get(auth_api::list_users))
        .route("/users/:id", delete(auth_api::delete_user))
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .route_layer(middleware::from_fn_with_state(service, auth_middleware));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(services.auth.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
