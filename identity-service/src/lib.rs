pub mod config;
pub mod db;
pub mod dtos;
pub mod grpc;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_operation_rate_limiter;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::IdentityConfig;
use crate::grpc::AuthBoundary;
use crate::services::{AuthService, ServiceContext, SessionSettings, Store, TokenMaker};
use crate::utils::{Argon2Hasher, HashCost};

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub service_version: String,
    pub boundary: AuthBoundary,
}

/// Wire the orchestrator from configuration on top of `store`.
pub fn build_auth_service(
    config: &IdentityConfig,
    store: Arc<dyn Store>,
) -> Result<AuthService, AppError> {
    let key = config.token.key_bytes()?;
    let tokens = TokenMaker::new(config.token.scheme, &key).map_err(AppError::ConfigError)?;
    let hasher = Argon2Hasher::new(HashCost::from(&config.password)).map_err(AppError::ConfigError)?;

    let rate_limiter = (config.rate_limit.requests > 0).then(|| {
        create_operation_rate_limiter(config.rate_limit.requests, config.rate_limit.window_seconds)
    });

    Ok(AuthService::new(
        store,
        Arc::new(hasher),
        tokens,
        SessionSettings {
            access_ttl: config.token.access_ttl(),
            refresh_ttl: config.token.refresh_ttl(),
        },
        ServiceContext::new(config.service_name.clone(), rate_limiter),
    ))
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/revoke", post(handlers::auth::revoke))
        .route("/auth/revoke-all", post(handlers::auth::revoke_all))
        .route("/auth/cleanup", post(handlers::auth::cleanup));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Service health check. Fails when the store is unreachable.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .boundary
        .auth()
        .store()
        .health_check()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Store health check failed");
            AppError::ServiceUnavailable
        })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
        "version": state.service_version,
        "checks": {
            "store": "up"
        }
    })))
}
