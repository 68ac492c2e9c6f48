use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::auth::{LoginRequest, RefreshRequest, RegisterRequest, RevokeAllRequest, RevokeRequest},
    utils::JsonBody,
    AppState,
};

/// Register a new identity and open its first session.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.boundary.register(req).await.map_err(AppError::from)?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// Login with email and password.
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.boundary.login(req).await.map_err(AppError::from)?;
    Ok((StatusCode::OK, Json(res)))
}

/// Rotate a refresh token.
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .boundary
        .refresh_token(req)
        .await
        .map_err(AppError::from)?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn revoke(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RevokeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .boundary
        .revoke_token(req)
        .await
        .map_err(AppError::from)?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn revoke_all(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RevokeAllRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .boundary
        .revoke_all_user_tokens(req)
        .await
        .map_err(AppError::from)?;
    Ok((StatusCode::OK, Json(res)))
}

/// Delete expired sessions now instead of waiting for the sweeper.
pub async fn cleanup(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let res = state
        .boundary
        .cleanup_expired_tokens()
        .await
        .map_err(AppError::from)?;
    Ok((StatusCode::OK, Json(res)))
}
