use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtService,
    models::user::{
        LoginRequest, PasswordResetConfirm, PasswordResetRequest, RefreshRequest, RefreshResponse,
    },
    services::{auth_service::AuthService, email_service::EmailService, AppState},
};

fn auth_service(state: &AppState) -> AuthService {
    let jwt_service = JwtService::new(&state.config.jwt_secret);
    AuthService::new(state.mongo.clone(), jwt_service)
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let response = auth_service(&state).login(req).await?;
    Ok(Json(response))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let access = auth_service(&state).refresh(&req.refresh).await?;
    Ok(Json(RefreshResponse { access }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth_service(&state).logout(&req.refresh).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/password-reset
pub async fn password_reset(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let email_service = EmailService::new(state.config.smtp.clone());
    auth_service(&state)
        .request_password_reset(req, &email_service)
        .await?;
    Ok(Json(json!({ "detail": "Password reset email sent" })))
}

/// POST /api/auth/password-reset/confirm
pub async fn password_reset_confirm(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    auth_service(&state).confirm_password_reset(req).await?;
    Ok(Json(json!({ "detail": "Password has been reset" })))
}
