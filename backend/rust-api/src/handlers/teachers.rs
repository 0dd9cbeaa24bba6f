use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::teacher::{CreateTeacherRequest, UpdateTeacherRequest},
    services::{teacher_service::TeacherService, AppState},
};

use super::principal_of;

/// POST /api/teachers
pub async fn create_teacher(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateTeacherRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let teacher = TeacherService::new(state.mongo.clone())
        .create_teacher(&principal, req)
        .await?;
    Ok((StatusCode::CREATED, Json(teacher)))
}

/// GET /api/teachers
pub async fn list_teachers(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let teachers = TeacherService::new(state.mongo.clone())
        .list_teachers(&principal)
        .await?;
    Ok(Json(teachers))
}

/// GET /api/teachers/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let teacher = TeacherService::new(state.mongo.clone())
        .me(&principal)
        .await?;
    Ok(Json(teacher))
}

/// GET /api/teachers/{id}
pub async fn get_teacher(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let teacher = TeacherService::new(state.mongo.clone())
        .get_teacher(&principal, &id)
        .await?;
    Ok(Json(teacher))
}

/// PATCH /api/teachers/{id}
pub async fn update_teacher(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateTeacherRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let teacher = TeacherService::new(state.mongo.clone())
        .update_teacher(&principal, &id, req)
        .await?;
    Ok(Json(teacher))
}

/// DELETE /api/teachers/{id}
pub async fn delete_teacher(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    TeacherService::new(state.mongo.clone())
        .delete_teacher(&principal, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/teachers/{id}/students
pub async fn list_assigned_students(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let students = TeacherService::new(state.mongo.clone())
        .list_assigned_students(&principal, &id)
        .await?;
    Ok(Json(students))
}
