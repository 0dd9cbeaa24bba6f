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
    models::student::{CreateStudentRequest, UpdateStudentRequest},
    services::{student_service::StudentService, AppState},
};

use super::principal_of;

/// POST /api/students
pub async fn create_student(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let student = StudentService::new(state.mongo.clone())
        .create_student(&principal, req)
        .await?;
    Ok((StatusCode::CREATED, Json(student)))
}

/// GET /api/students
pub async fn list_students(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let students = StudentService::new(state.mongo.clone())
        .list_students(&principal)
        .await?;
    Ok(Json(students))
}

/// GET /api/students/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let student = StudentService::new(state.mongo.clone())
        .me(&principal)
        .await?;
    Ok(Json(student))
}

/// GET /api/students/{id}
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let student = StudentService::new(state.mongo.clone())
        .get_student(&principal, &id)
        .await?;
    Ok(Json(student))
}

/// PATCH /api/students/{id}
pub async fn update_student(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let student = StudentService::new(state.mongo.clone())
        .update_student(&principal, &id, req)
        .await?;
    Ok(Json(student))
}

/// DELETE /api/students/{id}
pub async fn delete_student(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    StudentService::new(state.mongo.clone())
        .delete_student(&principal, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
