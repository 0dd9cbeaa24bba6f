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
    models::exam::{ExamPayload, SubmitExamRequest, SubmitExamResponse},
    services::{exam_service::ExamService, AppState},
};

use super::principal_of;

/// POST /api/exams
pub async fn create_exam(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(payload): AppJson<ExamPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let exam = ExamService::new(state.mongo.clone())
        .create_exam(&principal, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(exam)))
}

/// GET /api/exams
pub async fn list_exams(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let exams = ExamService::new(state.mongo.clone())
        .list_exams(&principal)
        .await?;
    Ok(Json(exams))
}

/// GET /api/exams/unattempted
pub async fn unattempted_exams(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let exams = ExamService::new(state.mongo.clone())
        .unattempted_exams(&principal)
        .await?;
    Ok(Json(exams))
}

/// GET /api/exams/{id}
pub async fn get_exam(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let exam = ExamService::new(state.mongo.clone())
        .get_exam(&principal, &id)
        .await?;
    Ok(Json(exam))
}

/// PUT /api/exams/{id}
pub async fn update_exam(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<ExamPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let exam = ExamService::new(state.mongo.clone())
        .update_exam(&principal, &id, payload)
        .await?;
    Ok(Json(exam))
}

/// DELETE /api/exams/{id}
pub async fn delete_exam(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    ExamService::new(state.mongo.clone())
        .delete_exam(&principal, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/exams/{id}/submit
pub async fn submit_exam(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<SubmitExamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let score = ExamService::new(state.mongo.clone())
        .submit_exam(&principal, &id, req)
        .await?;
    Ok(Json(SubmitExamResponse { score }))
}
