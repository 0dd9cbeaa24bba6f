use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    middlewares::auth::JwtClaims,
    services::{results_service::ResultsService, AppState},
};

use super::principal_of;

/// GET /api/exams/{id}/results
pub async fn exam_results(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let results = ResultsService::new(state.mongo.clone())
        .exam_results(&principal, &id)
        .await?;
    Ok(Json(results))
}

/// GET /api/results/class/{class_id}
pub async fn class_results(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let results = ResultsService::new(state.mongo.clone())
        .class_results(&principal, &class_id)
        .await?;
    Ok(Json(results))
}

/// GET /api/students/me/results
pub async fn my_results(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let results = ResultsService::new(state.mongo.clone())
        .my_results(&principal)
        .await?;
    Ok(Json(results))
}
