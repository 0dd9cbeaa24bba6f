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
    models::chat::{ChatOut, CreateChatRequest},
    services::{
        chat_service::{ChatLookup, ChatService},
        AppState,
    },
};

use super::principal_of;

/// POST /api/chats
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;

    // The body carries the unordered pair; the caller must be one of them.
    let own_hex = principal.account_id().to_hex();
    let other = match req.participants.as_slice() {
        [a, b] if *a == own_hex => b,
        [a, b] if *b == own_hex => a,
        [other] => other,
        _ => {
            return Err(ApiError::validation(
                "Chat participants must be you and exactly one other user",
            ))
        }
    };

    let lookup = ChatService::new(state.mongo.clone())
        .create_or_get_chat(&principal, other)
        .await?;
    let status = creation_status(&lookup);
    Ok((status, Json(ChatOut::from(lookup.into_chat()))))
}

/// A fresh chat answers 201; re-opening the pair's existing chat answers 200.
fn creation_status(lookup: &ChatLookup) -> StatusCode {
    match lookup {
        ChatLookup::Created(_) => StatusCode::CREATED,
        ChatLookup::Existing(_) => StatusCode::OK,
    }
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let chats = ChatService::new(state.mongo.clone())
        .list_chats(&principal)
        .await?;
    Ok(Json(chats.into_iter().map(ChatOut::from).collect::<Vec<_>>()))
}

/// GET /api/chats/{id}
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let chat = ChatService::new(state.mongo.clone())
        .load_member_chat(&principal, &id)
        .await?;
    Ok(Json(ChatOut::from(chat)))
}

/// GET /api/chats/{id}/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal_of(&state, &claims).await?;
    let messages = ChatService::new(state.mongo.clone())
        .list_messages(&principal, &id)
        .await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Chat;
    use chrono::Utc;
    use mongodb::bson::oid::ObjectId;

    fn chat() -> Chat {
        Chat {
            id: Some(ObjectId::new()),
            participants: vec![ObjectId::new(), ObjectId::new()],
            created_by: ObjectId::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn only_a_fresh_chat_answers_created() {
        assert_eq!(
            creation_status(&ChatLookup::Created(chat())),
            StatusCode::CREATED
        );
        assert_eq!(
            creation_status(&ChatLookup::Existing(chat())),
            StatusCode::OK
        );
    }
}
