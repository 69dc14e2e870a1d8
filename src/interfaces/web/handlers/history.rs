use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::warn;

use crate::core::types::{ChatRecord, Message};
use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthUser;
use crate::interfaces::web::error::GatewayError;

const CHAT_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    id: String,
}

/// Full message history of one of the caller's sessions.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, GatewayError> {
    match state.store.get_chat(&query.id).await? {
        Some(record) if record.user_id == user.user_id => {}
        Some(_) => {
            warn!(
                "User {} requested history of session {} owned by someone else",
                user.user_id, query.id
            );
            return Err(GatewayError::NotFound);
        }
        None => return Err(GatewayError::NotFound),
    }
    Ok(Json(state.store.messages(&query.id).await?))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ChatRecord>>, GatewayError> {
    Ok(Json(
        state.store.list_chats(&user.user_id, CHAT_LIST_LIMIT).await?,
    ))
}
