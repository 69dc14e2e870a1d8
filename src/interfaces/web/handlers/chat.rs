use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::metadata::{StructuredMetadataEntry, parse_metadata};
use crate::core::store::SubmissionOutcome;
use crate::core::types::{ChatRecord, Message, Role};
use crate::interfaces::web::AppState;
use crate::interfaces::web::auth;
use crate::interfaces::web::error::GatewayError;

const TITLE_MAX_CHARS: usize = 100;
const SESSION_ID_LEN: usize = 7;

#[derive(Debug, Deserialize)]
pub struct ChatSubmitRequest {
    message: String,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatSubmitResponse {
    id: String,
    job_id: String,
    response: Value,
    structured_metadata: Vec<StructuredMetadataEntry>,
    role: Role,
}

fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

fn title_from(message: &str) -> String {
    message.chars().take(TITLE_MAX_CHARS).collect()
}

/// `POST /api/chat`. A malformed body is rejected with 400 before the caller is identified.
pub async fn submit_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatSubmitRequest>, JsonRejection>,
) -> Result<Json<ChatSubmitResponse>, GatewayError> {
    let Json(request) = payload.map_err(|e| {
        warn!("Error parsing JSON body: {}", e.body_text());
        GatewayError::BadRequest(e.body_text())
    })?;

    let message = request.message;
    if message.trim().is_empty() {
        return Err(GatewayError::BadRequest("message must not be empty".into()));
    }

    let user = auth::authenticate(&state, &headers).await?;

    let id = request
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(generate_session_id);

    // Checked again when the submission is recorded; this one spares the backend call.
    if let Some(existing) = state.store.get_chat(&id).await?
        && existing.user_id != user.user_id
    {
        warn!(
            "User {} tried to post into session {} owned by someone else",
            user.user_id, id
        );
        return Err(GatewayError::Unauthorized);
    }

    info!(
        "Sending chat message from user {} (session {})",
        user.user_id, id
    );

    let reply = state.backend.submit(&message).await.map_err(|e| {
        warn!("Backend call failed for user {}: {}", user.user_id, e);
        GatewayError::from(e)
    })?;

    let Some(job_id) = reply.job_id else {
        warn!("Backend response for session {} has no job_id", id);
        return Err(GatewayError::Backend {
            status: axum::http::StatusCode::BAD_GATEWAY,
            message: "Backend response does not contain job_id".to_string(),
        });
    };

    let structured_metadata = reply
        .formatted_metadata
        .as_deref()
        .map(parse_metadata)
        .unwrap_or_default();
    info!(
        "Parsed {} metadata entries for job {}",
        structured_metadata.len(),
        job_id
    );

    let record = ChatRecord {
        id: id.clone(),
        title: title_from(&message),
        user_id: user.user_id.clone(),
        created_at: chrono::Utc::now().timestamp_millis(),
        job_id: job_id.clone(),
    };
    let outcome = state
        .store
        .record_submission(&record, &Message::new(Role::User, message))
        .await?;
    if outcome == SubmissionOutcome::ForeignSession {
        warn!(
            "Session {} was claimed by another user while job {} was submitted",
            id, job_id
        );
        return Err(GatewayError::Unauthorized);
    }

    info!("Chat message sent and recorded with job id {}", job_id);

    Ok(Json(ChatSubmitResponse {
        id,
        job_id,
        response: reply.response,
        structured_metadata,
        role: Role::Assistant,
    }))
}
