use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::handlers::{ensure_owner, ensure_unlocked, new_session_record};
use crate::models::session::SessionMode;
use crate::models::user::UserContext;
use crate::services::genius;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    #[validate(length(min = 1, max = 8192, message = "message must be 1-8192 characters"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
}

/// POST /chat/ (also mounted at /upload/chat) — continue an existing
/// conversation, or start a new one when no session id is given.
pub async fn continue_chat(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    ensure_unlocked(&ctx)?;
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let (mut record, is_new) = match &body.session_id {
        Some(sid) => {
            ensure_owner(state.sessions.is_owner(&ctx.user_id, sid).await)?;
            match state.sessions.get_session(sid).await {
                Some(record) => (record, false),
                None => {
                    state.sessions.prune_stale(&ctx.user_id, sid).await;
                    return Err(AppError::NotFound("Session not found".into()));
                }
            }
        }
        None => {
            state
                .limits
                .check_session_cap(&state.sessions, &ctx.user_id, ctx.tier)
                .await?;
            let record = new_session_record(
                &ctx,
                genius::session_title(&body.message),
                SessionMode::Chat,
                Vec::new(),
            );
            (record, true)
        }
    };

    let response = state.genius.chat(&record.history, &body.message).await?;
    record.push_turn(body.message, response.clone());

    // New sessions are only persisted once the first exchange succeeded, so a
    // failed AI call never leaves an empty session behind
    let saved = if is_new {
        state.sessions.add_session_for_user(&record).await
    } else {
        state.sessions.save_session(&record).await
    };
    if !saved {
        return Err(AppError::Upstream("Could not save session".into()));
    }

    if is_new {
        tracing::info!(
            user_id = %ctx.user_id,
            session_id = %record.session_id,
            "Started new chat session"
        );
    }

    Ok(Json(ChatResponse {
        session_id: record.session_id,
        response,
    }))
}
