use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use crate::error::{AppError, AppResult};
use crate::handlers::{ensure_owner, ensure_unlocked};
use crate::models::session::{sort_newest_first, SessionInfo, SessionRecord};
use crate::models::user::UserContext;
use crate::AppState;

/// GET /sessions/ — newest first. Membership entries whose record has
/// expired are skipped and pruned rather than surfaced.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> AppResult<Json<Vec<SessionInfo>>> {
    ensure_unlocked(&ctx)?;

    let session_ids = state.sessions.list_user_sessions(&ctx.user_id).await;

    let mut sessions = Vec::with_capacity(session_ids.len());
    for sid in &session_ids {
        match state.sessions.get_session(sid).await {
            Some(record) => sessions.push(SessionInfo::from(&record)),
            None => state.sessions.prune_stale(&ctx.user_id, sid).await,
        }
    }

    sort_newest_first(&mut sessions);
    Ok(Json(sessions))
}

/// GET /sessions/{id} — full record with history. The ownership check runs
/// against the membership set before the record is read.
pub async fn get_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(session_id): Path<String>,
) -> AppResult<Json<SessionRecord>> {
    ensure_unlocked(&ctx)?;
    ensure_owner(state.sessions.is_owner(&ctx.user_id, &session_id).await)?;

    match state.sessions.get_session(&session_id).await {
        Some(record) => Ok(Json(record)),
        None => {
            state.sessions.prune_stale(&ctx.user_id, &session_id).await;
            Err(AppError::NotFound("Session not found".into()))
        }
    }
}

/// DELETE /sessions/{id} — membership entry and record go together,
/// atomically. Not owning the id is Forbidden regardless of whether the
/// record exists.
pub async fn delete_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(session_id): Path<String>,
) -> AppResult<StatusCode> {
    ensure_owner(state.sessions.is_owner(&ctx.user_id, &session_id).await)?;

    if !state
        .sessions
        .remove_session_for_user(&ctx.user_id, &session_id)
        .await
    {
        return Err(AppError::Upstream("Could not delete session".into()));
    }

    tracing::info!(
        user_id = %ctx.user_id,
        session_id = %session_id,
        "Session deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn non_owner_is_forbidden_regardless_of_existence() {
        // The gate consults only the membership set, never the record, so the
        // answer is the same for live, expired and never-existing ids.
        let err = ensure_owner(false).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);

        assert!(ensure_owner(true).is_ok());
    }
}
