use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::{ensure_owner, ensure_unlocked};
use crate::models::user::UserContext;
use crate::services::genius;
use crate::services::limits::UsageAction;
use crate::services::resolver::profile_key;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StudySessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct StudyStartResponse {
    pub session_id: String,
    pub started_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StudyEndResponse {
    pub new_xp: i64,
    pub session_duration_min: f64,
}

#[derive(Debug, Serialize)]
pub struct ExamAnalysisResponse {
    pub session_id: String,
    pub analysis: String,
}

/// XP for a timed study session: 5 XP per minute, +20 bonus at an hour,
/// nothing under a minute.
fn calculate_xp_gain(duration_minutes: f64) -> i64 {
    if duration_minutes < 1.0 {
        return 0;
    }
    let base = duration_minutes * 5.0;
    let bonus = if duration_minutes >= 60.0 { 20.0 } else { 0.0 };
    (base + bonus) as i64
}

/// POST /study/start — stamp the session with a start time.
pub async fn start_study(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<StudySessionRequest>,
) -> AppResult<Json<StudyStartResponse>> {
    ensure_unlocked(&ctx)?;

    ensure_owner(state.sessions.is_owner(&ctx.user_id, &body.session_id).await)?;
    let mut record = state
        .sessions
        .get_session(&body.session_id)
        .await
        .ok_or_else(|| AppError::NotFound("Session not found".into()))?;

    let started_at = Utc::now();
    record.study_started_at = Some(started_at);
    if !state.sessions.save_session(&record).await {
        return Err(AppError::Upstream("Could not save session".into()));
    }

    Ok(Json(StudyStartResponse {
        session_id: record.session_id,
        started_at,
    }))
}

/// POST /study/end — convert the elapsed time into XP, credited atomically,
/// and clear the start stamp.
pub async fn end_study(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<StudySessionRequest>,
) -> AppResult<Json<StudyEndResponse>> {
    ensure_unlocked(&ctx)?;

    ensure_owner(state.sessions.is_owner(&ctx.user_id, &body.session_id).await)?;
    let mut record = state
        .sessions
        .get_session(&body.session_id)
        .await
        .ok_or_else(|| AppError::NotFound("Session not found".into()))?;

    let started_at = record
        .study_started_at
        .ok_or_else(|| AppError::Validation("No active study session found".into()))?;

    let duration_minutes = (Utc::now() - started_at).num_seconds() as f64 / 60.0;
    let gained = calculate_xp_gain(duration_minutes);

    let new_xp = if gained > 0 {
        state
            .store
            .hincrby(&profile_key(&ctx.user_id), "xp", gained)
            .await
    } else {
        ctx.xp as i64
    };

    record.study_started_at = None;
    if !state.sessions.save_session(&record).await {
        return Err(AppError::Upstream("Could not save session".into()));
    }

    tracing::info!(
        user_id = %ctx.user_id,
        session_id = %body.session_id,
        xp_gained = gained,
        "Study session ended"
    );

    Ok(Json(StudyEndResponse {
        new_xp,
        session_duration_min: (duration_minutes * 100.0).round() / 100.0,
    }))
}

/// POST /study/analyze-exam — monthly-quota AI analysis of a session's
/// study material.
pub async fn analyze_exam(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<StudySessionRequest>,
) -> AppResult<Json<ExamAnalysisResponse>> {
    ensure_unlocked(&ctx)?;

    ensure_owner(state.sessions.is_owner(&ctx.user_id, &body.session_id).await)?;
    let record = state
        .sessions
        .get_session(&body.session_id)
        .await
        .ok_or_else(|| AppError::NotFound("Session not found".into()))?;

    state
        .limits
        .check_action(&ctx.user_id, ctx.tier, UsageAction::ExamAnalysis)
        .await?;

    // The opening user turn carries the uploaded material
    let material = record
        .history
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let analysis = state
        .genius
        .generate(&genius::exam_analysis_prompt(
            &record.document_name,
            material,
        ))
        .await?;

    Ok(Json(ExamAnalysisResponse {
        session_id: record.session_id,
        analysis,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_a_minute_earns_nothing() {
        assert_eq!(calculate_xp_gain(0.5), 0);
        assert_eq!(calculate_xp_gain(0.0), 0);
    }

    #[test]
    fn five_xp_per_minute() {
        assert_eq!(calculate_xp_gain(1.0), 5);
        assert_eq!(calculate_xp_gain(15.0), 75);
        assert_eq!(calculate_xp_gain(59.9), 299);
    }

    #[test]
    fn hour_long_sessions_get_the_bonus() {
        assert_eq!(calculate_xp_gain(60.0), 320);
        assert_eq!(calculate_xp_gain(90.0), 470);
    }
}
