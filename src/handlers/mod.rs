pub mod auth;
pub mod chat;
pub mod health;
pub mod payments;
pub mod sessions;
pub mod study;
pub mod upload;

use crate::error::{AppError, AppResult};
use crate::models::session::{ChatMessage, SessionMode, SessionRecord};
use crate::models::user::UserContext;

/// Expired paid accounts stay locked out until the grace window elapses.
pub(crate) fn ensure_unlocked(ctx: &UserContext) -> AppResult<()> {
    if ctx.is_locked {
        return Err(AppError::SubscriptionLocked(
            "Your subscription has expired. Renew to regain access to your saved sessions.".into(),
        ));
    }
    Ok(())
}

/// Ownership gate. Runs against the membership set before any record read,
/// so a non-owner gets `Forbidden` whether or not the id exists.
pub(crate) fn ensure_owner(owns_session: bool) -> AppResult<()> {
    if !owns_session {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// Fresh session record owned by the resolved user, with tier, plan and
/// expiry snapshotted at creation.
pub(crate) fn new_session_record(
    ctx: &UserContext,
    document_name: String,
    mode: SessionMode,
    history: Vec<ChatMessage>,
) -> SessionRecord {
    SessionRecord {
        session_id: uuid::Uuid::new_v4().to_string(),
        document_name,
        created_at: chrono::Utc::now(),
        mode,
        owner: ctx.user_id.clone(),
        tier: ctx.tier,
        plan_name: ctx.plan_name,
        expiry_date: ctx.expiry_date,
        history,
        study_started_at: None,
    }
}
