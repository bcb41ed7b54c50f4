use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::identity::GUEST_PREFIX;
use crate::error::{AppError, AppResult};
use crate::models::user::UserContext;
use crate::services::accounts;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MergeGuestRequest {
    pub guest_token: String,
}

#[derive(Debug, Serialize)]
pub struct MergeGuestResponse {
    pub status: String,
    pub merged_sessions: usize,
    pub xp_added: u64,
    pub coins_added: u64,
}

/// Merge preconditions: the destination must be a verified (non-guest)
/// identity, the source must be a guest identity, and they must differ.
fn validate_merge(
    destination_is_guest: bool,
    guest_token: &str,
    destination_id: &str,
) -> AppResult<()> {
    if destination_is_guest {
        return Err(AppError::Validation(
            "A guest user cannot be the destination for a merge".into(),
        ));
    }
    if !guest_token.starts_with(GUEST_PREFIX) {
        return Err(AppError::Validation(
            "guest_token is not a guest identity".into(),
        ));
    }
    if guest_token == destination_id {
        return Err(AppError::Validation(
            "Cannot merge an identity into itself".into(),
        ));
    }
    Ok(())
}

/// POST /auth/merge-guest-session — fold a guest identity's sessions and
/// gamification counters into the authenticated caller's account.
pub async fn merge_guest_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<MergeGuestRequest>,
) -> AppResult<Json<MergeGuestResponse>> {
    validate_merge(ctx.is_guest, &body.guest_token, &ctx.user_id)?;

    let outcome =
        accounts::merge_guest_into(&state.store, &state.sessions, &body.guest_token, &ctx).await;

    Ok(Json(MergeGuestResponse {
        status: "success".into(),
        merged_sessions: outcome.merged_sessions,
        xp_added: outcome.xp_added,
        coins_added: outcome.coins_added,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_merge_is_rejected() {
        let err = validate_merge(false, "guest_3f2a", "guest_3f2a").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn guest_destination_is_rejected() {
        let err = validate_merge(true, "guest_3f2a", "guest_9b1c").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn non_guest_source_is_rejected() {
        let err = validate_merge(false, "auth0|user7", "auth0|user42").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn guest_into_verified_account_is_allowed() {
        assert!(validate_merge(false, "guest_3f2a", "auth0|user42").is_ok());
    }
}
