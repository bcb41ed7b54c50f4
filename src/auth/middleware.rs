use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::auth::identity::classify;
use crate::error::AppError;
use crate::AppState;

/// Resolve the inbound credential to a `UserContext` and attach it to the
/// request. A missing or malformed bearer header fails before any store
/// access; an unverifiable provider token fails inside `classify`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let credential = classify(token, &state.config)?;
    let ctx = state.resolver.resolve(&credential).await;

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
