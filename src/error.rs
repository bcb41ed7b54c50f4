use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Subscription expired: {0}")]
    SubscriptionLocked(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Session limit exceeded: {0}")]
    SessionLimitExceeded(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            // Plan-limit violations surface as payment-required, prompting an upgrade
            AppError::SubscriptionLocked(msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            AppError::QuotaExceeded(msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            AppError::SessionLimitExceeded(msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            AppError::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "An external service is unavailable".into(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "code": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_limit_errors_are_payment_required() {
        let quota = AppError::QuotaExceeded("daily upload limit reached".into());
        assert_eq!(quota.into_response().status(), StatusCode::PAYMENT_REQUIRED);

        let cap = AppError::SessionLimitExceeded("session cap reached".into());
        assert_eq!(cap.into_response().status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn upstream_detail_is_not_echoed() {
        let err = AppError::Upstream("redis://internal:6379 unreachable".into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn envelope_shape_through_the_router() {
        use axum::{body::Body, http::Request, routing::get, Router};
        use http_body_util::BodyExt;
        use tower::util::ServiceExt;

        let app: Router = Router::new().route(
            "/boom",
            get(|| async { Err::<(), AppError>(AppError::Validation("bad input".into())) }),
        );

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], 400);
        assert_eq!(body["error"]["message"], "bad input");
    }
}
