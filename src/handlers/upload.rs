use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::handlers::{ensure_unlocked, new_session_record};
use crate::models::plan::PlanName;
use crate::models::session::{ChatMessage, Role, SessionMode};
use crate::models::user::{Tier, UserContext};
use crate::services::limits::UsageAction;
use crate::services::{genius, parser};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub document_name: String,
    pub created_at: DateTime<Utc>,
    pub mode: SessionMode,
    pub response: String,
    pub tier: Tier,
    pub plan_name: PlanName,
    pub expiry_date: Option<DateTime<Utc>>,
    pub active_sessions: u64,
}

struct UploadedFile {
    name: String,
    bytes: Vec<u8>,
}

/// Pull the first file field out of the multipart body, enforcing the
/// configured size cap.
async fn read_upload(
    mut multipart: Multipart,
    max_bytes: usize,
) -> AppResult<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.file_name().is_none() {
            continue;
        }
        let name = field
            .file_name()
            .unwrap_or("Unknown Document")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;

        if bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File too large. Max allowed size: {}MB",
                max_bytes / (1024 * 1024)
            )));
        }
        return Ok(UploadedFile {
            name,
            bytes: bytes.to_vec(),
        });
    }
    Err(AppError::Validation("No file in upload".into()))
}

/// POST /upload/document — extract text, generate a study pack, persist a new
/// session with the document and the AI response as its opening turns.
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    ensure_unlocked(&ctx)?;

    state
        .limits
        .check_session_cap(&state.sessions, &ctx.user_id, ctx.tier)
        .await?;

    let file = read_upload(multipart, state.config.max_upload_bytes).await?;

    state
        .limits
        .check_action(&ctx.user_id, ctx.tier, UsageAction::DocUpload)
        .await?;

    let text = parser::extract_text(&file.bytes, &file.name)?;

    let response = state
        .genius
        .generate(&genius::study_pack_prompt(&text))
        .await?;

    let history = vec![
        ChatMessage {
            role: Role::User,
            content: genius::study_pack_prompt(&text),
        },
        ChatMessage {
            role: Role::Model,
            content: response.clone(),
        },
    ];
    let record = new_session_record(&ctx, file.name, SessionMode::Study, history);

    if !state.sessions.add_session_for_user(&record).await {
        return Err(AppError::Upstream("Could not save session".into()));
    }

    let active_sessions = state.sessions.session_count(&ctx.user_id).await;
    tracing::info!(
        user_id = %ctx.user_id,
        session_id = %record.session_id,
        document = %record.document_name,
        "Document upload created session"
    );

    Ok(Json(UploadResponse {
        session_id: record.session_id,
        document_name: record.document_name,
        created_at: record.created_at,
        mode: record.mode,
        response,
        tier: ctx.tier,
        plan_name: ctx.plan_name,
        expiry_date: ctx.expiry_date,
        active_sessions,
    }))
}

/// POST /upload/image — same flow for an image, gated by the image quota;
/// the model reads the image directly.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    ensure_unlocked(&ctx)?;

    state
        .limits
        .check_session_cap(&state.sessions, &ctx.user_id, ctx.tier)
        .await?;

    let file = read_upload(multipart, state.config.max_upload_bytes).await?;

    state
        .limits
        .check_action(&ctx.user_id, ctx.tier, UsageAction::ImageUpload)
        .await?;

    let mime = parser::detect_image_mime(&file.bytes).ok_or_else(|| {
        AppError::Validation(format!(
            "\"{}\" is not a supported image (png, jpeg, webp)",
            file.name
        ))
    })?;

    let prompt = "Read the study material in this image. Generate a concise, \
                  easy-to-understand summary and a 5-question multiple-choice \
                  quiz with an answer key at the end.";
    let response = state
        .genius
        .describe_image(mime, &file.bytes, prompt)
        .await?;

    let history = vec![
        ChatMessage {
            role: Role::User,
            content: format!("Uploaded image: {}", file.name),
        },
        ChatMessage {
            role: Role::Model,
            content: response.clone(),
        },
    ];
    let record = new_session_record(&ctx, file.name, SessionMode::Study, history);

    if !state.sessions.add_session_for_user(&record).await {
        return Err(AppError::Upstream("Could not save session".into()));
    }

    let active_sessions = state.sessions.session_count(&ctx.user_id).await;

    Ok(Json(UploadResponse {
        session_id: record.session_id,
        document_name: record.document_name,
        created_at: record.created_at,
        mode: record.mode,
        response,
        tier: ctx.tier,
        plan_name: ctx.plan_name,
        expiry_date: ctx.expiry_date,
        active_sessions,
    }))
}
