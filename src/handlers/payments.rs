use axum::{body::Bytes, extract::State, http::HeaderMap, Extension, Json};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::error::{AppError, AppResult};
use crate::models::plan::PlanName;
use crate::models::user::UserContext;
use crate::services::subscription;
use crate::AppState;

type HmacSha512 = Hmac<Sha512>;

const PAYSTACK_CHARGE_URL: &str = "https://api.paystack.co/charge";

#[derive(Debug, Deserialize)]
pub struct InitializeMpesaRequest {
    pub phone: String,
    pub plan_name: String,
}

#[derive(Debug, Serialize)]
pub struct InitializeMpesaResponse {
    pub status: String,
    pub reference: String,
    pub message: String,
}

/// Normalize a Kenyan mobile number to the `2547XXXXXXXX` wire format.
/// Accepts `07…`/`01…` local forms and `254…` with or without a leading `+`.
fn normalize_msisdn(raw: &str) -> AppResult<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("Invalid phone number format".into()));
    }

    if digits.len() == 12 && digits.starts_with("254") {
        return Ok(digits.to_string());
    }
    if digits.len() == 10 && (digits.starts_with("07") || digits.starts_with("01")) {
        return Ok(format!("254{}", &digits[1..]));
    }

    Err(AppError::Validation("Invalid phone number format".into()))
}

/// POST /payments/initialize-mpesa — start a mobile-money charge for the
/// resolved user. Plan and user id travel in the charge metadata so the
/// webhook can activate the right subscription.
pub async fn initialize_mpesa(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<InitializeMpesaRequest>,
) -> AppResult<Json<InitializeMpesaResponse>> {
    if state.config.paystack_secret_key.is_empty() {
        return Err(AppError::Internal(anyhow::anyhow!(
            "Payment provider not configured"
        )));
    }

    let plan = PlanName::parse(&body.plan_name);
    if plan == PlanName::Free {
        return Err(AppError::Validation(format!(
            "Unknown or free plan \"{}\" cannot be purchased",
            body.plan_name
        )));
    }
    let phone = normalize_msisdn(&body.phone)?;

    let resp = state
        .http
        .post(PAYSTACK_CHARGE_URL)
        .header(
            "Authorization",
            format!("Bearer {}", state.config.paystack_secret_key),
        )
        .json(&serde_json::json!({
            // Paystack requires an email; derive a stable synthetic one
            "email": format!("{}@users.akili.app", ctx.user_id),
            "amount": plan.price_subunits(),
            "currency": "KES",
            "mobile_money": { "phone": phone, "provider": "mpesa" },
            "metadata": { "user_id": ctx.user_id.as_str(), "plan_name": plan.as_str() },
        }))
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("Payment provider error: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        tracing::warn!(status = %status, "Paystack charge initialization failed");
        return Err(AppError::Upstream(format!(
            "Payment provider error {status}"
        )));
    }

    let payload: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("Payment provider parse error: {e}")))?;

    let reference = payload["data"]["reference"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let message = payload["data"]["display_text"]
        .as_str()
        .or_else(|| payload["message"].as_str())
        .unwrap_or("Charge initialized")
        .to_string();

    tracing::info!(user_id = %ctx.user_id, reference = %reference, plan = plan.as_str(), "M-Pesa charge initialized");

    Ok(Json(InitializeMpesaResponse {
        status: "pending".into(),
        reference,
        message,
    }))
}

/// Verify the provider signature: HMAC-SHA512 over the raw request body,
/// hex-encoded, compared in constant time.
fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> AppResult<()> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid webhook secret")))?;
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let valid = signature.len() == expected.len()
        && signature
            .as_bytes()
            .iter()
            .zip(expected.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;

    if !valid {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Activation decision for a verified webhook event. Only a `charge.success`
/// with complete metadata naming a purchasable plan activates anything:
/// unknown plan names parse to `Free`, and activating that would *downgrade*
/// a paying user (rewrite their plan, re-expire their sessions).
fn activation_request(event: &serde_json::Value) -> Option<(&str, PlanName)> {
    if event["event"].as_str()? != "charge.success" {
        return None;
    }
    let metadata = &event["data"]["metadata"];
    let user_id = metadata["user_id"].as_str()?;
    let plan = PlanName::parse(metadata["plan_name"].as_str()?);
    if plan == PlanName::Free {
        return None;
    }
    Some((user_id, plan))
}

/// POST /payments/webhook — activation point for subscriptions. Events that
/// carry no actionable activation (wrong type, incomplete metadata, plan not
/// purchasable) are acknowledged so the provider does not retry them.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    verify_webhook_signature(&body, signature, &state.config.paystack_secret_key)?;

    let event: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;

    let event_type = event["event"].as_str().unwrap_or("");
    tracing::info!(event = event_type, "Payment webhook received");

    match activation_request(&event) {
        Some((user_id, plan)) => {
            subscription::activate(&state.store, &state.sessions, user_id, plan).await;
        }
        None if event_type == "charge.success" => {
            tracing::warn!("charge.success without an actionable plan, acknowledging");
        }
        None => {}
    }

    Ok(Json(serde_json::json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_numbers_normalize_to_e164() {
        assert_eq!(normalize_msisdn("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("0112345678").unwrap(), "254112345678");
        assert_eq!(normalize_msisdn("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("0712 345 678").unwrap(), "254712345678");
    }

    #[test]
    fn bad_numbers_are_validation_errors() {
        for raw in ["", "12345", "07123456789", "notaphone", "+14155550100"] {
            assert!(
                matches!(normalize_msisdn(raw), Err(AppError::Validation(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn signature_verification_accepts_matching_hmac() {
        let secret = "sk_test_secret";
        let payload = br#"{"event":"charge.success"}"#;

        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_webhook_signature(payload, &signature, secret).is_ok());
    }

    #[test]
    fn signature_verification_rejects_tampered_body() {
        let secret = "sk_test_secret";
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(br#"{"event":"charge.success"}"#);
        let signature = hex::encode(mac.finalize().into_bytes());

        let err =
            verify_webhook_signature(br#"{"event":"charge.failed"}"#, &signature, secret)
                .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[test]
    fn successful_charge_with_known_plan_activates() {
        let event = serde_json::json!({
            "event": "charge.success",
            "data": { "metadata": { "user_id": "auth0|user42", "plan_name": "monthly" } }
        });
        assert_eq!(
            activation_request(&event),
            Some(("auth0|user42", PlanName::Monthly))
        );
    }

    #[test]
    fn unknown_plan_name_never_activates() {
        // Parsing to Free would downgrade a paying user; acknowledge instead.
        let event = serde_json::json!({
            "event": "charge.success",
            "data": { "metadata": { "user_id": "auth0|user42", "plan_name": "platinum" } }
        });
        assert_eq!(activation_request(&event), None);
    }

    #[test]
    fn incomplete_metadata_and_other_events_never_activate() {
        let missing = serde_json::json!({
            "event": "charge.success",
            "data": { "metadata": { "plan_name": "monthly" } }
        });
        assert_eq!(activation_request(&missing), None);

        let failed = serde_json::json!({
            "event": "charge.failed",
            "data": { "metadata": { "user_id": "auth0|user42", "plan_name": "monthly" } }
        });
        assert_eq!(activation_request(&failed), None);
    }
}
