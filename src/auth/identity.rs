use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Guest identifiers carry this prefix, distinguishing them from
/// provider-issued subjects. Guest tokens are never verified.
pub const GUEST_PREFIX: &str = "guest_";

/// An inbound credential after classification. The carried string is the
/// canonical user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Guest(String),
    Authenticated(String),
}

impl Credential {
    pub fn user_id(&self) -> &str {
        match self {
            Credential::Guest(id) | Credential::Authenticated(id) => id,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Credential::Guest(_))
    }
}

/// Claims we care about from identity-provider tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderClaims {
    pub sub: String,
    pub exp: i64,
}

/// Classify a bearer token: the guest marker short-circuits verification,
/// anything else must verify as an HS256 token from the identity provider.
pub fn classify(token: &str, config: &Config) -> AppResult<Credential> {
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }

    if token.starts_with(GUEST_PREFIX) {
        return Ok(Credential::Guest(token.to_string()));
    }

    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<ProviderClaims>(
        token,
        &DecodingKey::from_secret(config.auth_jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthorized)?;

    if data.claims.sub.is_empty() {
        return Err(AppError::Unauthorized);
    }

    Ok(Credential::Authenticated(data.claims.sub))
}
