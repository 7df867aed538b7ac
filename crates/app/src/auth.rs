use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Authenticated end user, resolved from an HS256 bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies identity tokens issued by the account service.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<Principal, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(err.to_string()))?;
        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(TokenError::Invalid("empty subject".to_string()));
        }
        Ok(Principal {
            user_id: claims.sub,
            email: claims.email.filter(|email| !email.trim().is_empty()),
        })
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Checks the service credential guarding the check trigger.
///
/// When no service token is configured (development only) the trigger is open.
pub fn authorize_service(state: &AppState, headers: &HeaderMap) -> Result<(), ProblemResponse> {
    let Some(expected) = state.service_token() else {
        return Ok(());
    };
    let provided = bearer_token(headers)
        .ok_or_else(|| ProblemResponse::unauthorized("missing service credential"))?;

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        warn!(stage = "api", "rejected check trigger with invalid service credential");
        Err(ProblemResponse::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "invalid service credential",
        ))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ProblemResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let validator = state.token_validator().ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "auth_unavailable",
                "user authentication is not configured",
            )
        })?;
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ProblemResponse::unauthorized("missing bearer token"))?;

        validator.validate(token).map_err(|err| {
            warn!(stage = "api", error = %err, "rejected bearer token");
            ProblemResponse::unauthorized("invalid bearer token")
        })
    }
}

#[cfg(test)]
pub(crate) fn mint_token(secret: &[u8], sub: &str, email: Option<&str>) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = serde_json::json!({
        "sub": sub,
        "email": email,
        "exp": (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .expect("encode token")
}
