//! Authenticated identity extractor.
//!
//! The identity passed to the access controller comes from a verified bearer
//! token, never from the path or query string.

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::{Map, Value};

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// How identity tokens are verified.
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the identity provider.
    pub secret: String,

    /// Claim holding the username.
    pub identity_claim: String,

    /// Expected `aud`, if the provider sets one.
    pub audience: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"***")
            .field("identity_claim", &self.identity_claim)
            .field("audience", &self.audience)
            .finish()
    }
}

impl AuthConfig {
    /// Verify `token` and return the identity claim.
    pub fn verify(&self, token: &str) -> Result<String, AuthRejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Map<String, Value>>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "Identity token rejected");
            AuthRejection::InvalidToken
        })?;

        data.claims
            .get(&self.identity_claim)
            .and_then(Value::as_str)
            .filter(|identity| !identity.is_empty())
            .map(str::to_string)
            .ok_or(AuthRejection::MissingIdentity)
    }
}

/// Why a request carried no usable identity.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthRejection {
    MissingToken,
    InvalidToken,
    MissingIdentity,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let code = match self {
            AuthRejection::MissingToken => "MISSING_TOKEN",
            AuthRejection::InvalidToken => "INVALID_TOKEN",
            AuthRejection::MissingIdentity => "MISSING_IDENTITY",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".into(),
                code: code.into(),
            }),
        )
            .into_response()
    }
}

/// Identity proven by the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub String);

impl FromRequestParts<AppState> for AuthenticatedIdentity {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AuthRejection::MissingToken)?;

        state.auth.verify(token).map(AuthenticatedIdentity)
    }
}
