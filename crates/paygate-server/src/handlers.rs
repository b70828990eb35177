//! HTTP Handlers
//!
//! Every business endpoint answers with `302 Found`; errors become a redirect
//! to one of the cancellation pages.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use paygate_payments::Redirect;

use crate::auth::AuthenticatedIdentity;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// `302 Found` with a `Location` header and no body.
#[derive(Debug)]
pub struct Found(pub Redirect);

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        (
            StatusCode::FOUND,
            [(header::LOCATION, self.0.location().to_string())],
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_backend,
    })
}

/// Start a checkout for `user_name` and send them to the hosted page
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Path((lookup_key, user_name)): Path<(String, String)>,
) -> Found {
    let outcome = state
        .issuance
        .initiate_checkout(&lookup_key, &user_name)
        .await;
    Found(state.redirects.settle("create_checkout_session", outcome))
}

/// Success callback from the hosted checkout
pub async fn create_api_key(
    State(state): State<AppState>,
    Path((session_id, one_time_key)): Path<(String, String)>,
) -> Found {
    let outcome = state
        .issuance
        .confirm_and_issue(&session_id, &one_time_key)
        .await;
    Found(state.redirects.settle("create_api_key", outcome))
}

/// Billing portal for the identity that made the purchase
pub async fn create_billing_portal(
    State(state): State<AppState>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    Path(session_id): Path<String>,
) -> Found {
    let outcome = state
        .portal
        .authorize_portal_access(&session_id, &identity)
        .await;
    Found(state.redirects.settle("create_billing_portal", outcome))
}
