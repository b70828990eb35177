//! paygate HTTP server
//!
//! Thin axum layer over `paygate-payments`: three redirect endpoints and a
//! health check.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod state;

use axum::{BoxError, Router, error_handling::HandleErrorLayer, routing::get};
use tower::{ServiceBuilder, timeout::TimeoutLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use paygate_payments::{CONFIRM_PATH, Redirect};

pub use auth::{AuthConfig, AuthenticatedIdentity};
pub use config::{ConfigError, PaygateConfig};
pub use state::AppState;

use crate::handlers::{
    Found, create_api_key, create_billing_portal, create_checkout_session, health_check,
};

/// Answer a request that hit the deadline or failed in a layer.
///
/// Issuance already past its claim keeps running on its own task.
async fn redirect_on_layer_error(fallback: String, err: BoxError) -> Found {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::error!("Request deadline exceeded");
    } else {
        tracing::error!(error = %err, "Request failed in middleware");
    }
    Found(Redirect::to(fallback))
}

/// Build the router with all routes and layers.
pub fn create_router(state: AppState) -> Router {
    let request_deadline = state.issuance.config().request_deadline();
    let fallback = state.redirects.generic_cancel.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/create-checkout-session/{lookup_key}/{user_name}",
            get(create_checkout_session),
        )
        .route(
            &format!("{CONFIRM_PATH}/{{session_id}}/{{one_time_key}}"),
            get(create_api_key),
        )
        .route("/create-billing-portal/{session_id}", get(create_billing_portal))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(HandleErrorLayer::new(move |err: BoxError| {
                    redirect_on_layer_error(fallback.clone(), err)
                }))
                .layer(TimeoutLayer::new(request_deadline)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};
    use axum::response::IntoResponse;

    use super::*;

    #[tokio::test]
    async fn test_deadline_becomes_cancel_redirect() {
        let elapsed: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        let response = redirect_on_layer_error("https://example.com/cancel".into(), elapsed)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://example.com/cancel"
        );
    }
}
