//! paygate HTTP Server
//!
//! Redirect endpoints gating API key issuance behind a completed Stripe
//! checkout.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate_server::{AppState, PaygateConfig, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PaygateConfig::from_env()?;
    let state = AppState::from_config(&config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("paygate server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET /health");
    tracing::info!("  GET /create-checkout-session/{{lookup_key}}/{{user_name}}");
    tracing::info!("  GET /create-api-key/{{session_id}}/{{one_time_key}}");
    tracing::info!("  GET /create-billing-portal/{{session_id}}  (bearer token)");

    axum::serve(listener, app).await?;

    Ok(())
}
