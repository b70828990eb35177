//! Common test utilities for paygate-server integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;

use paygate_payments::testing::ScriptedGateway;
use paygate_payments::{MemoryCredentialRegistry, MemoryStore};
use paygate_server::{AppState, PaygateConfig, create_router};

pub const SITE: &str = "https://example.com";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const LOOKUP_KEY: &str = "pro_monthly";

/// Test harness with scripted collaborators behind a real router.
pub struct TestHarness {
    pub server: TestServer,
    pub gateway: Arc<ScriptedGateway>,
    pub registry: Arc<MemoryCredentialRegistry>,
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let vars = HashMap::from([
            ("STRIPE_API_KEY", "sk_test_unused"),
            ("REGISTRY_URL", "https://registry.example.com"),
            ("REST_API_ID", "api123"),
            ("USAGE_PLAN_ID", "plan_pro"),
            ("CALLBACK_BASE_URL", "https://api.example.com"),
            ("SITE_URL", SITE),
            ("AUTH_JWT_SECRET", JWT_SECRET),
        ]);
        let config = PaygateConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
            .expect("Failed to load test config");

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.add_price(LOOKUP_KEY, "price_pro").await;
        let registry = Arc::new(MemoryCredentialRegistry::new());
        let store = Arc::new(MemoryStore::new());

        let state = AppState::new(
            gateway.clone(),
            registry.clone(),
            store.clone(),
            store.clone(),
            &config,
        );
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            gateway,
            registry,
            store,
        }
    }

    /// Run a checkout for `user` and return `(session_id, one_time_token)`
    /// as they would appear in the success callback.
    pub async fn checkout(&self, user: &str) -> (String, String) {
        let response = self
            .server
            .get(&format!("/create-checkout-session/{LOOKUP_KEY}/{user}"))
            .await;
        response.assert_status(axum::http::StatusCode::FOUND);

        let params = self
            .gateway
            .checkouts()
            .await
            .pop()
            .expect("checkout was not created");
        let token = params
            .success_url
            .rsplit('/')
            .next()
            .expect("success url has no token")
            .to_string();

        let location = location(&response);
        let session_id = location
            .rsplit('/')
            .next()
            .expect("checkout url has no session id")
            .to_string();

        (session_id, token)
    }

    /// Checkout, pay and confirm, returning the session id.
    pub async fn purchase(&self, user: &str, customer: &str) -> String {
        let (session_id, token) = self.checkout(user).await;
        self.gateway.pay(&session_id, customer).await;
        self.server
            .get(&format!("/create-api-key/{session_id}/{token}"))
            .await
            .assert_status(axum::http::StatusCode::FOUND);
        session_id
    }
}

pub fn location(response: &axum_test::TestResponse) -> String {
    response
        .header("location")
        .to_str()
        .expect("location is not ascii")
        .to_string()
}

/// Identity token for `username`, signed with the harness secret.
pub fn identity_token(username: &str) -> String {
    sign(JWT_SECRET, username)
}

pub fn sign(secret: &str, username: &str) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
        + 3600;
    encode(
        &Header::new(Algorithm::HS256),
        &json!({ "cognito:username": username, "exp": exp }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}
