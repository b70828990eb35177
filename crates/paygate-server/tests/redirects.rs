//! End-to-end redirect behavior of the HTTP endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::Value;

use common::{SITE, TestHarness, identity_token, location, sign};

fn page(path: &str) -> String {
    format!("{SITE}{path}")
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "custom");
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_checkout_redirects_to_hosted_page() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get("/create-checkout-session/pro_monthly/alice")
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), "https://checkout.stripe.test/pay/cs_test_1");

    let checkouts = harness.gateway.checkouts().await;
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].price_id, "price_pro");
    assert_eq!(checkouts[0].requester, "alice");
    assert!(
        checkouts[0]
            .success_url
            .starts_with("https://api.example.com/create-api-key/{CHECKOUT_SESSION_ID}/")
    );
}

#[tokio::test]
async fn test_checkout_unknown_plan() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get("/create-checkout-session/enterprise/alice")
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), page("/cancel"));
    assert!(harness.gateway.checkouts().await.is_empty());
}

#[tokio::test]
async fn test_checkout_gateway_failure() {
    let harness = TestHarness::new().await;
    harness.gateway.fail_checkout().await;

    let response = harness
        .server
        .get("/create-checkout-session/pro_monthly/alice")
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), page("/cancel"));
}

// ============================================================================
// Confirmation
// ============================================================================

#[tokio::test]
async fn test_confirm_issues_once() {
    let harness = TestHarness::new().await;
    let (session_id, token) = harness.checkout("alice").await;
    harness.gateway.pay(&session_id, "cus_1").await;

    let first = harness
        .server
        .get(&format!("/create-api-key/{session_id}/{token}"))
        .await;
    first.assert_status(StatusCode::FOUND);
    assert_eq!(location(&first), page("/thanks_upgrade"));
    assert_eq!(harness.registry.issued_count().await, 1);
    assert_eq!(harness.store.credential_count().await, 1);

    let replay = harness
        .server
        .get(&format!("/create-api-key/{session_id}/{token}"))
        .await;
    replay.assert_status(StatusCode::FOUND);
    assert_eq!(location(&replay), page("/canceled_upgrade"));
    assert_eq!(harness.registry.issued_count().await, 1);
}

#[tokio::test]
async fn test_confirm_unpaid() {
    let harness = TestHarness::new().await;
    let (session_id, token) = harness.checkout("alice").await;

    let response = harness
        .server
        .get(&format!("/create-api-key/{session_id}/{token}"))
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), page("/canceled_upgrade"));
    assert_eq!(harness.registry.issued_count().await, 0);
}

#[tokio::test]
async fn test_confirm_wrong_token() {
    let harness = TestHarness::new().await;
    let (session_id, _) = harness.checkout("alice").await;
    harness.gateway.pay(&session_id, "cus_1").await;

    let forged = "0".repeat(64);
    let response = harness
        .server
        .get(&format!("/create-api-key/{session_id}/{forged}"))
        .await;

    assert_eq!(location(&response), page("/canceled_upgrade"));
    assert_eq!(harness.registry.issued_count().await, 0);
}

#[tokio::test]
async fn test_confirm_malformed_token() {
    let harness = TestHarness::new().await;
    let (session_id, _) = harness.checkout("alice").await;
    harness.gateway.pay(&session_id, "cus_1").await;

    let response = harness
        .server
        .get(&format!("/create-api-key/{session_id}/tok_xyz"))
        .await;

    assert_eq!(location(&response), page("/cancel"));
    assert_eq!(harness.registry.issued_count().await, 0);
}

#[tokio::test]
async fn test_confirm_token_from_other_session() {
    let harness = TestHarness::new().await;
    let (alice_session, alice_token) = harness.checkout("alice").await;
    let (bob_session, _) = harness.checkout("bob").await;
    harness.gateway.pay(&alice_session, "cus_a").await;
    harness.gateway.pay(&bob_session, "cus_b").await;

    let response = harness
        .server
        .get(&format!("/create-api-key/{bob_session}/{alice_token}"))
        .await;

    assert_eq!(location(&response), page("/canceled_upgrade"));
    assert_eq!(harness.registry.issued_count().await, 0);
}

// ============================================================================
// Billing Portal
// ============================================================================

#[tokio::test]
async fn test_portal_requires_token() {
    let harness = TestHarness::new().await;
    let session_id = harness.purchase("alice", "cus_1").await;

    let response = harness
        .server
        .get(&format!("/create-billing-portal/{session_id}"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "MISSING_TOKEN");
    assert!(harness.gateway.portal_calls().await.is_empty());
}

#[tokio::test]
async fn test_portal_rejects_bad_signature() {
    let harness = TestHarness::new().await;
    let session_id = harness.purchase("alice", "cus_1").await;

    let response = harness
        .server
        .get(&format!("/create-billing-portal/{session_id}"))
        .authorization_bearer(sign("not-the-secret", "alice"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_portal_for_owner() {
    let harness = TestHarness::new().await;
    let session_id = harness.purchase("alice", "cus_1").await;

    let response = harness
        .server
        .get(&format!("/create-billing-portal/{session_id}"))
        .authorization_bearer(identity_token("alice"))
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), "https://billing.stripe.test/session/cus_1");
    assert_eq!(
        harness.gateway.portal_calls().await,
        vec![("cus_1".to_string(), page("/thanks_upgrade"))]
    );
}

#[tokio::test]
async fn test_portal_for_other_user() {
    let harness = TestHarness::new().await;
    let session_id = harness.purchase("alice", "cus_1").await;

    let response = harness
        .server
        .get(&format!("/create-billing-portal/{session_id}"))
        .authorization_bearer(identity_token("mallory"))
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), page("/cancel"));
    assert!(harness.gateway.portal_calls().await.is_empty());
}

#[tokio::test]
async fn test_portal_unpaid_session() {
    let harness = TestHarness::new().await;
    let (session_id, _) = harness.checkout("alice").await;

    let response = harness
        .server
        .get(&format!("/create-billing-portal/{session_id}"))
        .authorization_bearer(identity_token("alice"))
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), page("/cancel"));
    assert!(harness.gateway.portal_calls().await.is_empty());
}
