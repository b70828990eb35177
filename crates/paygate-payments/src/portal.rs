//! Access Controller
//!
//! Grants billing-portal access to the identity that made the purchase.
//! Read-only with respect to stored state.

use std::sync::Arc;

use crate::config::IssuanceConfig;
use crate::error::{IssuanceError, Result};
use crate::gateway::PaymentGateway;
use crate::issuance::{FRAUD_TARGET, bounded, bounded_store, validate_identity, validate_session_id};
use crate::redirect::Redirect;
use crate::store::SessionStore;

pub struct AccessController {
    gateway: Arc<dyn PaymentGateway>,
    sessions: Arc<dyn SessionStore>,
    config: IssuanceConfig,
}

impl AccessController {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        sessions: Arc<dyn SessionStore>,
        config: IssuanceConfig,
    ) -> Self {
        Self {
            gateway,
            sessions,
            config,
        }
    }

    /// Redirect to the billing portal if `authenticated_identity` made the
    /// purchase behind `session_id`.
    ///
    /// `authenticated_identity` must come from a verified credential, never
    /// from request parameters.
    pub async fn authorize_portal_access(
        &self,
        session_id: &str,
        authenticated_identity: &str,
    ) -> Result<Redirect> {
        validate_session_id(session_id)?;
        validate_identity(authenticated_identity)?;

        let limit = self.config.upstream_timeout;

        let status = bounded(limit, "session status", self.gateway.session_status(session_id)).await?;
        if !status.payment_status.is_paid() {
            return Err(IssuanceError::PortalUnavailable);
        }

        let intent = bounded_store(limit, "intent read", self.sessions.get(session_id)).await?;
        let owner_matches = intent
            .as_ref()
            .is_some_and(|intent| intent.requester == authenticated_identity);
        if !owner_matches {
            tracing::warn!(
                target: FRAUD_TARGET,
                session_id = %session_id,
                identity = %authenticated_identity,
                known_session = intent.is_some(),
                "Billing portal requested by non-owner"
            );
            return Err(IssuanceError::IdentityMismatch);
        }

        let customer_id = status.customer_id.ok_or_else(|| {
            tracing::warn!(session_id = %session_id, "Paid session has no customer");
            IssuanceError::PortalUnavailable
        })?;

        let url = bounded(
            limit,
            "portal session",
            self.gateway
                .create_portal_session(&customer_id, &self.config.redirects.portal_return),
        )
        .await?;

        tracing::info!(
            session_id = %session_id,
            identity = %authenticated_identity,
            "Billing portal session created"
        );

        Ok(Redirect::to(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Tier;
    use crate::gateway::{PaymentStatus, SessionStatus};
    use crate::redirect::{Destination, RedirectUrls};
    use crate::store::{MemoryStore, PurchaseIntent};
    use crate::testing::ScriptedGateway;
    use crate::token::OneTimeToken;

    async fn setup() -> (Arc<ScriptedGateway>, Arc<MemoryStore>, AccessController) {
        let gateway = Arc::new(ScriptedGateway::new());
        let store = Arc::new(MemoryStore::new());
        store
            .put(&PurchaseIntent::new(
                "cs_abc".into(),
                "alice".into(),
                OneTimeToken::generate(),
                Tier::Pro,
            ))
            .await
            .unwrap();

        let config = IssuanceConfig::new(
            "https://api.example.com",
            RedirectUrls::from_site("https://example.com"),
            "plan_pro",
        );
        let controller = AccessController::new(gateway.clone(), store.clone(), config);
        (gateway, store, controller)
    }

    #[tokio::test]
    async fn test_owner_gets_portal() {
        let (gateway, _store, controller) = setup().await;
        gateway.pay("cs_abc", "cus_42").await;

        let redirect = controller
            .authorize_portal_access("cs_abc", "alice")
            .await
            .unwrap();
        assert_eq!(redirect.location(), "https://billing.stripe.test/session/cus_42");
        assert_eq!(
            gateway.portal_calls().await,
            vec![(
                "cus_42".to_string(),
                "https://example.com/thanks_upgrade".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_other_identity_is_refused() {
        let (gateway, _store, controller) = setup().await;
        gateway.pay("cs_abc", "cus_42").await;

        let err = controller
            .authorize_portal_access("cs_abc", "mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::IdentityMismatch));
        assert_eq!(err.destination(), Destination::GenericCancel);
        assert!(gateway.portal_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_refused() {
        let (gateway, _store, controller) = setup().await;
        gateway.pay("cs_other", "cus_42").await;

        let err = controller
            .authorize_portal_access("cs_other", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::IdentityMismatch));
    }

    #[tokio::test]
    async fn test_unpaid_session_is_refused() {
        let (gateway, _store, controller) = setup().await;
        gateway
            .set_status(
                "cs_abc",
                SessionStatus {
                    payment_status: PaymentStatus::Unpaid,
                    customer_id: Some("cus_42".into()),
                },
            )
            .await;

        let err = controller
            .authorize_portal_access("cs_abc", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::PortalUnavailable));
        assert_eq!(err.destination(), Destination::GenericCancel);
        assert!(gateway.portal_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_paid_session_without_customer_is_refused() {
        let (gateway, _store, controller) = setup().await;
        gateway
            .set_status(
                "cs_abc",
                SessionStatus {
                    payment_status: PaymentStatus::Paid,
                    customer_id: None,
                },
            )
            .await;

        let err = controller
            .authorize_portal_access("cs_abc", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::PortalUnavailable));
        assert_eq!(err.destination(), Destination::GenericCancel);
        assert!(gateway.portal_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_portal_access_does_not_touch_intent() {
        let (gateway, store, controller) = setup().await;
        gateway.pay("cs_abc", "cus_42").await;

        controller
            .authorize_portal_access("cs_abc", "alice")
            .await
            .unwrap();

        let intent = store.get("cs_abc").await.unwrap().unwrap();
        assert!(!intent.issued);
        assert!(intent.claimed_at.is_none());
    }
}
