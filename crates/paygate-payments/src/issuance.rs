//! Issuance Orchestrator
//!
//! Drives a purchase from checkout to credential:
//!
//! ```text
//! initiate_checkout ──▶ hosted checkout ──▶ confirm_and_issue
//!   resolve price         (out of band)       1. payment status == paid
//!   new one-time token                        2. intent exists
//!   create session                            3. token matches
//!   put intent                                4. not consumed
//!                                             5. try_claim (single winner)
//!                                             6. mint → attach → save → mark_issued
//! ```
//!
//! Steps 1–5 have no side effects outside the claim. Once the claim is won,
//! step 6 runs on its own task so a dropped request cannot stop it halfway;
//! any failure is reported as [`IssuanceError::Inconsistency`] and never
//! retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::IssuanceConfig;
use crate::credential::IssuedCredential;
use crate::error::{IssuanceError, ReplayKind, Result};
use crate::gateway::{CheckoutParams, PaymentGateway};
use crate::redirect::{Destination, Redirect};
use crate::registry::CredentialRegistry;
use crate::store::{ClaimOutcome, CredentialStore, MarkOutcome, PurchaseIntent, SessionStore};
use crate::token::OneTimeToken;

/// Log target for replay and identity-mismatch events.
pub const FRAUD_TARGET: &str = "paygate::fraud";

const MAX_LOOKUP_KEY_LEN: usize = 200;
const MAX_IDENTITY_LEN: usize = 128;
const MAX_SESSION_ID_LEN: usize = 255;

/// Bound an external call; a timeout is reported, never retried.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(IssuanceError::Upstream(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Same as [`bounded`], for store calls.
pub(crate) async fn bounded_store<T>(
    limit: Duration,
    what: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(IssuanceError::Persistence(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

pub(crate) fn validate_identity(identity: &str) -> Result<()> {
    if identity.is_empty() || identity.len() > MAX_IDENTITY_LEN {
        return Err(IssuanceError::Validation("identity length".into()));
    }
    if identity.chars().any(char::is_control) {
        return Err(IssuanceError::Validation("identity contains control characters".into()));
    }
    Ok(())
}

pub(crate) fn validate_session_id(session_id: &str) -> Result<()> {
    let ok = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(IssuanceError::Validation("malformed session id".into()))
    }
}

fn validate_lookup_key(lookup_key: &str) -> Result<()> {
    let ok = !lookup_key.is_empty()
        && lookup_key.len() <= MAX_LOOKUP_KEY_LEN
        && lookup_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(IssuanceError::Validation("malformed lookup key".into()))
    }
}

/// Checkout initiation and payment-gated credential issuance.
pub struct IssuanceService {
    gateway: Arc<dyn PaymentGateway>,
    registry: Arc<dyn CredentialRegistry>,
    sessions: Arc<dyn SessionStore>,
    credentials: Arc<dyn CredentialStore>,
    config: IssuanceConfig,
}

impl IssuanceService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        registry: Arc<dyn CredentialRegistry>,
        sessions: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialStore>,
        config: IssuanceConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            sessions,
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &IssuanceConfig {
        &self.config
    }

    /// Start a checkout for `requester` and return the hosted checkout page.
    ///
    /// The intent is persisted before the link is handed out; if the write
    /// fails the caller gets an error and no link.
    pub async fn initiate_checkout(&self, lookup_key: &str, requester: &str) -> Result<Redirect> {
        validate_lookup_key(lookup_key)?;
        validate_identity(requester)?;

        let limit = self.config.upstream_timeout;

        let price_id = bounded(limit, "price lookup", self.gateway.resolve_price(lookup_key))
            .await?
            .ok_or_else(|| IssuanceError::PriceNotFound(lookup_key.to_string()))?;

        let token = OneTimeToken::generate();
        let params = CheckoutParams {
            price_id,
            success_url: self.config.success_url_template(token.as_str()),
            cancel_url: self.config.redirects.payment_cancel.clone(),
            requester: requester.to_string(),
        };

        let session = bounded(
            limit,
            "checkout session",
            self.gateway.create_checkout_session(params),
        )
        .await?;

        let intent = PurchaseIntent::new(
            session.id.clone(),
            requester.to_string(),
            token,
            self.config.tier,
        );

        if let Err(e) = bounded_store(limit, "intent write", self.sessions.put(&intent)).await {
            tracing::error!(
                session_id = %session.id,
                requester = %requester,
                error = %e,
                "Checkout session created but intent was not stored; link withheld"
            );
            return Err(e);
        }

        tracing::info!(
            session_id = %session.id,
            requester = %requester,
            lookup_key = %lookup_key,
            "Checkout initiated"
        );

        Ok(Redirect::to(session.url))
    }

    /// Verify payment and the one-time token, then issue the credential once.
    pub async fn confirm_and_issue(
        &self,
        session_id: &str,
        presented_token: &str,
    ) -> Result<Redirect> {
        validate_session_id(session_id)?;
        let presented = OneTimeToken::parse(presented_token)
            .ok_or_else(|| IssuanceError::Validation("malformed one-time token".into()))?;

        let limit = self.config.upstream_timeout;

        let status = bounded(limit, "session status", self.gateway.session_status(session_id)).await?;
        if !status.payment_status.is_paid() {
            tracing::info!(
                session_id = %session_id,
                status = ?status.payment_status,
                "Confirmation for unpaid session"
            );
            return Err(IssuanceError::PaymentNotConfirmed);
        }

        let intent = bounded_store(limit, "intent read", self.sessions.get(session_id))
            .await?
            .ok_or(IssuanceError::ReplayDetected(ReplayKind::UnknownSession))
            .inspect_err(|_| self.log_replay(session_id, ReplayKind::UnknownSession))?;

        if !intent.one_time_token.matches(&presented) {
            self.log_replay(session_id, ReplayKind::TokenMismatch);
            return Err(IssuanceError::ReplayDetected(ReplayKind::TokenMismatch));
        }

        if intent.is_consumed() {
            self.log_replay(session_id, ReplayKind::AlreadyIssued);
            return Err(IssuanceError::ReplayDetected(ReplayKind::AlreadyIssued));
        }

        self.warn_on_existing_credentials(&intent).await;

        match bounded_store(limit, "intent claim", self.sessions.try_claim(session_id)).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyClaimed => {
                self.log_replay(session_id, ReplayKind::AlreadyIssued);
                return Err(IssuanceError::ReplayDetected(ReplayKind::AlreadyIssued));
            }
            ClaimOutcome::Missing => {
                self.log_replay(session_id, ReplayKind::UnknownSession);
                return Err(IssuanceError::ReplayDetected(ReplayKind::UnknownSession));
            }
        }

        let job = ClaimedIssuance {
            registry: self.registry.clone(),
            sessions: self.sessions.clone(),
            credentials: self.credentials.clone(),
            config: self.config.clone(),
            intent,
        };
        tokio::spawn(job.run())
            .await
            .map_err(|e| IssuanceError::Inconsistency {
                session_id: session_id.to_string(),
                stage: "issuance_task",
                reason: e.to_string(),
            })??;

        Ok(self.config.redirects.redirect(Destination::Success))
    }

    /// Cross-intent duplicates are allowed but made visible.
    async fn warn_on_existing_credentials(&self, intent: &PurchaseIntent) {
        let lookup = self
            .credentials
            .find_by_owner(&intent.requester, intent.tier);
        match bounded_store(self.config.upstream_timeout, "credential lookup", lookup).await {
            Ok(existing) if !existing.is_empty() => {
                tracing::warn!(
                    owner = %intent.requester,
                    tier = %intent.tier,
                    existing = existing.len(),
                    session_id = %intent.session_id,
                    "Owner already holds a credential for this tier; issuing another"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Could not check existing credentials");
            }
        }
    }

    fn log_replay(&self, session_id: &str, kind: ReplayKind) {
        tracing::warn!(
            target: FRAUD_TARGET,
            session_id = %session_id,
            kind = %kind,
            "Rejected confirmation"
        );
    }
}

/// Post-claim work, owning its collaborators so it can outlive the request.
struct ClaimedIssuance {
    registry: Arc<dyn CredentialRegistry>,
    sessions: Arc<dyn SessionStore>,
    credentials: Arc<dyn CredentialStore>,
    config: IssuanceConfig,
    intent: PurchaseIntent,
}

impl ClaimedIssuance {
    async fn run(self) -> Result<IssuedCredential> {
        let outcome = self.mint_attach_persist_mark().await;
        match &outcome {
            Ok(credential) => tracing::info!(
                session_id = %credential.session_id,
                owner = %credential.owner,
                tier = %credential.tier,
                credential_id = %credential.credential_id,
                "Credential issued"
            ),
            Err(e) => tracing::error!(
                session_id = %self.intent.session_id,
                requester = %self.intent.requester,
                error = %e,
                "Issuance left incomplete; manual reconciliation required"
            ),
        }
        outcome
    }

    async fn mint_attach_persist_mark(&self) -> Result<IssuedCredential> {
        let intent = &self.intent;
        let limit = self.config.upstream_timeout;
        let session_id = intent.session_id.as_str();
        let inconsistency = |stage: &'static str, e: IssuanceError| IssuanceError::Inconsistency {
            session_id: session_id.to_string(),
            stage,
            reason: e.to_string(),
        };

        let name = self.config.credential_name(&intent.requester);
        let minted = bounded(limit, "credential mint", self.registry.issue_credential(&name))
            .await
            .map_err(|e| inconsistency("mint", e))?;

        bounded(
            limit,
            "usage policy",
            self.registry
                .attach_usage_policy(&minted.id, &self.config.usage_plan_id),
        )
        .await
        .map_err(|e| {
            inconsistency(
                "attach_policy",
                IssuanceError::Upstream(format!("credential {}: {e}", minted.id)),
            )
        })?;

        let credential = IssuedCredential::new(
            intent.requester.clone(),
            intent.tier,
            minted,
            intent.session_id.clone(),
        );

        bounded_store(limit, "credential write", self.credentials.save(&credential))
            .await
            .map_err(|e| {
                inconsistency(
                    "persist_credential",
                    IssuanceError::Persistence(format!(
                        "credential {}: {e}",
                        credential.credential_id
                    )),
                )
            })?;

        match bounded_store(limit, "mark issued", self.sessions.mark_issued(session_id))
            .await
            .map_err(|e| inconsistency("mark_issued", e))?
        {
            MarkOutcome::Marked => Ok(credential),
            other => Err(inconsistency(
                "mark_issued",
                IssuanceError::Persistence(format!(
                    "conditional update returned {other:?} for credential {}",
                    credential.credential_id
                )),
            )),
        }
    }
}
