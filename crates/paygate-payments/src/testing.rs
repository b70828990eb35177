//! Scripted collaborators for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::credential::{IssuedCredential, MintedCredential, Tier};
use crate::error::{IssuanceError, Result};
use crate::gateway::{CheckoutParams, CheckoutSession, PaymentGateway, PaymentStatus, SessionStatus};
use crate::registry::{CredentialRegistry, MemoryCredentialRegistry};
use crate::store::{
    ClaimOutcome, CredentialStore, MarkOutcome, MemoryStore, PurchaseIntent, SessionStore,
};

#[derive(Default)]
struct Script {
    prices: HashMap<String, String>,
    sessions: HashMap<String, SessionStatus>,
    next_session_id: Option<String>,
    created: usize,
    checkouts: Vec<CheckoutParams>,
    portal_calls: Vec<(String, String)>,
    status_delay: Option<Duration>,
    fail_checkout: bool,
}

/// Gateway whose prices and payment states are set by the test.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_price(&self, lookup_key: &str, price_id: &str) {
        self.script
            .lock()
            .await
            .prices
            .insert(lookup_key.into(), price_id.into());
    }

    /// Use `id` for the next checkout session instead of a generated one.
    pub async fn set_next_session_id(&self, id: &str) {
        self.script.lock().await.next_session_id = Some(id.into());
    }

    /// Mark a session as paid by `customer_id`.
    pub async fn pay(&self, session_id: &str, customer_id: &str) {
        self.set_status(
            session_id,
            SessionStatus {
                payment_status: PaymentStatus::Paid,
                customer_id: Some(customer_id.into()),
            },
        )
        .await;
    }

    pub async fn set_status(&self, session_id: &str, status: SessionStatus) {
        self.script
            .lock()
            .await
            .sessions
            .insert(session_id.into(), status);
    }

    /// Delay every status lookup, to exercise timeouts.
    pub async fn delay_status(&self, delay: Duration) {
        self.script.lock().await.status_delay = Some(delay);
    }

    pub async fn fail_checkout(&self) {
        self.script.lock().await.fail_checkout = true;
    }

    pub async fn checkouts(&self) -> Vec<CheckoutParams> {
        self.script.lock().await.checkouts.clone()
    }

    /// `(customer_id, return_url)` of every portal session requested.
    pub async fn portal_calls(&self) -> Vec<(String, String)> {
        self.script.lock().await.portal_calls.clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn resolve_price(&self, lookup_key: &str) -> Result<Option<String>> {
        Ok(self.script.lock().await.prices.get(lookup_key).cloned())
    }

    async fn create_checkout_session(&self, params: CheckoutParams) -> Result<CheckoutSession> {
        let mut script = self.script.lock().await;
        if script.fail_checkout {
            return Err(IssuanceError::Upstream("checkout unavailable".into()));
        }

        script.created += 1;
        let created = script.created;
        let id = script
            .next_session_id
            .take()
            .unwrap_or_else(|| format!("cs_test_{created}"));

        script.sessions.insert(
            id.clone(),
            SessionStatus {
                payment_status: PaymentStatus::Unpaid,
                customer_id: None,
            },
        );
        script.checkouts.push(params);

        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/pay/{id}"),
            id,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let delay = self.script.lock().await.status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| IssuanceError::Upstream(format!("no such session: {session_id}")))
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String> {
        self.script
            .lock()
            .await
            .portal_calls
            .push((customer_id.into(), return_url.into()));
        Ok(format!("https://billing.stripe.test/session/{customer_id}"))
    }
}

/// Registry that delegates to a [`MemoryCredentialRegistry`] until told to
/// fail or stall.
pub struct FaultyRegistry {
    inner: Arc<MemoryCredentialRegistry>,
    fail_mint: AtomicBool,
    fail_attach: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FaultyRegistry {
    pub fn new(inner: Arc<MemoryCredentialRegistry>) -> Self {
        Self {
            inner,
            fail_mint: AtomicBool::new(false),
            fail_attach: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn fail_mint(&self) {
        self.fail_mint.store(true, Ordering::SeqCst);
    }

    pub fn fail_attach(&self) {
        self.fail_attach.store(true, Ordering::SeqCst);
    }

    /// Delay every registry call.
    pub async fn delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    async fn stall(&self) {
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CredentialRegistry for FaultyRegistry {
    async fn issue_credential(&self, name: &str) -> Result<MintedCredential> {
        self.stall().await;
        if self.fail_mint.load(Ordering::SeqCst) {
            return Err(IssuanceError::Upstream("registry rejected key".into()));
        }
        self.inner.issue_credential(name).await
    }

    async fn attach_usage_policy(&self, credential_id: &str, policy_id: &str) -> Result<()> {
        self.stall().await;
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(IssuanceError::Upstream("usage plan unavailable".into()));
        }
        self.inner.attach_usage_policy(credential_id, policy_id).await
    }
}

/// Store that delegates to a [`MemoryStore`] until told to fail a write.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    fail_put: AtomicBool,
    fail_save: AtomicBool,
    fail_mark: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_put: AtomicBool::new(false),
            fail_save: AtomicBool::new(false),
            fail_mark: AtomicBool::new(false),
        }
    }

    pub fn fail_put(&self) {
        self.fail_put.store(true, Ordering::SeqCst);
    }

    pub fn fail_save(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    pub fn fail_mark(&self) {
        self.fail_mark.store(true, Ordering::SeqCst);
    }
}

fn store_down() -> IssuanceError {
    IssuanceError::Persistence("store unavailable".into())
}

#[async_trait]
impl SessionStore for FaultyStore {
    async fn put(&self, intent: &PurchaseIntent) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.put(intent).await
    }

    async fn get(&self, session_id: &str) -> Result<Option<PurchaseIntent>> {
        self.inner.get(session_id).await
    }

    async fn try_claim(&self, session_id: &str) -> Result<ClaimOutcome> {
        self.inner.try_claim(session_id).await
    }

    async fn mark_issued(&self, session_id: &str) -> Result<MarkOutcome> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.mark_issued(session_id).await
    }
}

#[async_trait]
impl CredentialStore for FaultyStore {
    async fn save(&self, credential: &IssuedCredential) -> Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.save(credential).await
    }

    async fn find_by_owner(&self, owner: &str, tier: Tier) -> Result<Vec<IssuedCredential>> {
        self.inner.find_by_owner(owner, tier).await
    }
}
