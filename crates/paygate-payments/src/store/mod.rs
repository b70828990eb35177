//! Session Store
//!
//! Purchase intents keyed by checkout session id, plus the issued credential
//! records. State transitions on an intent are compare-and-set operations so
//! that concurrent confirmations for one session have a single winner.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, TableNames};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::{IssuedCredential, Tier};
use crate::error::Result;
use crate::token::OneTimeToken;

/// One checkout attempt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PurchaseIntent {
    /// Processor-assigned checkout session id
    pub session_id: String,

    /// Identity that started the checkout
    pub requester: String,

    /// Token bound into the success URL
    pub one_time_token: OneTimeToken,

    /// Tier being purchased
    pub tier: Tier,

    /// Set exactly once, after the credential is persisted
    pub issued: bool,

    /// Set exactly once, by the confirmation that won the claim
    pub claimed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub issued_at: Option<DateTime<Utc>>,
}

impl PurchaseIntent {
    pub fn new(
        session_id: String,
        requester: String,
        one_time_token: OneTimeToken,
        tier: Tier,
    ) -> Self {
        Self {
            session_id,
            requester,
            one_time_token,
            tier,
            issued: false,
            claimed_at: None,
            created_at: Utc::now(),
            issued_at: None,
        }
    }

    /// True once any confirmation has started or finished issuance.
    pub fn is_consumed(&self) -> bool {
        self.issued || self.claimed_at.is_some()
    }
}

/// Result of [`SessionStore::try_claim`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the issuance.
    Claimed,
    /// Another caller claimed or finished first.
    AlreadyClaimed,
    /// No intent for this session.
    Missing,
}

/// Result of [`SessionStore::mark_issued`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    /// Already issued, or never claimed.
    Rejected,
    Missing,
}

/// Purchase intent storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite the intent for its session id.
    ///
    /// Overwriting is only valid before the intent is claimed; checkout
    /// initiation is the sole writer.
    async fn put(&self, intent: &PurchaseIntent) -> Result<()>;

    /// Get intent by checkout session id
    async fn get(&self, session_id: &str) -> Result<Option<PurchaseIntent>>;

    /// Set `claimed_at` if the intent is neither claimed nor issued.
    async fn try_claim(&self, session_id: &str) -> Result<ClaimOutcome>;

    /// Set `issued` if the intent is claimed and not yet issued.
    async fn mark_issued(&self, session_id: &str) -> Result<MarkOutcome>;
}

/// Issued credential storage
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a newly issued credential
    async fn save(&self, credential: &IssuedCredential) -> Result<()>;

    /// All credentials issued to an owner for a tier
    async fn find_by_owner(&self, owner: &str, tier: Tier) -> Result<Vec<IssuedCredential>>;
}
