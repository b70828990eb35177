//! In-memory store (for development and tests)

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ClaimOutcome, CredentialStore, MarkOutcome, PurchaseIntent, SessionStore};
use crate::credential::{IssuedCredential, Tier};
use crate::error::Result;

/// Keeps intents and credentials in process memory.
///
/// Each conditional transition runs entirely under the write lock, which is
/// what makes it a compare-and-set.
#[derive(Default)]
pub struct MemoryStore {
    intents: RwLock<HashMap<String, PurchaseIntent>>,
    credentials: RwLock<Vec<IssuedCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials, across all owners.
    pub async fn credential_count(&self) -> usize {
        self.credentials.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put(&self, intent: &PurchaseIntent) -> Result<()> {
        let mut intents = self.intents.write().await;
        intents.insert(intent.session_id.clone(), intent.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<PurchaseIntent>> {
        let intents = self.intents.read().await;
        Ok(intents.get(session_id).cloned())
    }

    async fn try_claim(&self, session_id: &str) -> Result<ClaimOutcome> {
        let mut intents = self.intents.write().await;

        let Some(intent) = intents.get_mut(session_id) else {
            return Ok(ClaimOutcome::Missing);
        };
        if intent.is_consumed() {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        intent.claimed_at = Some(Utc::now());
        Ok(ClaimOutcome::Claimed)
    }

    async fn mark_issued(&self, session_id: &str) -> Result<MarkOutcome> {
        let mut intents = self.intents.write().await;

        let Some(intent) = intents.get_mut(session_id) else {
            return Ok(MarkOutcome::Missing);
        };
        if intent.issued || intent.claimed_at.is_none() {
            return Ok(MarkOutcome::Rejected);
        }

        intent.issued = true;
        intent.issued_at = Some(Utc::now());
        Ok(MarkOutcome::Marked)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, credential: &IssuedCredential) -> Result<()> {
        self.credentials.write().await.push(credential.clone());
        Ok(())
    }

    async fn find_by_owner(&self, owner: &str, tier: Tier) -> Result<Vec<IssuedCredential>> {
        let credentials = self.credentials.read().await;
        Ok(credentials
            .iter()
            .filter(|c| c.owner == owner && c.tier == tier)
            .cloned()
            .collect())
    }
}
