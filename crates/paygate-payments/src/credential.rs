//! Credential Records
//!
//! Types describing a granted API credential. Minting and usage policies are
//! owned by the credential registry; this crate only keeps the issuance record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Secret credential value. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSecret(String);

impl CredentialSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw value. Only the registry and the store should need it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialSecret(***)")
    }
}

impl std::fmt::Display for CredentialSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Credential tiers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    #[default]
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Pro => "PRO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PRO" => Some(Tier::Pro),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential as returned by the registry right after minting
#[derive(Clone, Debug)]
pub struct MintedCredential {
    /// Registry-side identifier, used to attach usage policies
    pub id: String,

    /// Secret value handed to the owner
    pub value: CredentialSecret,
}

/// A granted credential, persisted once per purchase intent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuedCredential {
    /// Owning identity (the purchase requester)
    pub owner: String,

    /// Tier the credential was issued for
    pub tier: Tier,

    /// Registry-side identifier
    pub credential_id: String,

    /// Secret value
    pub value: CredentialSecret,

    /// Checkout session that paid for this credential
    pub session_id: String,

    /// Issuance timestamp
    pub issued_at: DateTime<Utc>,
}

impl IssuedCredential {
    pub fn new(owner: String, tier: Tier, minted: MintedCredential, session_id: String) -> Self {
        Self {
            owner,
            tier,
            credential_id: minted.id,
            value: minted.value,
            session_id,
            issued_at: Utc::now(),
        }
    }
}
