//! Credential Registry
//!
//! Mints API keys bound to a REST API stage and attaches them to a usage plan.
//! Quotas and throttling are enforced by the registry itself.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::credential::{CredentialSecret, MintedCredential};
use crate::error::{IssuanceError, Result};

/// Credential registry operations
#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// Mint a new enabled credential under `name`
    async fn issue_credential(&self, name: &str) -> Result<MintedCredential>;

    /// Attach a minted credential to a usage policy
    async fn attach_usage_policy(&self, credential_id: &str, policy_id: &str) -> Result<()>;
}

/// Connection settings for [`HttpCredentialRegistry`]
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// REST endpoint of the registry
    pub base_url: String,

    /// REST API the keys are bound to
    pub rest_api_id: String,

    /// Stage of that REST API
    pub stage: String,

    /// Bearer token, if the registry requires one
    pub token: Option<String>,

    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageKey<'a> {
    rest_api_id: &'a str,
    stage_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateApiKey<'a> {
    name: &'a str,
    enabled: bool,
    stage_keys: Vec<StageKey<'a>>,
}

#[derive(Deserialize)]
struct ApiKeyResponse {
    id: String,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUsagePlanKey<'a> {
    key_id: &'a str,
    key_type: &'static str,
}

/// REST client for an API-Gateway style key registry
pub struct HttpCredentialRegistry {
    client: Client,
    config: RegistryConfig,
}

impl HttpCredentialRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IssuanceError::Config(format!("registry client: {e}")))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(self.url(path));
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IssuanceError::Upstream(format!(
            "registry {what} failed with {status}: {body}"
        )))
    }
}

fn transport(e: reqwest::Error) -> IssuanceError {
    IssuanceError::Upstream(format!("registry: {e}"))
}

#[async_trait]
impl CredentialRegistry for HttpCredentialRegistry {
    async fn issue_credential(&self, name: &str) -> Result<MintedCredential> {
        let body = CreateApiKey {
            name,
            enabled: true,
            stage_keys: vec![StageKey {
                rest_api_id: &self.config.rest_api_id,
                stage_name: &self.config.stage,
            }],
        };

        let response = self
            .post("/apikeys")
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let created: ApiKeyResponse = Self::check(response, "create key")
            .await?
            .json()
            .await
            .map_err(transport)?;

        tracing::debug!(credential_id = %created.id, name = %name, "Minted credential");

        Ok(MintedCredential {
            id: created.id,
            value: CredentialSecret::new(created.value),
        })
    }

    async fn attach_usage_policy(&self, credential_id: &str, policy_id: &str) -> Result<()> {
        let body = CreateUsagePlanKey {
            key_id: credential_id,
            key_type: "API_KEY",
        };

        let response = self
            .post(&format!("/usageplans/{policy_id}/keys"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, "attach usage plan").await?;

        Ok(())
    }
}

/// In-memory registry (for development)
#[derive(Default)]
pub struct MemoryCredentialRegistry {
    keys: RwLock<HashMap<String, String>>,
    policies: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys minted so far
    pub async fn issued_count(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Usage policy attached to a key, if any
    pub async fn policy_of(&self, credential_id: &str) -> Option<String> {
        self.policies.read().await.get(credential_id).cloned()
    }

    /// Name a key was minted under
    pub async fn name_of(&self, credential_id: &str) -> Option<String> {
        self.keys.read().await.get(credential_id).cloned()
    }
}

#[async_trait]
impl CredentialRegistry for MemoryCredentialRegistry {
    async fn issue_credential(&self, name: &str) -> Result<MintedCredential> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let value = crate::token::OneTimeToken::generate();

        self.keys.write().await.insert(id.clone(), name.to_string());

        Ok(MintedCredential {
            id,
            value: CredentialSecret::new(value.as_str()),
        })
    }

    async fn attach_usage_policy(&self, credential_id: &str, policy_id: &str) -> Result<()> {
        if !self.keys.read().await.contains_key(credential_id) {
            return Err(IssuanceError::Upstream(format!(
                "unknown credential {credential_id}"
            )));
        }
        self.policies
            .write()
            .await
            .insert(credential_id.to_string(), policy_id.to_string());
        Ok(())
    }
}
