//! Application State

use std::sync::Arc;

use paygate_payments::{
    AccessController, CredentialRegistry, CredentialStore, HttpCredentialRegistry,
    IssuanceService, MemoryStore, PaymentGateway, RedirectUrls, SessionStore, StripeGateway,
};

use crate::auth::AuthConfig;
use crate::config::PaygateConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout initiation and credential issuance
    pub issuance: Arc<IssuanceService>,

    /// Billing portal access
    pub portal: Arc<AccessController>,

    /// Landing pages for rejected or failed requests
    pub redirects: RedirectUrls,

    /// Identity token verification
    pub auth: Arc<AuthConfig>,

    /// Store backend name, reported by the health check
    pub store_backend: &'static str,
}

type Stores = (Arc<dyn SessionStore>, Arc<dyn CredentialStore>, &'static str);

impl AppState {
    /// Wire the services from already-built collaborators.
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        registry: Arc<dyn CredentialRegistry>,
        sessions: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialStore>,
        config: &PaygateConfig,
    ) -> Self {
        let issuance_config = config.issuance_config();
        let redirects = issuance_config.redirects.clone();

        let issuance = IssuanceService::new(
            gateway.clone(),
            registry,
            sessions.clone(),
            credentials,
            issuance_config.clone(),
        );
        let portal = AccessController::new(gateway, sessions, issuance_config);

        Self {
            issuance: Arc::new(issuance),
            portal: Arc::new(portal),
            redirects,
            auth: Arc::new(config.auth.clone()),
            store_backend: "custom",
        }
    }

    /// Build production collaborators from configuration.
    pub async fn from_config(config: &PaygateConfig) -> anyhow::Result<Self> {
        config.issuance_config().validate()?;

        let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(&config.stripe_api_key));
        let registry: Arc<dyn CredentialRegistry> =
            Arc::new(HttpCredentialRegistry::new(config.registry.clone())?);
        let (sessions, credentials, backend) = open_stores(config).await?;

        tracing::info!(
            registry = %config.registry.base_url,
            store = backend,
            "Collaborators ready"
        );

        let mut state = Self::new(gateway, registry, sessions, credentials, config);
        state.store_backend = backend;
        Ok(state)
    }
}

#[cfg(feature = "postgres")]
async fn open_stores(config: &PaygateConfig) -> anyhow::Result<Stores> {
    use paygate_payments::{PgStore, TableNames};

    if let Some(url) = &config.database_url {
        let tables = TableNames {
            purchases: config.purchase_table.clone(),
            credentials: config.credential_table.clone(),
        };
        let store = Arc::new(PgStore::connect(url, tables).await?);
        let sessions: Arc<dyn SessionStore> = store.clone();
        let credentials: Arc<dyn CredentialStore> = store;
        return Ok((sessions, credentials, "postgres"));
    }

    Ok(memory_stores())
}

#[cfg(not(feature = "postgres"))]
async fn open_stores(config: &PaygateConfig) -> anyhow::Result<Stores> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the postgres feature is disabled");
    }
    Ok(memory_stores())
}

fn memory_stores() -> Stores {
    tracing::warn!("Using in-memory store - purchase intents are lost on restart");
    let store = Arc::new(MemoryStore::new());
    let sessions: Arc<dyn SessionStore> = store.clone();
    let credentials: Arc<dyn CredentialStore> = store;
    (sessions, credentials, "memory")
}
