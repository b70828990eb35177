//! Service configuration loaded from environment variables.

use std::time::Duration;

use paygate_payments::{IssuanceConfig, RedirectUrls, RegistryConfig, Tier};

use crate::auth::AuthConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the server needs, read once at startup.
#[derive(Clone, Debug)]
pub struct PaygateConfig {
    /// Address to listen on (default: "0.0.0.0:3000").
    pub bind_addr: String,

    /// Stripe secret key.
    pub stripe_api_key: String,

    /// Credential registry connection.
    pub registry: RegistryConfig,

    /// Usage plan attached to every issued key.
    pub usage_plan_id: String,

    /// Registry-side key name prefix.
    pub credential_name_prefix: String,

    /// Purchase intent table (PostgreSQL backend).
    pub purchase_table: String,

    /// Issued credential table (PostgreSQL backend).
    pub credential_table: String,

    /// PostgreSQL URL; the in-memory store is used when absent.
    pub database_url: Option<String>,

    /// Public base URL of this service.
    pub callback_base_url: String,

    /// Customer-facing site the landing pages live on.
    pub site_url: String,

    /// Identity token verification.
    pub auth: AuthConfig,

    /// Bound for every payment, registry and store call.
    pub upstream_timeout: Duration,
}

impl PaygateConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let upstream_timeout = match get("UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "UPSTREAM_TIMEOUT_SECS",
                    reason: format!("not a number: {raw}"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: "UPSTREAM_TIMEOUT_SECS",
                        reason: "must be positive".into(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(10),
        };

        let callback_base_url = require("CALLBACK_BASE_URL")?;
        let site_url = require("SITE_URL")?;
        for (name, url) in [("CALLBACK_BASE_URL", &callback_base_url), ("SITE_URL", &site_url)] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be an absolute http(s) URL".into(),
                });
            }
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            stripe_api_key: require("STRIPE_API_KEY")?,
            registry: RegistryConfig {
                base_url: require("REGISTRY_URL")?,
                rest_api_id: require("REST_API_ID")?,
                stage: get("REGISTRY_STAGE").unwrap_or_else(|| "api".into()),
                token: get("REGISTRY_TOKEN"),
                timeout: upstream_timeout,
            },
            usage_plan_id: require("USAGE_PLAN_ID")?,
            credential_name_prefix: get("CREDENTIAL_NAME_PREFIX")
                .unwrap_or_else(|| "paygate_pro_".into()),
            purchase_table: get("PURCHASE_TABLE").unwrap_or_else(|| "purchase_intents".into()),
            credential_table: get("CREDENTIAL_TABLE")
                .unwrap_or_else(|| "issued_credentials".into()),
            database_url: get("DATABASE_URL"),
            callback_base_url,
            site_url,
            auth: AuthConfig {
                secret: require("AUTH_JWT_SECRET")?,
                identity_claim: get("AUTH_IDENTITY_CLAIM")
                    .unwrap_or_else(|| "cognito:username".into()),
                audience: get("AUTH_AUDIENCE"),
            },
            upstream_timeout,
        })
    }

    /// Settings handed to the issuance and access-control services.
    pub fn issuance_config(&self) -> IssuanceConfig {
        let mut config = IssuanceConfig::new(
            self.callback_base_url.clone(),
            RedirectUrls::from_site(&self.site_url),
            self.usage_plan_id.clone(),
        );
        config.credential_name_prefix = self.credential_name_prefix.clone();
        config.tier = Tier::Pro;
        config.upstream_timeout = self.upstream_timeout;
        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("STRIPE_API_KEY", "sk_test_1"),
            ("REGISTRY_URL", "https://registry.example.com"),
            ("REST_API_ID", "api123"),
            ("USAGE_PLAN_ID", "plan_1"),
            ("CALLBACK_BASE_URL", "https://api.example.com"),
            ("SITE_URL", "https://example.com"),
            ("AUTH_JWT_SECRET", "secret"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<PaygateConfig, ConfigError> {
        PaygateConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&env()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.registry.stage, "api");
        assert_eq!(config.auth.identity_claim, "cognito:username");
        assert_eq!(config.purchase_table, "purchase_intents");
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert!(config.database_url.is_none());

        let issuance = config.issuance_config();
        assert_eq!(issuance.redirects.payment_cancel, "https://example.com/canceled_upgrade");
        assert_eq!(issuance.usage_plan_id, "plan_1");
    }

    #[test]
    fn test_missing_required() {
        let mut vars = env();
        vars.remove("USAGE_PLAN_ID");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("USAGE_PLAN_ID"))));

        let mut vars = env();
        vars.insert("STRIPE_API_KEY", "  ");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("STRIPE_API_KEY"))));
    }

    #[test]
    fn test_invalid_values() {
        let mut vars = env();
        vars.insert("UPSTREAM_TIMEOUT_SECS", "soon");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = env();
        vars.insert("SITE_URL", "example.com");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "SITE_URL", .. })
        ));
    }
}
