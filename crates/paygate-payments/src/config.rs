//! Issuance configuration, built once at startup and shared read-only.

use std::time::Duration;

use crate::credential::Tier;
use crate::error::{IssuanceError, Result};
use crate::redirect::RedirectUrls;

/// Success callback path; the gateway substitutes its session id placeholder.
pub const CONFIRM_PATH: &str = "/create-api-key";

/// Placeholder Stripe replaces with the checkout session id.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Most sequential external calls a single confirmation makes.
const CONFIRM_CALL_BUDGET: u32 = 8;

/// Settings consumed by [`IssuanceService`](crate::IssuanceService) and
/// [`AccessController`](crate::AccessController).
#[derive(Clone, Debug)]
pub struct IssuanceConfig {
    /// Public base URL of this service, used to build the success callback.
    pub callback_base_url: String,

    /// Customer-facing landing pages.
    pub redirects: RedirectUrls,

    /// Usage policy attached to every minted credential.
    pub usage_plan_id: String,

    /// Prefix of the registry-side credential name; the requester is appended.
    pub credential_name_prefix: String,

    /// Tier granted by a successful purchase.
    pub tier: Tier,

    /// Upper bound for every external call.
    pub upstream_timeout: Duration,
}

impl IssuanceConfig {
    pub fn new(
        callback_base_url: impl Into<String>,
        redirects: RedirectUrls,
        usage_plan_id: impl Into<String>,
    ) -> Self {
        Self {
            callback_base_url: callback_base_url.into(),
            redirects,
            usage_plan_id: usage_plan_id.into(),
            credential_name_prefix: "paygate_pro_".into(),
            tier: Tier::Pro,
            upstream_timeout: Duration::from_secs(10),
        }
    }

    /// Reject obviously unusable settings before serving traffic.
    pub fn validate(&self) -> Result<()> {
        if !self.callback_base_url.starts_with("http") {
            return Err(IssuanceError::Config(
                "callback base URL must be absolute".into(),
            ));
        }
        if self.usage_plan_id.is_empty() {
            return Err(IssuanceError::Config("usage plan id is empty".into()));
        }
        if self.upstream_timeout.is_zero() {
            return Err(IssuanceError::Config("upstream timeout is zero".into()));
        }
        Ok(())
    }

    /// Upper bound for a whole request: every external call of a
    /// confirmation at its own timeout, plus slack.
    pub fn request_deadline(&self) -> Duration {
        self.upstream_timeout * (CONFIRM_CALL_BUDGET + 2)
    }

    /// Success URL template embedding the session placeholder and the token.
    pub fn success_url_template(&self, token: &str) -> String {
        format!(
            "{}{CONFIRM_PATH}/{SESSION_ID_PLACEHOLDER}/{token}",
            self.callback_base_url.trim_end_matches('/')
        )
    }

    pub fn credential_name(&self, requester: &str) -> String {
        format!("{}{requester}", self.credential_name_prefix)
    }
}
